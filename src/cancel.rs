//! Timer-backed cancellation for in-flight requests.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

const PENDING: u8 = 0;
const BY_TIMER: u8 = 1;
const BY_CALLER: u8 = 2;

/// A cancellation token that fires on its own once the timeout elapses.
///
/// The timer and an explicit [`Deadline::cancel`] race for the same token;
/// whichever comes first decides how the cancellation is reported and any
/// later trigger is a no-op. Dropping the deadline cancels the token, which
/// also stops the timer task.
#[derive(Debug)]
pub struct Deadline {
    token: CancellationToken,
    fired: Arc<AtomicU8>,
    timeout_ms: u64,
}

/// Derive a deadline from an optional timeout.
///
/// Returns `None` when the timeout is absent or zero. Must be called from
/// within a tokio runtime.
pub fn derive_token(timeout_ms: Option<u64>) -> Option<Deadline> {
    let timeout_ms = timeout_ms.filter(|ms| *ms > 0)?;

    let token = CancellationToken::new();
    let fired = Arc::new(AtomicU8::new(PENDING));

    let timer_token = token.clone();
    let timer_fired = fired.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                if trigger(&timer_fired, BY_TIMER) {
                    tracing::debug!(timeout_ms, "request deadline elapsed");
                    timer_token.cancel();
                }
            }
            _ = timer_token.cancelled() => {}
        }
    });

    Some(Deadline {
        token,
        fired,
        timeout_ms,
    })
}

fn trigger(fired: &AtomicU8, by: u8) -> bool {
    fired
        .compare_exchange(PENDING, by, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

impl Deadline {
    /// The underlying token, for callers that select on it.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Cancel explicitly. Safe to call repeatedly or after the timer fired.
    pub fn cancel(&self) {
        if trigger(&self.fired, BY_CALLER) {
            self.token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the timer, rather than the caller, cancelled the token.
    pub fn timed_out(&self) -> bool {
        self.fired.load(Ordering::Acquire) == BY_TIMER
    }

    /// Resolves once the token is cancelled by either side.
    pub async fn expired(&self) {
        self.token.cancelled().await
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_token_without_timeout() {
        assert!(derive_token(None).is_none());
        assert!(derive_token(Some(0)).is_none());
    }

    #[tokio::test]
    async fn test_timer_cancels_token() {
        let deadline = derive_token(Some(20)).unwrap();
        assert!(!deadline.is_cancelled());

        tokio::time::timeout(Duration::from_secs(2), deadline.expired())
            .await
            .expect("deadline should fire");
        assert!(deadline.is_cancelled());
        assert!(deadline.timed_out());

        // Cancelling after the timer fired changes nothing
        deadline.cancel();
        assert!(deadline.timed_out());
    }

    #[tokio::test]
    async fn test_explicit_cancel_wins() {
        let deadline = derive_token(Some(50)).unwrap();
        deadline.cancel();
        deadline.cancel();
        assert!(deadline.is_cancelled());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!deadline.timed_out());
    }

    #[tokio::test]
    async fn test_drop_releases_token() {
        let deadline = derive_token(Some(60_000)).unwrap();
        let token = deadline.token().clone();
        drop(deadline);
        assert!(token.is_cancelled());
    }
}
