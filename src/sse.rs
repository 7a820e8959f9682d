//! Server-Sent Events (SSE) stream processing.
//!
//! Only the framing needed for chat-completion streams is interpreted:
//! blank-line-delimited blocks whose `data:` lines carry the payload.
//! `event:`, `id:`, `retry:` and comment lines are ignored.
//!
//! SSE format:
//! ```text
//! data: {"key": "value"}
//!
//! data: {"another": "event"}
//!
//! data: [DONE]
//! ```

use std::collections::VecDeque;

use futures::stream::{self, Stream, StreamExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cancel::Deadline;
use crate::client::ClientError;
use crate::interceptor::Interceptors;
use crate::model::RequestConfig;

/// One decoded unit of an event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Payload of a `data:` line, prefix stripped
    Data(String),

    /// The `[DONE]` sentinel; nothing follows it
    Done,
}

/// Incremental SSE decoder.
///
/// Bytes go in as they arrive, complete events come out. Multi-byte UTF-8
/// sequences split across chunks are held back until complete; invalid
/// sequences decode to U+FFFD. CRLF line endings are normalized to LF,
/// including a CR and LF that arrive in different chunks.
///
/// # Example
/// ```
/// use unai_http::sse::{SseDecoder, SseEvent};
///
/// let mut decoder = SseDecoder::new();
/// assert!(decoder.feed(b"data: hel").is_empty());
/// assert_eq!(decoder.feed(b"lo\n\n"), vec![SseEvent::Data("hello".to_string())]);
/// assert_eq!(decoder.feed(b"data: [DONE]\n\n"), vec![SseEvent::Done]);
/// assert!(decoder.is_done());
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending: Vec<u8>,
    /// Decoded text not yet split into events
    buffer: String,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a chunk of bytes and return every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        self.decode(chunk);
        self.normalize();

        while let Some(idx) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..idx + 2).collect();
            if self.parse_block(&block, &mut events) {
                break;
            }
        }
        events
    }

    /// Flush whatever is left once the byte stream has ended.
    ///
    /// A final block that lacks its terminating blank line is still
    /// delivered.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.buffer.push_str(&String::from_utf8_lossy(&rest));
        }
        self.normalize();

        let block = std::mem::take(&mut self.buffer);
        self.parse_block(&block, &mut events);
        events
    }

    fn decode(&mut self, chunk: &[u8]) {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut input = &bytes[..];
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.buffer.push_str(text);
                    }
                    match e.error_len() {
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes
                            self.pending = rest.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn normalize(&mut self) {
        if self.buffer.contains("\r\n") {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
    }

    /// Returns true once the sentinel was hit.
    fn parse_block(&mut self, block: &str, events: &mut Vec<SseEvent>) -> bool {
        for line in block.trim().split('\n') {
            let Some(data) = parse_sse_line(line) else {
                continue;
            };

            if is_done_marker(data) {
                self.done = true;
                self.buffer.clear();
                self.pending.clear();
                events.push(SseEvent::Done);
                return true;
            }
            events.push(SseEvent::Data(data.to_string()));
        }
        false
    }
}

/// Parse an SSE line to extract the data portion.
///
/// SSE lines are in the format: `data: <content>`. The marker and at most one
/// following space are stripped.
///
/// # Example
/// ```
/// use unai_http::sse::parse_sse_line;
///
/// let line = "data: {\"key\": \"value\"}";
/// assert_eq!(parse_sse_line(line), Some("{\"key\": \"value\"}"));
/// assert_eq!(parse_sse_line("data:tight"), Some("tight"));
///
/// let line = ": keep-alive";
/// assert_eq!(parse_sse_line(line), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    let data = line.trim().strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data))
}

/// Check if an SSE data line indicates the stream is done.
///
/// Common done marker: `[DONE]`
///
/// # Example
/// ```
/// use unai_http::sse::is_done_marker;
///
/// assert!(is_done_marker("[DONE]"));
/// assert!(!is_done_marker(""));
/// assert!(!is_done_marker("{\"data\": \"value\"}"));
/// ```
pub fn is_done_marker(data: &str) -> bool {
    data == "[DONE]"
}

/// Extension trait for `reqwest::Response` to enable SSE streaming.
///
/// # Example
/// ```ignore
/// use unai_http::sse::{SSEResponseExt, SseEvent};
///
/// let response = client.get("https://api.example.com/stream").send().await?;
///
/// let mut stream = response.sse();
/// while let Some(event) = stream.next().await {
///     if let SseEvent::Data(data) = event? {
///         println!("SSE data: {}", data);
///     }
/// }
/// ```
pub trait SSEResponseExt {
    /// Convert the response into a stream of SSE events.
    ///
    /// The stream ends after [`SseEvent::Done`] or when the body is exhausted.
    fn sse(self) -> impl Stream<Item = Result<SseEvent, ClientError>> + Send;
}

impl SSEResponseExt for reqwest::Response {
    fn sse(self) -> impl Stream<Item = Result<SseEvent, ClientError>> + Send {
        let byte_stream = self.bytes_stream();

        stream::unfold(
            (Box::pin(byte_stream), SseDecoder::new(), VecDeque::new(), false),
            |(mut byte_stream, mut decoder, mut queue, mut stream_ended)| async move {
                loop {
                    if let Some(event) = queue.pop_front() {
                        return Some((Ok(event), (byte_stream, decoder, queue, stream_ended)));
                    }

                    if stream_ended || decoder.is_done() {
                        return None;
                    }

                    match byte_stream.next().await {
                        Some(Ok(chunk)) => queue.extend(decoder.feed(&chunk)),
                        Some(Err(e)) => {
                            stream_ended = true;
                            return Some((
                                Err(ClientError::from(e)),
                                (byte_stream, decoder, queue, stream_ended),
                            ));
                        }
                        None => {
                            // Process anything left in the buffer
                            stream_ended = true;
                            queue.extend(decoder.finish());
                        }
                    }
                }
            },
        )
    }
}

/// Receives the payloads of an open event stream.
///
/// Callbacks run on the stream's own task, in arrival order.
pub trait EventHandler: Send + 'static {
    /// A `data:` payload, verbatim.
    fn on_event(&mut self, data: String);

    /// The body ended without a `[DONE]` sentinel. Called at most once.
    fn on_done(&mut self) {}

    /// The stream failed after it was opened. Not called for an explicit close.
    fn on_error(&mut self, error: ClientError) {
        tracing::error!(error = %error, "event stream failed");
    }
}

/// Adapter turning a closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

/// Wrap a closure as an event handler.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: FnMut(String) + Send + 'static,
{
    FnHandler(f)
}

impl<F> EventHandler for FnHandler<F>
where
    F: FnMut(String) + Send + 'static,
{
    fn on_event(&mut self, data: String) {
        (self.0)(data)
    }
}

/// Lifecycle of an open event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    /// Ended by the sentinel or by the body running out
    Done,
    /// Closed through its [`CloseHandle`]
    Aborted,
    Failed,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamState::Streaming)
    }
}

/// Handle to an open event stream.
///
/// Closing is idempotent and harmless after the stream has finished.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    token: CancellationToken,
    state: watch::Receiver<StreamState>,
}

impl CloseHandle {
    pub(crate) fn new(token: CancellationToken, state: watch::Receiver<StreamState>) -> Self {
        Self { token, state }
    }

    /// A handle for a stream that never opened. Closing it does nothing.
    pub fn detached() -> Self {
        let token = CancellationToken::new();
        token.cancel();
        let (_, state) = watch::channel(StreamState::Failed);
        Self { token, state }
    }

    /// Stop reading. No further callbacks fire once the read loop observes it.
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Wait until the stream reaches a terminal state.
    ///
    /// All handler callbacks have returned by the time this resolves.
    pub async fn finished(&self) -> StreamState {
        let mut state = self.state.clone();
        loop {
            let current = *state.borrow_and_update();
            if current.is_terminal() {
                return current;
            }
            if state.changed().await.is_err() {
                return *state.borrow();
            }
        }
    }
}

enum Outcome {
    /// `natural` is false when the sentinel ended the stream
    Done { natural: bool },
    Aborted,
    Failed(ClientError),
}

async fn expired(deadline: Option<&Deadline>) {
    match deadline {
        Some(deadline) => deadline.expired().await,
        None => std::future::pending().await,
    }
}

/// Drive an event stream into a handler until it reaches a terminal state.
pub(crate) async fn pump<S, H>(
    events: S,
    mut handler: H,
    close: CancellationToken,
    deadline: Option<Deadline>,
    state: watch::Sender<StreamState>,
    interceptors: std::sync::Arc<Interceptors>,
    request: RequestConfig,
) where
    S: Stream<Item = Result<SseEvent, ClientError>> + Send,
    H: EventHandler,
{
    let mut events = std::pin::pin!(events);

    let outcome = loop {
        let next = tokio::select! {
            biased;
            _ = close.cancelled() => break Outcome::Aborted,
            _ = expired(deadline.as_ref()) => {
                let timeout_ms = deadline.as_ref().map(Deadline::timeout_ms).unwrap_or_default();
                break Outcome::Failed(ClientError::Timeout { timeout_ms });
            }
            next = events.next() => next,
        };

        match next {
            Some(Ok(SseEvent::Data(data))) => {
                tracing::trace!(len = data.len(), "sse event");
                handler.on_event(data);
            }
            Some(Ok(SseEvent::Done)) => {
                close.cancel();
                break Outcome::Done { natural: false };
            }
            Some(Err(e)) => break Outcome::Failed(e),
            None => break Outcome::Done { natural: true },
        }
    };

    let terminal = match outcome {
        Outcome::Done { natural } => {
            tracing::debug!(url = %request.url, natural, "event stream finished");
            if natural {
                handler.on_done();
            }
            StreamState::Done
        }
        Outcome::Aborted => {
            tracing::debug!(url = %request.url, "event stream closed");
            StreamState::Aborted
        }
        Outcome::Failed(error) => {
            let error = interceptors.run_error(error, Some(&request)).await;
            handler.on_error(error);
            StreamState::Failed
        }
    };

    state.send_replace(terminal);
}
