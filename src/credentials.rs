//! Storage for the bearer token attached to outgoing requests.
//!
//! The store is shared by every request a client makes: the default request
//! interceptor reads it on each dispatch and only an explicit
//! [`HttpClient::set_token`](crate::client::HttpClient::set_token) writes it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::client::ClientError;
use crate::options::SecretString;

/// Name of the single slot the token lives in.
pub const TOKEN_SLOT: &str = "access_token";

/// A single-slot token store.
pub trait CredentialStore: Send + Sync {
    /// Current token, if any.
    fn token(&self) -> Option<SecretString>;

    /// Replace the token; `None` clears the slot.
    fn set_token(&self, token: Option<SecretString>) -> Result<(), ClientError>;
}

/// In-process token store.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    token: RwLock<Option<SecretString>>,
}

impl MemoryCredentials {
    pub fn new(token: Option<SecretString>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }
}

impl CredentialStore for MemoryCredentials {
    fn token(&self) -> Option<SecretString> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    fn set_token(&self, token: Option<SecretString>) -> Result<(), ClientError> {
        let mut slot = self
            .token
            .write()
            .map_err(|_| ClientError::Config("credential store poisoned".to_string()))?;
        *slot = token;
        Ok(())
    }
}

/// Token store persisted as a file in a directory, so it survives restarts.
///
/// The file is re-read on every lookup; an empty or missing file means no
/// token.
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    /// Store the token under `dir/access_token`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(TOKEN_SLOT),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentials {
    fn token(&self) -> Option<SecretString> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                (!token.is_empty()).then(|| SecretString::from(token))
            }
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "failed to read token");
                }
                None
            }
        }
    }

    fn set_token(&self, token: Option<SecretString>) -> Result<(), ClientError> {
        match token.filter(|t| !t.expose_secret().is_empty()) {
            Some(token) => {
                if let Some(parent) = self.path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&self.path, token.expose_secret())?;
            }
            None => match fs::remove_file(&self.path) {
                Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            },
        }
        Ok(())
    }
}
