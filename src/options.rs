//! Client configuration.

use std::time::Duration;

/// Base URL used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "/api";

/// Origin that relative base URLs are resolved against.
pub const DEFAULT_ORIGIN: &str = "http://localhost";

/// Timeout applied to non-streaming requests that don't set their own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// A secret string type for sensitive data like API keys.
/// Prevents accidental logging or display of secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Options consumed once when an [`HttpClient`](crate::client::HttpClient) is built.
///
/// # Example
/// ```rust
/// use unai_http::options::ClientOptions;
/// use std::time::Duration;
///
/// let options = ClientOptions::default()
///     .with_base_url("https://gateway.example.com/openai".to_string())
///     .with_api_key("sk-...")
///     .with_timeout(Duration::from_secs(10));
/// assert_eq!(options.timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL for every request; may be relative (e.g. `/api`)
    pub base_url: String,

    /// Absolute origin that relative base URLs resolve against
    pub origin: String,

    /// Default per-request timeout
    pub timeout: Duration,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Initial bearer token for the credential store
    pub api_key: Option<SecretString>,

    /// Default chat model
    pub model: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            timeout: DEFAULT_TIMEOUT,
            proxy: None,
            api_key: None,
            model: None,
        }
    }
}

impl ClientOptions {
    /// Read options from the process environment.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `API_BASE_URL` | `base_url` |
    /// | `API_ORIGIN` | `origin` |
    /// | `OPENAI_API_KEY` | `api_key` |
    /// | `OPENAI_MODEL` | `model` |
    /// | `HTTP_PROXY` | `proxy` |
    ///
    /// Empty variables count as unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            base_url: var("API_BASE_URL").unwrap_or(defaults.base_url),
            origin: var("API_ORIGIN").unwrap_or(defaults.origin),
            timeout: defaults.timeout,
            proxy: var("HTTP_PROXY"),
            api_key: var("OPENAI_API_KEY").map(SecretString::new),
            model: var("OPENAI_MODEL"),
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set the origin relative base URLs resolve against.
    pub fn with_origin(mut self, origin: String) -> Self {
        self.origin = origin;
        self
    }

    /// Set the default timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Set the initial API key.
    pub fn with_api_key(mut self, api_key: impl Into<SecretString>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the default chat model.
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }
}
