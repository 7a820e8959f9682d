//! Request and response data models shared by the engine and the stream opener.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::body::RequestBody;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Everything needed to dispatch one request.
///
/// Constructed by the caller, then threaded through the request interceptor
/// chain. Whatever the last interceptor returns is what goes on the wire.
///
/// # Example
/// ```
/// use unai_http::model::{Method, RequestConfig};
///
/// let config = RequestConfig::new(Method::Get, "/v1/models")
///     .with_param("limit", 20)
///     .with_param("tags", vec!["a", "b"])
///     .with_timeout_ms(5_000);
/// assert_eq!(config.params.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Path (or path fragment) resolved against `base_url`
    pub url: String,

    /// HTTP method; unset means the operation's default (`GET` for
    /// requests, `POST` for event streams)
    pub method: Option<Method>,

    /// Base address; the client's base URL is used when unset
    pub base_url: Option<String>,

    /// Request headers (names are case-insensitive)
    pub headers: HeaderMap,

    /// Query parameters in insertion order
    pub params: Vec<(String, Value)>,

    pub body: Option<RequestBody>,

    /// Per-request timeout in milliseconds; `0` disables it
    pub timeout_ms: Option<u64>,

    /// Whether the body is sent as JSON (defaults to true)
    pub as_json: Option<bool>,
}

impl RequestConfig {
    /// Create a config for the given method and path.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Some(method),
            ..Default::default()
        }
    }

    /// Set the HTTP method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set a single header, replacing any previous value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Append a query parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Set the request body.
    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the timeout in milliseconds.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Opt in or out of JSON encoding of the body.
    pub fn with_json(mut self, as_json: bool) -> Self {
        self.as_json = Some(as_json);
        self
    }
}

/// Response payload, selected by the declared content type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// `application/json` payloads
    Json(Value),

    /// `text/*` payloads
    Text(String),

    /// Anything else
    Bytes(Bytes),
}

impl ResponseBody {
    /// Deserialize the payload into `T`.
    ///
    /// Text is offered to `T` as a JSON string; raw bytes are parsed as JSON.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        match self {
            ResponseBody::Json(value) => serde_json::from_value(value),
            ResponseBody::Text(text) => serde_json::from_value(Value::String(text)),
            ResponseBody::Bytes(bytes) => serde_json::from_slice(&bytes),
        }
    }

    /// Borrow the payload as JSON, if it is JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Borrow the payload as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct Response<T> {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub data: T,

    /// The finalized config that produced this response
    pub request: RequestConfig,
}

impl<T> Response<T> {
    /// Replace the payload, keeping the response metadata.
    pub fn map_data<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Response<U>, E> {
        Ok(Response {
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            data: f(self.data)?,
            request: self.request,
        })
    }
}
