//! Request body representation and transport encoding.

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::client::ClientError;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A request payload as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Structured value, JSON-encoded unless JSON is turned off
    Json(Value),

    /// Text sent as-is
    Text(String),

    /// Raw binary payload
    Bytes(Bytes),

    /// URL-encoded form fields
    Form(Vec<(String, String)>),
}

impl RequestBody {
    /// Serialize any value into a JSON body.
    ///
    /// This is the only place a body can fail to encode; the error is handed
    /// back to the caller directly and never reaches the error interceptors.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, ClientError> {
        serde_json::to_value(value)
            .map(RequestBody::Json)
            .map_err(ClientError::Encoding)
    }

    /// Build a form body from key/value pairs.
    pub fn form<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        RequestBody::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Whether this body is a binary or form payload that is never JSON-encoded.
    pub fn is_native(&self) -> bool {
        matches!(self, RequestBody::Bytes(_) | RequestBody::Form(_))
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(bytes))
    }
}

/// A body ready to be put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportBody {
    Text(String),
    Bytes(Bytes),
    /// Already URL-encoded form payload
    Form(String),
}

impl TransportBody {
    /// Content type implied by the body kind, if any.
    pub fn implied_content_type(&self) -> Option<&'static str> {
        match self {
            TransportBody::Form(_) => Some(FORM_CONTENT_TYPE),
            _ => None,
        }
    }

    /// Borrow the body as text when it is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TransportBody::Text(text) | TransportBody::Form(text) => Some(text),
            TransportBody::Bytes(_) => None,
        }
    }
}

impl From<TransportBody> for reqwest::Body {
    fn from(body: TransportBody) -> Self {
        match body {
            TransportBody::Text(text) | TransportBody::Form(text) => text.into(),
            TransportBody::Bytes(bytes) => bytes.into(),
        }
    }
}

/// Decide whether a body should be JSON-encoded.
///
/// JSON is the default; binary and form bodies, or an explicit opt-out,
/// turn it off.
pub fn is_json_candidate(body: Option<&RequestBody>, as_json: Option<bool>) -> bool {
    as_json != Some(false) && !body.is_some_and(RequestBody::is_native)
}

/// Convert a request body into its transport form.
///
/// # Example
/// ```
/// use unai_http::body::{encode, RequestBody, TransportBody};
/// use serde_json::json;
///
/// let body = RequestBody::Json(json!({"a": 1}));
/// let encoded = encode(Some(&body), true).unwrap();
/// assert_eq!(encoded, Some(TransportBody::Text("{\"a\":1}".to_string())));
/// assert_eq!(encode(None, true).unwrap(), None);
/// ```
pub fn encode(body: Option<&RequestBody>, as_json: bool) -> Result<Option<TransportBody>, ClientError> {
    let Some(body) = body else {
        return Ok(None);
    };

    let encoded = match body {
        RequestBody::Text(text) => TransportBody::Text(text.clone()),
        RequestBody::Json(value) if as_json => {
            TransportBody::Text(serde_json::to_string(value).map_err(ClientError::Encoding)?)
        }
        // Stringify fallback: a JSON string is sent as its raw text
        RequestBody::Json(Value::String(text)) => TransportBody::Text(text.clone()),
        RequestBody::Json(value) => TransportBody::Text(value.to_string()),
        RequestBody::Bytes(bytes) if as_json => {
            TransportBody::Text(serde_json::to_string(&bytes[..]).map_err(ClientError::Encoding)?)
        }
        RequestBody::Bytes(bytes) => TransportBody::Bytes(bytes.clone()),
        RequestBody::Form(pairs) if as_json => {
            let object: serde_json::Map<String, Value> = pairs
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            TransportBody::Text(Value::Object(object).to_string())
        }
        RequestBody::Form(pairs) => TransportBody::Form(
            ::url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish(),
        ),
    };

    Ok(Some(encoded))
}
