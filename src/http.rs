//! HTTP transport utilities.
//!
//! This module provides reqwest client construction and the response body
//! handling shared by the request engine and the stream opener.

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::client::ClientError;
use crate::model::ResponseBody;
use crate::options::ClientOptions;

/// Build a configured HTTP client from client options.
///
/// Only the proxy is applied here. Timeouts are enforced per request, since a
/// client-wide timeout would also cut long-lived event streams.
///
/// # Example
/// ```ignore
/// let client = build_http_client(&options)?;
/// ```
pub fn build_http_client(options: &ClientOptions) -> Result<Client, ClientError> {
    let mut builder = Client::builder();

    if let Some(proxy_url) = &options.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ClientError::Config(format!("invalid proxy {proxy_url}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

/// Declared content type of a response, lowercased; empty when absent.
pub fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Canonical reason phrase for a status, empty for unknown codes.
pub fn status_text(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or_default().to_string()
}

/// Read a response body, choosing its representation by content type.
///
/// JSON is parsed (an empty JSON body reads as `null`), `text/*` is returned
/// as text and anything else as raw bytes.
pub async fn read_body(response: reqwest::Response) -> Result<ResponseBody, ClientError> {
    let content_type = content_type(response.headers());

    if content_type.contains("application/json") {
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ResponseBody::Json(Value::Null));
        }
        let value = serde_json::from_slice(&bytes).map_err(ClientError::Decode)?;
        Ok(ResponseBody::Json(value))
    } else if content_type.contains("text/") {
        Ok(ResponseBody::Text(response.text().await?))
    } else {
        Ok(ResponseBody::Bytes(response.bytes().await?))
    }
}

/// Drain the body of a failed stream response.
///
/// JSON when declared, text otherwise. Failing to read the body is not
/// itself an error; the status is what matters, so this falls back to `null`.
pub async fn read_error_body(response: reqwest::Response) -> ResponseBody {
    let is_json = content_type(response.headers()).contains("application/json");
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(error = %e, "failed to read error body");
            return ResponseBody::Json(Value::Null);
        }
    };

    if is_json {
        ResponseBody::Json(serde_json::from_str(&text).unwrap_or(Value::Null))
    } else {
        ResponseBody::Text(text)
    }
}

/// Human-readable reason for a failed response.
///
/// Uses a `message` or `error` field of a JSON object body when present
/// (including the nested `{"error": {"message": ..}}` shape), else the
/// status text.
pub fn failure_message(data: &ResponseBody, status_text: &str) -> String {
    let Some(Value::Object(object)) = data.as_json() else {
        return status_text.to_string();
    };

    let field = object
        .get("message")
        .filter(|v| !v.is_null())
        .or_else(|| object.get("error").filter(|v| !v.is_null()));

    match field {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(nested)) => match nested.get("message") {
            Some(Value::String(s)) => s.clone(),
            _ => Value::Object(nested.clone()).to_string(),
        },
        Some(other) => other.to_string(),
        None => status_text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&ClientOptions::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_build_http_client_with_proxy() {
        let options =
            ClientOptions::default().with_proxy("http://proxy.example.com:8080".to_string());
        assert!(build_http_client(&options).is_ok());
    }

    #[test]
    fn test_content_type_is_normalized() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_type(&headers), "");
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Application/JSON; charset=utf-8"),
        );
        assert_eq!(content_type(&headers), "application/json; charset=utf-8");
    }

    #[test]
    fn test_failure_message() {
        let not_found = ResponseBody::Json(json!({"message": "not found"}));
        assert_eq!(failure_message(&not_found, "Not Found"), "not found");

        let error_field = ResponseBody::Json(json!({"error": "bad key"}));
        assert_eq!(failure_message(&error_field, "Unauthorized"), "bad key");

        let openai = ResponseBody::Json(json!({
            "error": {"message": "model missing", "type": "invalid_request_error"}
        }));
        assert_eq!(failure_message(&openai, "Bad Request"), "model missing");

        let text = ResponseBody::Text("oops".to_string());
        assert_eq!(failure_message(&text, "Internal Server Error"), "Internal Server Error");

        let null_message = ResponseBody::Json(json!({"message": null}));
        assert_eq!(failure_message(&null_message, "Teapot"), "Teapot");
    }
}
