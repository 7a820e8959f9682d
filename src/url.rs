//! Absolute URL construction from a base address, a path and query params.

use serde_json::Value;
use ::url::Url;

use crate::client::ClientError;

/// Build an absolute URL.
///
/// A base without an `http`/`https` scheme (e.g. `/api`) is resolved against
/// `origin` first. The base's path is then joined with `path` by hand, since
/// resolving `/v1` against `http://host/api` would drop the `/api` prefix.
///
/// A query or fragment written into `path` is kept as such. Query parameters
/// are appended after it in order: `null` is skipped, arrays repeat the key
/// once per element, objects are sent as JSON text.
///
/// # Example
/// ```
/// use unai_http::url::build_url;
/// use serde_json::json;
///
/// let url = build_url(
///     "/api",
///     "http://localhost:5173",
///     "v1/chat/completions",
///     &[("a".to_string(), json!(1)), ("b".to_string(), json!([2, 3]))],
/// )
/// .unwrap();
/// assert_eq!(url.as_str(), "http://localhost:5173/api/v1/chat/completions?a=1&b=2&b=3");
/// ```
pub fn build_url(
    base_url: &str,
    origin: &str,
    path: &str,
    params: &[(String, Value)],
) -> Result<Url, ClientError> {
    let origin = Url::parse(origin).map_err(|e| ClientError::Url(format!("{origin}: {e}")))?;

    let base = if base_url.is_empty() {
        origin.clone()
    } else if has_http_scheme(base_url) {
        Url::parse(base_url).map_err(|e| ClientError::Url(format!("{base_url}: {e}")))?
    } else {
        origin
            .join(base_url)
            .map_err(|e| ClientError::Url(format!("{base_url}: {e}")))?
    };

    // An inline `?query` or `#fragment` in the path is kept, not escaped
    let (path, fragment) = match path.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (path, None),
    };
    let (path, inline_query) = match path.split_once('?') {
        Some((path, query)) => (path, Some(query).filter(|q| !q.is_empty())),
        None => (path, None),
    };

    let base_path = base.path().trim_end_matches('/');
    let joined = if path.starts_with('/') {
        format!("{base_path}{path}")
    } else {
        format!("{base_path}/{path}")
    };

    let mut url = base.clone();
    url.set_fragment(None);
    url.set_path(&joined);
    url.set_query(inline_query);

    if params.iter().any(|(_, v)| contributes(v)) {
        let mut query = url.query_pairs_mut();
        for (key, value) in params {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items {
                        query.append_pair(key, &stringify(item));
                    }
                }
                other => {
                    query.append_pair(key, &stringify(other));
                }
            }
        }
    }

    url.set_fragment(fragment);
    Ok(url)
}

fn contributes(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn has_http_scheme(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http:") || lower.starts_with("https:")
}

/// Strings are sent verbatim, everything else as its JSON text.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
