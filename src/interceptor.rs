//! Request, response and error interceptor chains.
//!
//! Each chain is an ordered list folded over its input: every interceptor
//! receives what the previous one returned. Request and response
//! interceptors may fail, which moves the request onto the error chain. The
//! error chain cannot recover: whatever the last error interceptor returns is
//! handed back to the caller as `Err`.
//!
//! Plain closures implement all three traits:
//!
//! ```
//! use unai_http::client::ClientError;
//! use unai_http::interceptor::Interceptors;
//! use unai_http::model::RequestConfig;
//!
//! let mut chain = Interceptors::default();
//! chain.push_request(|mut config: RequestConfig| {
//!     config.url = format!("/v2{}", config.url);
//!     Ok::<_, ClientError>(config)
//! });
//! chain.push_error(|error: ClientError, _request: Option<&RequestConfig>| {
//!     ClientError::Interceptor(format!("wrapped: {error}"))
//! });
//! ```

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE,
};

use crate::body::is_json_candidate;
use crate::client::ClientError;
use crate::credentials::CredentialStore;
use crate::model::{RequestConfig, Response, ResponseBody};

/// Transforms a request config before dispatch.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn intercept(&self, config: RequestConfig) -> Result<RequestConfig, ClientError>;
}

/// Transforms a successful response before it reaches the caller.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn intercept(
        &self,
        response: Response<ResponseBody>,
    ) -> Result<Response<ResponseBody>, ClientError>;
}

/// Observes or replaces an error on its way to the caller.
///
/// The returned error replaces the incoming one for the rest of the chain.
#[async_trait]
pub trait ErrorInterceptor: Send + Sync {
    async fn intercept(&self, error: ClientError, request: Option<&RequestConfig>) -> ClientError;
}

#[async_trait]
impl<F> RequestInterceptor for F
where
    F: Fn(RequestConfig) -> Result<RequestConfig, ClientError> + Send + Sync,
{
    async fn intercept(&self, config: RequestConfig) -> Result<RequestConfig, ClientError> {
        self(config)
    }
}

#[async_trait]
impl<F> ResponseInterceptor for F
where
    F: Fn(Response<ResponseBody>) -> Result<Response<ResponseBody>, ClientError> + Send + Sync,
{
    async fn intercept(
        &self,
        response: Response<ResponseBody>,
    ) -> Result<Response<ResponseBody>, ClientError> {
        self(response)
    }
}

#[async_trait]
impl<F> ErrorInterceptor for F
where
    F: Fn(ClientError, Option<&RequestConfig>) -> ClientError + Send + Sync,
{
    async fn intercept(&self, error: ClientError, request: Option<&RequestConfig>) -> ClientError {
        self(error, request)
    }
}

/// The three interceptor chains of a client.
///
/// Chains only grow; requests already in flight keep running against the
/// lists they started with.
#[derive(Clone, Default)]
pub struct Interceptors {
    request: Vec<Arc<dyn RequestInterceptor>>,
    response: Vec<Arc<dyn ResponseInterceptor>>,
    error: Vec<Arc<dyn ErrorInterceptor>>,
}

impl std::fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptors")
            .field("request", &self.request.len())
            .field("response", &self.response.len())
            .field("error", &self.error.len())
            .finish()
    }
}

impl Interceptors {
    pub fn push_request(&mut self, interceptor: impl RequestInterceptor + 'static) {
        self.request.push(Arc::new(interceptor));
    }

    pub fn push_response(&mut self, interceptor: impl ResponseInterceptor + 'static) {
        self.response.push(Arc::new(interceptor));
    }

    pub fn push_error(&mut self, interceptor: impl ErrorInterceptor + 'static) {
        self.error.push(Arc::new(interceptor));
    }

    /// Run the request chain in registration order.
    pub async fn run_request(&self, config: RequestConfig) -> Result<RequestConfig, ClientError> {
        let mut config = config;
        for interceptor in &self.request {
            config = interceptor.intercept(config).await?;
        }
        Ok(config)
    }

    /// Run the response chain in registration order.
    pub async fn run_response(
        &self,
        response: Response<ResponseBody>,
    ) -> Result<Response<ResponseBody>, ClientError> {
        let mut response = response;
        for interceptor in &self.response {
            response = interceptor.intercept(response).await?;
        }
        Ok(response)
    }

    /// Run the error chain; the returned error is what the caller sees.
    pub async fn run_error(&self, error: ClientError, request: Option<&RequestConfig>) -> ClientError {
        tracing::warn!(
            error = %error,
            url = request.map(|r| r.url.as_str()).unwrap_or_default(),
            "request failed"
        );

        let mut error = error;
        for interceptor in &self.error {
            error = interceptor.intercept(error, request).await;
        }
        error
    }
}

/// Base URL shared between a client and its default request interceptor.
pub(crate) type SharedBaseUrl = Arc<RwLock<String>>;

pub(crate) fn read_base_url(base_url: &SharedBaseUrl) -> String {
    match base_url.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

const DEFAULT_ACCEPT: &str = "application/json, text/plain, */*";
const X_REQUESTED_WITH: HeaderName = HeaderName::from_static("x-requested-with");

/// Installed first on every client: default headers, credentials and
/// base URL / timeout fallbacks.
pub struct DefaultRequestInterceptor {
    base_url: SharedBaseUrl,
    timeout_ms: u64,
    credentials: Arc<dyn CredentialStore>,
}

impl DefaultRequestInterceptor {
    pub(crate) fn new(
        base_url: SharedBaseUrl,
        timeout_ms: u64,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            base_url,
            timeout_ms,
            credentials,
        }
    }
}

#[async_trait]
impl RequestInterceptor for DefaultRequestInterceptor {
    async fn intercept(&self, mut config: RequestConfig) -> Result<RequestConfig, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        headers.insert(X_REQUESTED_WITH, HeaderValue::from_static("XMLHttpRequest"));
        headers.extend(std::mem::take(&mut config.headers));

        if is_json_candidate(config.body.as_ref(), config.as_json)
            && !headers.contains_key(CONTENT_TYPE)
        {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        if !headers.contains_key(AUTHORIZATION) {
            if let Some(token) = self.credentials.token() {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                    .map_err(|_| ClientError::Config("token is not a valid header value".to_string()))?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
        }

        config.headers = headers;
        if config.base_url.is_none() {
            config.base_url = Some(read_base_url(&self.base_url));
        }
        config.timeout_ms.get_or_insert(self.timeout_ms);

        Ok(config)
    }
}

/// Installed first on every client; hands the response on untouched.
pub struct IdentityResponseInterceptor;

#[async_trait]
impl ResponseInterceptor for IdentityResponseInterceptor {
    async fn intercept(
        &self,
        response: Response<ResponseBody>,
    ) -> Result<Response<ResponseBody>, ClientError> {
        Ok(response)
    }
}

/// Installed first on every client; passes the error on unchanged.
pub struct RethrowErrorInterceptor;

#[async_trait]
impl ErrorInterceptor for RethrowErrorInterceptor {
    async fn intercept(&self, error: ClientError, _request: Option<&RequestConfig>) -> ClientError {
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RequestBody;
    use crate::credentials::MemoryCredentials;
    use crate::model::Method;
    use bytes::Bytes;
    use serde_json::json;

    fn default_interceptor(token: Option<&str>) -> DefaultRequestInterceptor {
        DefaultRequestInterceptor::new(
            Arc::new(RwLock::new("/api".to_string())),
            30_000,
            Arc::new(MemoryCredentials::new(token.map(Into::into))),
        )
    }

    #[tokio::test]
    async fn test_request_chain_runs_in_order() {
        let mut chain = Interceptors::default();
        chain.push_request(|mut config: RequestConfig| -> Result<RequestConfig, ClientError> {
            config.url.push_str("/a");
            Ok(config)
        });
        chain.push_request(|mut config: RequestConfig| -> Result<RequestConfig, ClientError> {
            config.url.push_str("/b");
            Ok(config)
        });

        let config = chain
            .run_request(RequestConfig::new(Method::Get, "/root"))
            .await
            .unwrap();
        assert_eq!(config.url, "/root/a/b");
    }

    #[tokio::test]
    async fn test_request_chain_short_circuits() {
        let mut chain = Interceptors::default();
        chain.push_request(|_config: RequestConfig| -> Result<RequestConfig, ClientError> {
            Err(ClientError::Interceptor("blocked".to_string()))
        });
        chain.push_request(|_config: RequestConfig| -> Result<RequestConfig, ClientError> {
            panic!("must not run after a failure")
        });

        let err = chain
            .run_request(RequestConfig::new(Method::Get, "/"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Interceptor(ref m) if m == "blocked"));
    }

    #[tokio::test]
    async fn test_error_chain_last_value_wins() {
        let mut chain = Interceptors::default();
        chain.push_error(RethrowErrorInterceptor);
        chain.push_error(|error: ClientError, _request: Option<&RequestConfig>| {
            ClientError::Interceptor(format!("first({error})"))
        });
        chain.push_error(|error: ClientError, request: Option<&RequestConfig>| {
            let url = request.map(|r| r.url.clone()).unwrap_or_default();
            ClientError::Interceptor(format!("second({error}) at {url}"))
        });

        let request = RequestConfig::new(Method::Get, "/models");
        let err = chain
            .run_error(ClientError::Config("boom".to_string()), Some(&request))
            .await;
        assert_eq!(
            err.to_string(),
            "Interceptor error: second(Interceptor error: first(Configuration error: boom)) at /models"
        );
    }

    #[tokio::test]
    async fn test_default_headers_and_fallbacks() {
        let config = default_interceptor(Some("sk-test"))
            .intercept(RequestConfig::new(Method::Post, "/v1/chat").with_body(json!({"a": 1})))
            .await
            .unwrap();

        assert_eq!(config.headers[ACCEPT], DEFAULT_ACCEPT);
        assert_eq!(config.headers["x-requested-with"], "XMLHttpRequest");
        assert_eq!(config.headers[CONTENT_TYPE], "application/json");
        assert_eq!(config.headers[AUTHORIZATION], "Bearer sk-test");
        assert_eq!(config.base_url.as_deref(), Some("/api"));
        assert_eq!(config.timeout_ms, Some(30_000));
    }

    #[tokio::test]
    async fn test_caller_values_take_precedence() {
        let config = RequestConfig::new(Method::Post, "/v1/chat")
            .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer caller"))
            .with_header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .with_base_url("https://other.example.com")
            .with_timeout_ms(0)
            .with_body("raw");

        let config = default_interceptor(Some("sk-stored"))
            .intercept(config)
            .await
            .unwrap();

        assert_eq!(config.headers[AUTHORIZATION], "Bearer caller");
        assert_eq!(config.headers[ACCEPT], "text/event-stream");
        assert_eq!(config.headers[CONTENT_TYPE], "text/plain");
        assert_eq!(config.headers.get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(config.base_url.as_deref(), Some("https://other.example.com"));
        assert_eq!(config.timeout_ms, Some(0));
    }

    #[tokio::test]
    async fn test_no_json_content_type_for_binary_or_opt_out() {
        let interceptor = default_interceptor(None);

        let binary = interceptor
            .intercept(
                RequestConfig::new(Method::Put, "/upload").with_body(Bytes::from_static(b"\x00\x01")),
            )
            .await
            .unwrap();
        assert!(!binary.headers.contains_key(CONTENT_TYPE));
        assert!(!binary.headers.contains_key(AUTHORIZATION));

        let opted_out = interceptor
            .intercept(
                RequestConfig::new(Method::Post, "/form")
                    .with_body(RequestBody::Text("a=b".to_string()))
                    .with_json(false),
            )
            .await
            .unwrap();
        assert!(!opted_out.headers.contains_key(CONTENT_TYPE));
    }
}
