//! HTTP client with interceptor chains, and its error types.

use std::sync::{Arc, RwLock};

use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::body::{encode, is_json_candidate, RequestBody};
use crate::cancel::{derive_token, Deadline};
use crate::credentials::{CredentialStore, MemoryCredentials};
use crate::http::{build_http_client, failure_message, read_body, read_error_body, status_text};
use crate::interceptor::{
    read_base_url, DefaultRequestInterceptor, ErrorInterceptor, IdentityResponseInterceptor,
    Interceptors, RequestInterceptor, ResponseInterceptor, RethrowErrorInterceptor, SharedBaseUrl,
};
use crate::model::{Method, RequestConfig, Response, ResponseBody};
use crate::options::{ClientOptions, SecretString};
use crate::sse::{pump, CloseHandle, EventHandler, SSEResponseExt, StreamState};
use crate::url::build_url;

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request never produced a response (connection, DNS, I/O)
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The per-request deadline elapsed
    #[error("Request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The server answered with a non-2xx status
    #[error("{message}")]
    Status {
        status: u16,
        message: String,
        data: ResponseBody,
        request: Box<RequestConfig>,
    },

    /// An event stream was refused with a non-2xx status
    #[error("{message}")]
    StreamOpen {
        status: u16,
        message: String,
        data: ResponseBody,
        request: Box<RequestConfig>,
    },

    /// An event stream response came back without a body to read
    #[error("SSE reader not available")]
    StreamUnavailable { request: Box<RequestConfig> },

    /// A request body could not be serialized
    #[error("Encoding error: {0}")]
    Encoding(#[source] serde_json::Error),

    /// A response body could not be parsed or decoded
    #[error("JSON parse error: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Raised by a caller-supplied interceptor
    #[error("Interceptor error: {0}")]
    Interceptor(String),

    #[error("Credential storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ClientError {
    /// HTTP status, when the server responded.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } | ClientError::StreamOpen { status, .. } => {
                Some(*status)
            }
            ClientError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Response body of a failed request.
    pub fn data(&self) -> Option<&ResponseBody> {
        match self {
            ClientError::Status { data, .. } | ClientError::StreamOpen { data, .. } => Some(data),
            _ => None,
        }
    }

    /// The finalized config of the request that failed.
    pub fn request(&self) -> Option<&RequestConfig> {
        match self {
            ClientError::Status { request, .. }
            | ClientError::StreamOpen { request, .. }
            | ClientError::StreamUnavailable { request } => Some(request),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            ClientError::Timeout { .. } => true,
            ClientError::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// HTTP client with request, response and error interceptor chains.
///
/// Cloning is cheap; clones share the base URL, the credential store and
/// the interceptors registered so far.
///
/// # Example
/// ```no_run
/// use unai_http::client::HttpClient;
/// use unai_http::options::ClientOptions;
/// use serde_json::Value;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = HttpClient::new(&ClientOptions::from_env())?;
///     let models = client.get::<Value>("/v1/models", None).await?;
///     println!("{}", models.data);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    origin: String,
    base_url: SharedBaseUrl,
    credentials: Arc<dyn CredentialStore>,
    interceptors: Arc<Interceptors>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("origin", &self.origin)
            .field("base_url", &self.base_url())
            .field("interceptors", &self.interceptors)
            .finish()
    }
}

impl HttpClient {
    /// Create a client with an in-memory credential store seeded from
    /// `options.api_key`.
    pub fn new(options: &ClientOptions) -> Result<Self, ClientError> {
        let credentials = Arc::new(MemoryCredentials::new(options.api_key.clone()));
        Self::build(options, credentials)
    }

    /// Create a client backed by the given credential store.
    ///
    /// `options.api_key`, when set, is written into the store.
    pub fn with_credentials(
        options: &ClientOptions,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, ClientError> {
        if let Some(key) = &options.api_key {
            credentials.set_token(Some(key.clone()))?;
        }
        Self::build(options, credentials)
    }

    fn build(options: &ClientOptions, credentials: Arc<dyn CredentialStore>) -> Result<Self, ClientError> {
        let http = build_http_client(options)?;
        let base_url: SharedBaseUrl = Arc::new(RwLock::new(options.base_url.clone()));
        let timeout_ms = u64::try_from(options.timeout.as_millis()).unwrap_or(u64::MAX);

        let mut interceptors = Interceptors::default();
        interceptors.push_request(DefaultRequestInterceptor::new(
            base_url.clone(),
            timeout_ms,
            credentials.clone(),
        ));
        interceptors.push_response(IdentityResponseInterceptor);
        interceptors.push_error(RethrowErrorInterceptor);

        Ok(Self {
            http,
            origin: options.origin.clone(),
            base_url,
            credentials,
            interceptors: Arc::new(interceptors),
        })
    }

    pub fn base_url(&self) -> String {
        read_base_url(&self.base_url)
    }

    /// Change the base URL used by requests that don't set their own.
    pub fn set_base_url(&self, base_url: impl Into<String>) {
        let base_url = base_url.into();
        match self.base_url.write() {
            Ok(mut guard) => *guard = base_url,
            Err(poisoned) => *poisoned.into_inner() = base_url,
        }
    }

    /// Store or clear the bearer token.
    pub fn set_token(&self, token: Option<SecretString>) -> Result<(), ClientError> {
        self.credentials.set_token(token)
    }

    pub fn token(&self) -> Option<SecretString> {
        self.credentials.token()
    }

    /// Append a request interceptor. Runs after those already registered.
    pub fn use_request_interceptor(&mut self, interceptor: impl RequestInterceptor + 'static) {
        Arc::make_mut(&mut self.interceptors).push_request(interceptor);
    }

    /// Append a response interceptor. Runs after those already registered.
    pub fn use_response_interceptor(&mut self, interceptor: impl ResponseInterceptor + 'static) {
        Arc::make_mut(&mut self.interceptors).push_response(interceptor);
    }

    /// Append an error interceptor. Runs after those already registered.
    pub fn use_error_interceptor(&mut self, interceptor: impl ErrorInterceptor + 'static) {
        Arc::make_mut(&mut self.interceptors).push_error(interceptor);
    }

    /// Send a request and decode the response payload into `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        config: RequestConfig,
    ) -> Result<Response<T>, ClientError> {
        self.run(config, |data| data.decode().map_err(ClientError::Decode))
            .await
    }

    /// Send a request and return the payload as read.
    pub async fn request_raw(
        &self,
        config: RequestConfig,
    ) -> Result<Response<ResponseBody>, ClientError> {
        self.run(config, Ok).await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        config: Option<RequestConfig>,
    ) -> Result<Response<T>, ClientError> {
        self.request(with_target(config, Method::Get, url, None)).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        url: &str,
        body: Option<RequestBody>,
        config: Option<RequestConfig>,
    ) -> Result<Response<T>, ClientError> {
        self.request(with_target(config, Method::Post, url, body)).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        url: &str,
        body: Option<RequestBody>,
        config: Option<RequestConfig>,
    ) -> Result<Response<T>, ClientError> {
        self.request(with_target(config, Method::Put, url, body)).await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        url: &str,
        body: Option<RequestBody>,
        config: Option<RequestConfig>,
    ) -> Result<Response<T>, ClientError> {
        self.request(with_target(config, Method::Patch, url, body)).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        url: &str,
        config: Option<RequestConfig>,
    ) -> Result<Response<T>, ClientError> {
        self.request(with_target(config, Method::Delete, url, None)).await
    }

    /// Every failure except body encoding goes through the error chain here,
    /// exactly once.
    async fn run<T>(
        &self,
        mut config: RequestConfig,
        decode: impl FnOnce(ResponseBody) -> Result<T, ClientError>,
    ) -> Result<Response<T>, ClientError> {
        config.method.get_or_insert(Method::Get);
        let interceptors = Arc::clone(&self.interceptors);
        let original = config.clone();
        let mut finalized = None;

        let result = match self.dispatch(&interceptors, config, &mut finalized).await {
            Ok(response) => response.map_data(decode),
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => Ok(response),
            Err(e @ ClientError::Encoding(_)) => Err(e),
            Err(e) => {
                let request = finalized.as_ref().unwrap_or(&original);
                Err(interceptors.run_error(e, Some(request)).await)
            }
        }
    }

    async fn dispatch(
        &self,
        interceptors: &Interceptors,
        config: RequestConfig,
        finalized: &mut Option<RequestConfig>,
    ) -> Result<Response<ResponseBody>, ClientError> {
        let config = finalized.insert(interceptors.run_request(config).await?);

        let deadline = derive_token(config.timeout_ms);
        let builder = self.prepare(config)?;

        tracing::debug!(method = %config.method.unwrap_or_default(), url = %config.url, "sending request");

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let data = read_body(response).await?;
            Ok::<_, ClientError>((status, headers, data))
        };
        let (status, headers, data) = within(deadline.as_ref(), exchange).await?;

        tracing::debug!(status = status.as_u16(), url = %config.url, "response received");

        let status_text = status_text(status);
        if !status.is_success() {
            let message = format!(
                "HTTP {} {}",
                status.as_u16(),
                failure_message(&data, &status_text)
            );
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
                data,
                request: Box::new(config.clone()),
            });
        }

        let response = Response {
            status: status.as_u16(),
            status_text,
            headers,
            data,
            request: config.clone(),
        };
        interceptors.run_response(response).await
    }

    /// Resolve the URL and encode the body of a finalized config.
    fn prepare(&self, config: &RequestConfig) -> Result<reqwest::RequestBuilder, ClientError> {
        let base_url = match &config.base_url {
            Some(base_url) => base_url.clone(),
            None => self.base_url(),
        };
        let url = build_url(&base_url, &self.origin, &config.url, &config.params)?;

        let as_json = is_json_candidate(config.body.as_ref(), config.as_json);
        let body = encode(config.body.as_ref(), as_json)?;

        let mut builder = self
            .http
            .request(config.method.unwrap_or_default().into(), url)
            .headers(config.headers.clone());

        if let Some(body) = body {
            if !config.headers.contains_key(CONTENT_TYPE) {
                if let Some(content_type) = body.implied_content_type() {
                    builder = builder.header(CONTENT_TYPE, content_type);
                }
            }
            builder = builder.body(body);
        }
        Ok(builder)
    }

    /// Open an event stream and feed its payloads to `handler`.
    ///
    /// The stream is a `POST` unless the config sets a method.
    /// `Accept: text/event-stream` and a JSON content type are
    /// added unless already present, and no timeout applies unless the
    /// config sets one.
    ///
    /// Failures up to and including the response status are returned here
    /// after passing through the error chain. Once streaming, failures go to
    /// the error chain and then `handler.on_error`.
    pub async fn open_stream<H: EventHandler>(
        &self,
        url: &str,
        config: Option<RequestConfig>,
        handler: H,
    ) -> Result<CloseHandle, ClientError> {
        let mut config = config.unwrap_or_default();
        config.url = url.to_string();
        config.method.get_or_insert(Method::Post);
        if !config.headers.contains_key(ACCEPT) {
            config
                .headers
                .insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        }
        if !config.headers.contains_key(CONTENT_TYPE) {
            config
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        config.timeout_ms.get_or_insert(0);

        let interceptors = Arc::clone(&self.interceptors);
        let original = config.clone();
        let mut finalized = None;

        let (response, deadline) = match self.connect(&interceptors, config, &mut finalized).await {
            Ok(opened) => opened,
            Err(e @ ClientError::Encoding(_)) => return Err(e),
            Err(e) => {
                let request = finalized.as_ref().unwrap_or(&original);
                return Err(interceptors.run_error(e, Some(request)).await);
            }
        };
        let request = finalized.unwrap_or(original);

        let close = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(StreamState::Streaming);
        tokio::spawn(pump(
            response.sse(),
            handler,
            close.clone(),
            deadline,
            state_tx,
            interceptors,
            request,
        ));

        Ok(CloseHandle::new(close, state_rx))
    }

    async fn connect(
        &self,
        interceptors: &Interceptors,
        config: RequestConfig,
        finalized: &mut Option<RequestConfig>,
    ) -> Result<(reqwest::Response, Option<Deadline>), ClientError> {
        let config = finalized.insert(interceptors.run_request(config).await?);

        let deadline = derive_token(config.timeout_ms);
        let builder = self.prepare(config)?;

        tracing::debug!(method = %config.method.unwrap_or_default(), url = %config.url, "opening event stream");
        let send = async { Ok::<_, ClientError>(builder.send().await?) };
        let response = within(deadline.as_ref(), send).await?;
        let status = response.status();

        if !status.is_success() {
            let message = format!("SSE HTTP {} {}", status.as_u16(), status_text(status));
            let data = read_error_body(response).await;
            return Err(ClientError::StreamOpen {
                status: status.as_u16(),
                message,
                data,
                request: Box::new(config.clone()),
            });
        }

        if response.content_length() == Some(0) {
            return Err(ClientError::StreamUnavailable {
                request: Box::new(config.clone()),
            });
        }

        Ok((response, deadline))
    }
}

/// Fill in the target of a shorthand call.
fn with_target(
    config: Option<RequestConfig>,
    method: Method,
    url: &str,
    body: Option<RequestBody>,
) -> RequestConfig {
    let mut config = config.unwrap_or_default();
    config.method = Some(method);
    config.url = url.to_string();
    if body.is_some() {
        config.body = body;
    }
    config
}

/// Run `fut`, failing with a timeout if the deadline fires first.
async fn within<T>(
    deadline: Option<&Deadline>,
    fut: impl std::future::Future<Output = Result<T, ClientError>>,
) -> Result<T, ClientError> {
    let Some(deadline) = deadline else {
        return fut.await;
    };

    tokio::select! {
        result = fut => result,
        _ = deadline.expired() => Err(ClientError::Timeout {
            timeout_ms: deadline.timeout_ms(),
        }),
    }
}
