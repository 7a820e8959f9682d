//! # unai-http - HTTP client with interceptors and event streams
//!
//! A small, pragmatic async HTTP client for talking to JSON APIs, with a
//! chat completion adapter for OpenAI-compatible servers.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Ordered request, response and error interceptor chains
//! - Per-request timeouts that surface as `ClientError::Timeout`
//! - Server-Sent Events with a `[DONE]` sentinel and a close handle
//! - Pluggable bearer token storage (memory or file)
//!
//! ## Architecture
//!
//! Every call goes through the same pipeline:
//!
//! 1. **Request chain**: default headers, base URL, timeout and
//!    `Authorization`, then caller interceptors in registration order
//! 2. **Transport**: URL building, body encoding, a deadline race around
//!    the reqwest call
//! 3. **Response or error chain**: success responses go through response
//!    interceptors, every failure through error interceptors exactly once
//!
//! Event streams share step 1 and 2, then hand the body to a spawned read
//! loop that decodes `data:` payloads and feeds an [`EventHandler`].
//!
//! ## Example
//! ```no_run
//! use unai_http::{handler_fn, ClientOptions, HttpClient, RequestConfig, Method};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ClientOptions::default()
//!         .with_base_url("https://api.example.com".to_string())
//!         .with_api_key("your-api-key");
//!     let client = HttpClient::new(&options)?;
//!
//!     let user = client
//!         .get::<Value>("/users", Some(RequestConfig::default().with_param("id", 7)))
//!         .await?;
//!     println!("{}", user.data);
//!
//!     let config = RequestConfig::new(Method::Post, "/events").with_body(json!({"topic": "news"}));
//!     let handle = client
//!         .open_stream("/events", Some(config), handler_fn(|data: String| println!("{data}")))
//!         .await?;
//!     handle.finished().await;
//!     Ok(())
//! }
//! ```

pub mod body;
pub mod cancel;
pub mod client;
pub mod credentials;
pub mod http;
pub mod interceptor;
pub mod model;
pub mod options;
pub mod providers;
pub mod sse;
pub mod url;

// Re-exports for convenience
pub use body::RequestBody;
pub use client::{ClientError, HttpClient};
pub use credentials::{CredentialStore, FileCredentials, MemoryCredentials};
pub use interceptor::{ErrorInterceptor, RequestInterceptor, ResponseInterceptor};
pub use model::{Method, RequestConfig, Response, ResponseBody};
pub use options::{ClientOptions, SecretString};
pub use sse::{handler_fn, CloseHandle, EventHandler, SseEvent, StreamState};
