//! OpenAI-compatible chat completion adapter.
//!
//! Thin layer over [`HttpClient`]: one-shot completions go through the
//! request engine, streaming completions through an event stream whose
//! payloads are parsed into [`ChatCompletionChunk`]s and dispatched to
//! [`ChatStreamCallbacks`].
//! See: <https://platform.openai.com/docs/api-reference/chat>

use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::body::RequestBody;
use crate::client::{ClientError, HttpClient};
use crate::model::{Method, RequestConfig};
use crate::options::ClientOptions;
use crate::sse::{CloseHandle, EventHandler};

/// Path of the chat completion endpoint, relative to the client base URL.
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Messages kept by [`build_history`] when no other limit is chosen.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// Request payload for the chat completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            top_p: None,
            presence_penalty: None,
            frequency_penalty: None,
            stream: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_presence_penalty(mut self, penalty: f32) -> Self {
        self.presence_penalty = Some(penalty);
        self
    }

    pub fn with_frequency_penalty(mut self, penalty: f32) -> Self {
        self.frequency_penalty = Some(penalty);
        self
    }
}

/// Why a completion stopped.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    /// The stream ended without the server naming a reason.
    Done,
    /// A reason not modelled here, such as `tool_calls`.
    #[serde(other)]
    Other,
}

/// One streamed completion chunk.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ChunkDelta,
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ChunkDelta {
    /// Roles other than system, user and assistant read as `None`
    #[serde(default, deserialize_with = "lenient_role")]
    pub role: Option<ChatRole>,
    pub content: Option<String>,
}

fn lenient_role<'de, D>(deserializer: D) -> Result<Option<ChatRole>, D::Error>
where
    D: Deserializer<'de>,
{
    let role = Option::<String>::deserialize(deserializer)?;
    Ok(role.and_then(|role| serde_json::from_value(Value::String(role)).ok()))
}

/// Receives the pieces of a streamed completion.
pub trait ChatStreamCallbacks: Send + 'static {
    /// The assistant role announced by the first chunk. Called at most once.
    fn on_role(&mut self, _role: ChatRole) {}

    /// A content delta.
    fn on_text(&mut self, text: String);

    fn on_error(&mut self, error: ClientError) {
        tracing::error!(error = %error, "chat completion stream failed");
    }

    /// Called at most once.
    fn on_finished(&mut self, _reason: FinishReason) {}
}

/// Turns raw event payloads into [`ChatStreamCallbacks`] calls.
pub struct ChunkDispatcher<C> {
    callbacks: Arc<Mutex<C>>,
    role_seen: bool,
    finished: bool,
}

impl<C: ChatStreamCallbacks> ChunkDispatcher<C> {
    pub fn new(callbacks: C) -> Self {
        Self::shared(Arc::new(Mutex::new(callbacks)))
    }

    fn shared(callbacks: Arc<Mutex<C>>) -> Self {
        Self {
            callbacks,
            role_seen: false,
            finished: false,
        }
    }

    fn callbacks(&self) -> MutexGuard<'_, C> {
        lock(&self.callbacks)
    }

    fn finish(&mut self, reason: FinishReason) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.callbacks().on_finished(reason);
    }
}

impl<C: ChatStreamCallbacks> EventHandler for ChunkDispatcher<C> {
    fn on_event(&mut self, data: String) {
        let chunk: ChatCompletionChunk = match serde_json::from_str(&data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, payload = %data, "skipping unparseable chunk");
                return;
            }
        };
        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };

        if let Some(role) = choice.delta.role {
            if !self.role_seen {
                self.role_seen = true;
                self.callbacks().on_role(role);
            }
        }
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            self.callbacks().on_text(content);
        }
        if let Some(reason) = choice.finish_reason {
            self.finish(reason);
        }
    }

    fn on_done(&mut self) {
        self.finish(FinishReason::Done);
    }

    fn on_error(&mut self, error: ClientError) {
        self.callbacks().on_error(error);
    }
}

fn lock<C>(callbacks: &Mutex<C>) -> MutexGuard<'_, C> {
    callbacks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Chat completion client over an [`HttpClient`].
///
/// # Example
/// ```no_run
/// use unai_http::options::ClientOptions;
/// use unai_http::providers::openai::{ChatMessage, OpenAiChat};
/// use serde_json::Value;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let chat = OpenAiChat::from_options(&ClientOptions::from_env())?;
///     let payload = chat.completion_request(vec![ChatMessage::user("Hello!")]);
///     let reply: Value = chat.create_chat_completion(&payload).await?;
///     println!("{}", reply["choices"][0]["message"]["content"]);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: HttpClient,
    model: Option<String>,
}

impl OpenAiChat {
    pub fn new(client: HttpClient, model: Option<String>) -> Self {
        Self { client, model }
    }

    /// Build the underlying client from options; the model comes from
    /// `options.model`.
    pub fn from_options(options: &ClientOptions) -> Result<Self, ClientError> {
        Ok(Self::new(HttpClient::new(options)?, options.model.clone()))
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub fn default_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// A request for `messages` using the default model.
    pub fn completion_request(&self, messages: Vec<ChatMessage>) -> ChatCompletionRequest {
        ChatCompletionRequest::new(self.default_model(), messages)
    }

    /// Send a non-streaming completion and return the decoded payload.
    pub async fn create_chat_completion<T: DeserializeOwned>(
        &self,
        payload: &ChatCompletionRequest,
    ) -> Result<T, ClientError> {
        let body = RequestBody::json(payload)?;
        let response = self
            .client
            .post(CHAT_COMPLETIONS_PATH, Some(body), None)
            .await?;
        Ok(response.data)
    }

    /// Start a streaming completion.
    ///
    /// `stream` is forced on. If the stream cannot be opened the error goes
    /// to `callbacks.on_error` and the returned handle is already closed.
    pub async fn stream_chat_completion<C: ChatStreamCallbacks>(
        &self,
        payload: ChatCompletionRequest,
        callbacks: C,
    ) -> CloseHandle {
        let callbacks = Arc::new(Mutex::new(callbacks));
        let payload = ChatCompletionRequest {
            stream: Some(true),
            ..payload
        };

        let opened = match RequestBody::json(&payload) {
            Ok(body) => {
                let config =
                    RequestConfig::new(Method::Post, CHAT_COMPLETIONS_PATH).with_body(body);
                let dispatcher = ChunkDispatcher::shared(Arc::clone(&callbacks));
                self.client
                    .open_stream(CHAT_COMPLETIONS_PATH, Some(config), dispatcher)
                    .await
            }
            Err(e) => Err(e),
        };

        match opened {
            Ok(handle) => handle,
            Err(e) => {
                lock(&callbacks).on_error(e);
                CloseHandle::detached()
            }
        }
    }
}

/// Keep the most recent `max` messages, oldest first.
pub fn build_history(messages: &[ChatMessage], max: usize) -> Vec<ChatMessage> {
    messages[messages.len().saturating_sub(max)..].to_vec()
}
