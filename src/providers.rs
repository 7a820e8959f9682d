//! Provider adapters built on the HTTP client.

pub mod openai;

pub use openai::OpenAiChat;
