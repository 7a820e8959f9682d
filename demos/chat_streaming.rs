//! Streaming chat completion, printing tokens as they arrive.
//!
//! Run with:
//! ```bash
//! export API_BASE_URL="https://api.openai.com"
//! export OPENAI_API_KEY="your-api-key"
//! cargo run --example chat_streaming
//! ```

use std::io::Write;

use tracing_subscriber::EnvFilter;
use unai_http::client::ClientError;
use unai_http::options::ClientOptions;
use unai_http::providers::openai::{
    build_history, ChatMessage, ChatRole, ChatStreamCallbacks, FinishReason, OpenAiChat,
    DEFAULT_HISTORY_LIMIT,
};
use unai_http::StreamState;

struct Printer;

impl ChatStreamCallbacks for Printer {
    fn on_role(&mut self, role: ChatRole) {
        print!("[{role:?}] ");
    }

    fn on_text(&mut self, text: String) {
        print!("{text}");
        let _ = std::io::stdout().flush();
    }

    fn on_error(&mut self, error: ClientError) {
        eprintln!("\nstream error: {error}");
    }

    fn on_finished(&mut self, reason: FinishReason) {
        println!("\n(finished: {reason:?})");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let chat = OpenAiChat::from_options(&ClientOptions::from_env())?;

    let conversation = vec![
        ChatMessage::system("You are a concise assistant."),
        ChatMessage::user("Name three rivers in Europe."),
        ChatMessage::assistant("The Danube, the Rhine and the Seine."),
        ChatMessage::user("Describe the longest one in two sentences."),
    ];
    let payload = chat.completion_request(build_history(&conversation, DEFAULT_HISTORY_LIMIT));

    let handle = chat.stream_chat_completion(payload, Printer).await;

    tokio::select! {
        state = handle.finished() => {
            if state == StreamState::Failed {
                return Err("stream failed".into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            handle.close();
            println!("\n(closed)");
        }
    }

    Ok(())
}
