//! One-shot chat completion against an OpenAI-compatible server.
//!
//! Run with:
//! ```bash
//! export API_BASE_URL="https://api.openai.com"
//! export OPENAI_API_KEY="your-api-key"
//! cargo run --example chat_simple
//! ```

use serde_json::Value;
use tracing_subscriber::EnvFilter;
use unai_http::options::ClientOptions;
use unai_http::providers::openai::{ChatMessage, OpenAiChat};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let options = ClientOptions::from_env();
    if options.api_key.is_none() {
        return Err("OPENAI_API_KEY must be set".into());
    }
    let chat = OpenAiChat::from_options(&options)?;

    let payload = chat
        .completion_request(vec![
            ChatMessage::system("You answer in one short sentence."),
            ChatMessage::user("What is the capital of France?"),
        ])
        .with_temperature(0.2);

    println!("Sending request to model {}...", payload.model);
    let reply: Value = chat.create_chat_completion(&payload).await?;

    match reply["choices"][0]["message"]["content"].as_str() {
        Some(content) => println!("{content}"),
        None => println!("No text content in response: {reply}"),
    }

    Ok(())
}
