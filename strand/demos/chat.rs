//! Multi-turn chat against an OpenAI-compatible endpoint.
//!
//! This demonstrates:
//! 1. Building an executor with a layer, retry settings and bounded memory
//! 2. Plain generation that records both turns in memory
//! 3. Streaming a reply token by token, then recording it
//!
//! Set `OPENAI_API_KEY`; `OPENAI_API_BASE` and `OPENAI_MODEL` are optional,
//! e.g. `https://api.deepseek.com/v1` and `deepseek-chat`.

use std::sync::Arc;
use std::time::Duration;
use strand::prelude::*;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let api_key = std::env::var("OPENAI_API_KEY")?;
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

    let mut builder = OpenAiProvider::builder().api_key(api_key).model(&model);
    if let Ok(api_base) = std::env::var("OPENAI_API_BASE") {
        builder = builder.api_base(api_base);
    }
    let provider = builder.build()?;

    let config = RuntimeConfig::new()
        .with_max_retries(2)
        .with_request_timeout(Duration::from_secs(30))
        .with_token_budget(2048)
        .with_encoder_model(&model);
    let memory = Arc::new(ConversationMemory::from_config(&config)?);
    memory.add(Role::System, "You are a concise assistant. Answer in two sentences.");

    let executor = RuntimeExecutor::builder(provider)
        .layer(LoggingLayer::new())
        .config(config)
        .memory(memory.clone())
        .default_options(Options::new().with_temperature(0.3))
        .finish();

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    // Example 1: plain generation
    println!("=== Example 1: Generate ===\n");
    let result = executor
        .generate_text("What is the borrow checker?", &cancel)
        .await?;
    println!("{}\n", result.text);
    println!(
        "attempts: {}, memory: {} turns / {} tokens\n",
        result.attempts,
        memory.len(),
        memory.total_tokens()
    );

    // Example 2: streaming follow-up
    println!("=== Example 2: Stream ===\n");
    let prompt = "And how does it relate to lifetimes?";
    let mut stream = executor
        .stream(GenerationRequest::new(prompt), &cancel)
        .await?;

    let mut reply = String::new();
    while let Some(token) = stream.next(&cancel).await? {
        print!("{}", token.text);
        reply.push_str(&token.text);
    }
    println!("\n");
    executor.record_exchange(prompt, reply);

    println!("=== Conversation ===\n");
    println!("{}", memory.render_as_text());

    Ok(())
}
