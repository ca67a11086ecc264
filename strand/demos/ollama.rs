//! Streaming from a local Ollama server.
//!
//! Runs the same prompt against two models concurrently through an
//! [`Ensemble`](strand::Ensemble), then streams one reply as a
//! `futures::Stream`.
//!
//! `OLLAMA_HOST` defaults to `http://localhost:11434`.

use futures::StreamExt;
use std::sync::Arc;
use strand::prelude::*;
use strand::Ensemble;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let host =
        std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".to_string());
    let executor_for = |model: &str| {
        let provider = OllamaProvider::builder()
            .base_url(host.clone())
            .model(model)
            .build();
        Arc::new(
            RuntimeExecutor::builder(provider)
                .layer(LoggingLayer::new())
                .finish(),
        )
    };

    let cancel = CancellationToken::new();
    let request = GenerationRequest::new("Name three rivers in Europe.")
        .with_options(Options::new().with_max_tokens(64));

    // Example 1: ensemble
    println!("=== Example 1: Ensemble ===\n");
    let ensemble = Ensemble::new(vec![executor_for("llama3.2"), executor_for("qwen2.5")])
        .with_worker_limit(2);
    for outcome in ensemble.generate(&request, &cancel).await {
        match outcome.result {
            Ok(result) => println!("[{}] {}\n", outcome.index, result.text),
            Err(e) => println!("[{}] failed: {e}\n", outcome.index),
        }
    }

    // Example 2: stream
    println!("=== Example 2: Stream ===\n");
    let executor = executor_for("llama3.2");
    let mut tokens = executor
        .stream(request, &cancel)
        .await?
        .into_stream(cancel.clone());

    while let Some(token) = tokens.next().await {
        let token = token?;
        print!("{}", token.text);
        if token.output_tokens_so_far > 0 {
            println!(
                "\n\n(prompt tokens: {}, output tokens: {})",
                token.input_tokens_so_far, token.output_tokens_so_far
            );
        }
    }
    println!();

    Ok(())
}
