//! # Strand Providers
//!
//! Provider implementations for various generation services. Providers only
//! encode requests and decode responses; the runtime performs the I/O.

pub mod ollama;
pub mod openai;

// Re-exports
pub use ollama::{OllamaBuilder, OllamaProvider};
pub use openai::{OpenAiBuilder, OpenAiProvider};

use strand_core::error::AiError;

/// Create a DeepSeek provider (OpenAI-compatible)
///
/// DeepSeek uses the OpenAI API protocol but with a different endpoint.
///
/// # Example
///
/// ```ignore
/// use strand_provider::deepseek;
///
/// let provider = deepseek("your-api-key")?;
/// ```
pub fn deepseek(api_key: impl Into<String>) -> Result<OpenAiProvider, AiError> {
    OpenAiProvider::builder()
        .api_key(api_key)
        .api_base("https://api.deepseek.com/v1")
        .model("deepseek-chat")
        .build_with_id("deepseek", "DeepSeek")
}
