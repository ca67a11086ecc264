//! # Strand
//!
//! Provider-agnostic text generation runtime.
//!
//! Strand sends prompts to any model provider through one execution engine
//! that retries transient failures, decodes streaming responses into tokens
//! and keeps a token-bounded conversation memory.
//!
//! ## Features
//!
//! - **Provider boundary**: providers only encode requests and decode responses
//! - **Composable layers**: wrap providers with logging or extra headers
//! - **Retries with backoff**: exponential, capped, cancellable
//! - **Streaming**: event-delimited and newline-delimited feeds, pulled one token at a time
//! - **Bounded memory**: oldest turns are evicted once the token budget is exceeded
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! strand = { version = "0.1", features = ["openai", "layers"] }
//! ```
//!
//! ```ignore
//! use strand::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = OpenAiProvider::builder()
//!     .api_key("your-api-key")
//!     .build()?;
//!
//! let memory = Arc::new(ConversationMemory::for_model(4096, "gpt-4o-mini")?);
//! let executor = RuntimeExecutor::builder(provider)
//!     .layer(LoggingLayer::new())
//!     .memory(memory)
//!     .finish();
//!
//! let cancel = CancellationToken::new();
//! let result = executor.generate_text("What is Rust?", &cancel).await?;
//! println!("{}", result.text);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Includes `openai` provider and layers
//! - `openai`: OpenAI-compatible provider support
//! - `ollama`: Ollama provider support
//! - `providers`: All available providers
//! - `layers`: Built-in layers
//! - `full`: All features enabled

// Re-export core types and traits
pub use strand_core::*;

// Re-export providers under `provider` module
#[cfg(feature = "strand-provider")]
pub mod provider {
    //! Provider implementations.
    pub use strand_provider::*;
}

// Re-export layers under `layer` module
#[cfg(feature = "strand-layer")]
pub mod layer {
    //! Built-in provider layers.
    pub use strand_core::layer::*;
    pub use strand_layer::*;
}

/// Prelude module for convenient imports
pub mod prelude {
    //! Prelude module containing the most commonly used types and traits.
    //!
    //! ```
    //! use strand::prelude::*;
    //! ```

    pub use crate::{
        AiError, CancellationToken, ConversationMemory, ErrorKind, GenerationRequest,
        GenerationResult, Layer, Options, Provider, Result, Role, RuntimeConfig, RuntimeExecutor,
        StreamToken, TokenStream,
    };

    #[cfg(feature = "strand-provider")]
    pub use crate::provider::*;

    #[cfg(feature = "strand-layer")]
    pub use crate::layer::LoggingLayer;
}
