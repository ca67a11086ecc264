//! # Strand Core
//!
//! Core abstractions and runtime for provider-agnostic text generation.
//!
//! This crate provides the foundational traits and types: the `Provider`
//! encoding boundary, composable layers, a retrying execution engine,
//! streaming decoders and token-bounded conversation memory.

pub mod config;
pub mod error;
pub mod layer;
pub mod memory;
pub mod provider;
pub mod retry;
pub mod runtime;
pub mod stream;
pub mod transport;
pub mod types;

// Re-exports
pub use config::RuntimeConfig;
pub use error::{AiError, ErrorKind};
pub use layer::{HeadersLayer, Layer, LayeredProvider};
pub use memory::{ConversationMemory, MemoryMessage, TiktokenEncoder, TokenEncoder};
pub use provider::Provider;
pub use retry::RetryPolicy;
pub use runtime::{Ensemble, EnsembleOutcome, RuntimeExecutor, RuntimeExecutorBuilder};
pub use stream::TokenStream;
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, StreamingResponse,
};
pub use tokio_util::sync::CancellationToken;
pub use types::*;

/// Result type alias for generation operations
pub type Result<T> = std::result::Result<T, AiError>;
