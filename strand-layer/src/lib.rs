//! # Strand Layers
//!
//! Built-in layers for Strand.
//!
//! Currently implemented layers:
//! - `LoggingLayer`: Logs sizes and timings of every provider encode/decode step
//!
//! Retries are owned by the runtime executor rather than a layer, so a layer
//! never sees the same request twice.
//!
//! ## Usage
//!
//! ```ignore
//! use strand_core::RuntimeExecutor;
//! use strand_layer::LoggingLayer;
//!
//! let executor = RuntimeExecutor::builder(provider)
//!     .layer(LoggingLayer::new())
//!     .finish();
//! ```

pub mod logging;

// Re-exports
pub use logging::{LoggingLayer, LoggingProvider};
