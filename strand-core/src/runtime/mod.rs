//! Runtime layer.
//!
//! The runtime sits between callers and providers. It is responsible for:
//! - merging per-call options over executor defaults
//! - building the request context from conversation memory
//! - sending requests through the HTTP transport with timeouts and retries
//! - opening token streams
//! - fanning requests out across several executors

pub mod ensemble;
pub mod executor;

pub use ensemble::{Ensemble, EnsembleOutcome};
pub use executor::{RuntimeExecutor, RuntimeExecutorBuilder};
