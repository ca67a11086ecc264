//! Token encoders used to size conversation memory.

use crate::error::AiError;
use std::fmt::Debug;
use tiktoken_rs::CoreBPE;

/// Encoding used when a model name is not recognised
pub const DEFAULT_ENCODING: &str = "cl100k_base";

/// Counts memory tokens in a piece of text.
pub trait TokenEncoder: Send + Sync + Debug {
    fn count(&self, text: &str) -> usize;
}

/// tiktoken-backed encoder.
pub struct TiktokenEncoder {
    bpe: CoreBPE,
    encoding: String,
}

impl Debug for TiktokenEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenEncoder")
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl TiktokenEncoder {
    /// Encoder for `model`, falling back to [`DEFAULT_ENCODING`] when the
    /// model name is unknown.
    pub fn for_model(model: &str) -> Result<Self, AiError> {
        match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => Ok(Self {
                bpe,
                encoding: model.to_string(),
            }),
            Err(err) => {
                tracing::debug!(
                    model,
                    error = %err,
                    "no tokenizer for model, using {}",
                    DEFAULT_ENCODING
                );
                Self::default_encoding()
            }
        }
    }

    /// The default encoding
    pub fn default_encoding() -> Result<Self, AiError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|err| {
            AiError::configuration(format!(
                "failed to load {DEFAULT_ENCODING} tokenizer: {err}"
            ))
        })?;
        Ok(Self {
            bpe,
            encoding: DEFAULT_ENCODING.to_string(),
        })
    }

    /// Model or encoding name this encoder was resolved from
    pub fn encoding(&self) -> &str {
        &self.encoding
    }
}

impl TokenEncoder for TiktokenEncoder {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}
