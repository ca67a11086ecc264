//! Runtime configuration.
//!
//! Everything the runtime reads from its environment arrives through a
//! [`RuntimeConfig`] passed to the executor builder or to
//! [`ConversationMemory::from_config`](crate::memory::ConversationMemory::from_config);
//! there is no process-wide state, so independently configured executors can
//! coexist.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-conversation token budget
pub const DEFAULT_TOKEN_BUDGET: usize = 4096;

/// Runtime settings consumed by the executor and memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Timeout applied to every network call, in milliseconds
    pub request_timeout_ms: u64,
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds
    pub initial_retry_delay_ms: u64,
    /// Upper bound on any retry delay, in milliseconds
    pub max_retry_delay_ms: u64,
    /// Token budget for conversation memory
    pub token_budget: usize,
    /// Model whose tokenizer sizes memory messages
    pub encoder_model: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 60_000,
            max_retries: 3,
            initial_retry_delay_ms: 100,
            max_retry_delay_ms: 10_000,
            token_budget: DEFAULT_TOKEN_BUDGET,
            encoder_model: None,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set initial delay
    pub fn with_initial_retry_delay(mut self, delay: Duration) -> Self {
        self.initial_retry_delay_ms = duration_ms(delay);
        self
    }

    /// Set maximum delay
    pub fn with_max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay_ms = duration_ms(delay);
        self
    }

    /// Set memory token budget
    pub fn with_token_budget(mut self, budget: usize) -> Self {
        self.token_budget = budget;
        self
    }

    /// Select the memory encoder by model name
    pub fn with_encoder_model(mut self, model: impl Into<String>) -> Self {
        self.encoder_model = Some(model.into());
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_millis(self.initial_retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// Fresh retry policy for one logical call
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            self.initial_retry_delay(),
            self.max_retry_delay(),
        )
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"max_retries": 5, "encoder_model": "gpt-4o"}"#)
                .expect("config should parse");

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.encoder_model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.token_budget, DEFAULT_TOKEN_BUDGET);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn retry_policy_reflects_settings() {
        let config = RuntimeConfig::new()
            .with_max_retries(1)
            .with_initial_retry_delay(Duration::from_millis(20))
            .with_max_retry_delay(Duration::from_millis(30));

        let mut policy = config.retry_policy();
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.next_delay(), Duration::from_millis(20));
    }
}
