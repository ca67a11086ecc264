//! Retry policy with capped exponential backoff.

use crate::error::AiError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Doubling stops after this many steps; later delays reuse the last step.
const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Decides whether a failed attempt is retried and how long to wait first.
///
/// A policy belongs to exactly one logical call (a request or a stream) and
/// tracks how many retries that call has already spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    attempts_so_far: u32,
}

impl RetryPolicy {
    /// Create a policy allowing `max_attempts` retries after the first try
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            attempts_so_far: 0,
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Retries spent so far
    pub fn attempts_so_far(&self) -> u32 {
        self.attempts_so_far
    }

    /// Whether `error` should be retried given the retries already spent
    pub fn should_retry(&self, error: &AiError) -> bool {
        error.is_retryable() && self.attempts_so_far < self.max_attempts
    }

    /// Delay before the next retry; consumes one retry from the budget.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempts_so_far.min(MAX_BACKOFF_EXPONENT);
        self.attempts_so_far = self.attempts_so_far.saturating_add(1);

        self.initial_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Forget spent retries, e.g. after a stream makes progress again
    pub fn reset(&mut self) {
        self.attempts_so_far = 0;
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100), Duration::from_secs(10))
    }
}

/// Sleep for `delay` unless `cancel` fires first.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), AiError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AiError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
