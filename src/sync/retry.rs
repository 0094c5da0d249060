//! Retry policy with capped exponential backoff
//!
//! Shared by the job queues and the bulk reconciler. Neither sleeps inline:
//! a failed item is re-inserted at the tail once its delay has elapsed, so
//! the policy only answers "again?" and "after how long?".

use crate::config::BackoffConfig;
use crate::error::RetryableError;
use rand::Rng;
use std::time::Duration;

/// Retry policy with exponential backoff support
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffConfig,
}

impl RetryPolicy {
    /// Allow up to `max_attempts` attempts in total (the first one included)
    pub fn new(max_attempts: u32, backoff: BackoffConfig) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Whether an item that just failed its `attempts`-th attempt goes again
    pub fn should_retry<E: RetryableError>(&self, err: &E, attempts: u32) -> bool {
        err.is_retryable() && attempts < self.max_attempts
    }

    /// Delay before retry number `attempt` (zero-based)
    ///
    /// Uses exponential backoff: initial_backoff * multiplier^attempt,
    /// capped at max_backoff_ms with optional jitter
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff.initial_backoff_ms as f64
            * self.backoff.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.backoff.max_backoff_ms as f64);

        let delay = if self.backoff.jitter {
            // 50-100% of the calculated backoff
            let jitter = rand::thread_rng().gen_range(0.5..1.0);
            capped * jitter
        } else {
            capped
        };

        Duration::from_millis(delay as u64)
    }

    /// Delay for a retry, honouring a `Retry-After` the CMS asked for
    pub fn delay_for<E: RateLimitHint>(&self, err: &E, attempt: u32) -> Duration {
        let backoff = self.calculate_backoff(attempt);
        match err.retry_after() {
            Some(hint) => backoff.max(hint.min(Duration::from_millis(self.backoff.max_backoff_ms))),
            None => backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Errors that can tell how long the remote side wants callers to back off
pub trait RateLimitHint {
    fn retry_after(&self) -> Option<Duration>;
}

impl RateLimitHint for crate::error::SyncError {
    fn retry_after(&self) -> Option<Duration> {
        match self {
            crate::error::SyncError::RateLimited(secs) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}
