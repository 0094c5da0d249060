//! Outbound call rate limiter
//!
//! A gate that spaces calls to one CMS platform at least `min_interval`
//! apart. The lock is held while waiting, so callers are admitted one at a
//! time in arrival order: a token bucket of size one.

use crate::config::RateLimitConfig;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Serializing rate limiter owning its own monotonic timestamp
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter with the given minimum spacing between calls
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(Duration::from_millis(config.min_interval_ms))
    }

    /// Wait until a call may be issued, then stamp it
    ///
    /// Returns the time spent waiting.
    pub async fn acquire(&self) -> Duration {
        let mut last_call = self.last_call.lock().await;

        let waited = match *last_call {
            Some(last) => {
                let elapsed = last.elapsed();
                if elapsed < self.min_interval {
                    let wait_time = self.min_interval - elapsed;
                    debug!(wait_ms = wait_time.as_millis() as u64, "Waiting for rate limit");
                    tokio::time::sleep(wait_time).await;
                    wait_time
                } else {
                    Duration::ZERO
                }
            }
            None => Duration::ZERO,
        };

        *last_call = Some(Instant::now());
        waited
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // Test 1: First call is admitted immediately
    #[tokio::test(start_paused = true)]
    async fn test_first_call_immediate() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        let start = Instant::now();
        let waited = limiter.acquire().await;
        assert_eq!(waited, Duration::ZERO);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    // Test 2: Back-to-back calls are spaced by the interval
    #[tokio::test(start_paused = true)]
    async fn test_sequential_calls_spaced() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    // Test 3: No wait once the interval has already elapsed
    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_idle() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(limiter.acquire().await, Duration::ZERO);
    }

    // Test 4: Concurrent callers never get two stamps closer than the interval
    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_never_closer_than_interval() {
        let interval = Duration::from_millis(250);
        let limiter = Arc::new(RateLimiter::new(interval));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let l = limiter.clone();
                tokio::spawn(async move {
                    l.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();

        for pair in stamps.windows(2) {
            assert!(
                pair[1] - pair[0] >= interval,
                "calls {:?} apart",
                pair[1] - pair[0]
            );
        }
    }

    // Test 5: Zero interval never waits
    #[tokio::test]
    async fn test_zero_interval() {
        let limiter = RateLimiter::from_config(&RateLimitConfig {
            min_interval_ms: 0,
            ..RateLimitConfig::default()
        });
        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert_eq!(limiter.min_interval(), Duration::ZERO);
    }
}
