//! In-memory [`RateLimiter`] fixture.
//!
//! Same sliding-window algorithm as `platform-shared-kv`'s
//! `RedisRateLimiter` (`stores/rate_limiter_redis.rs`), over a
//! `Mutex<HashMap<String, Vec<Instant>>>` instead of a Redis sorted set.

use platform_shared_kv::{KvError, RateLimiter, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// An in-memory sliding-window rate limiter.
#[derive(Default)]
pub struct InMemoryRateLimiter {
    windows: Mutex<HashMap<String, Vec<Instant>>>,
}

impl InMemoryRateLimiter {
    /// Build an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimiter for InMemoryRateLimiter {
    async fn check_and_record(&self, key: &str, max_attempts: u32, window: Duration) -> Result<()> {
        let now = Instant::now();
        let mut guard = self.windows.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let attempts = guard.entry(key.to_string()).or_default();
        attempts.retain(|seen_at| now.duration_since(*seen_at) < window);

        if attempts.len() >= max_attempts as usize {
            return Err(KvError::TooManyAttempts { retry_after: window });
        }

        attempts.push(now);
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.windows.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(key);
        Ok(())
    }

    async fn get_attempts(&self, key: &str) -> Result<u32> {
        #[allow(clippy::cast_possible_truncation)]
        let count = self
            .windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .map_or(0, |attempts| attempts.len() as u32);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_once_the_window_limit_is_reached() {
        let limiter = InMemoryRateLimiter::new();
        let key = "test-key";

        for _ in 0..3 {
            limiter.check_and_record(key, 3, Duration::from_secs(60)).await.expect("within budget");
        }

        let result = limiter.check_and_record(key, 3, Duration::from_secs(60)).await;
        assert!(matches!(result, Err(KvError::TooManyAttempts { .. })));
    }

    #[tokio::test]
    async fn reset_clears_the_window() {
        let limiter = InMemoryRateLimiter::new();
        let key = "test-key";

        for _ in 0..3 {
            limiter.check_and_record(key, 3, Duration::from_secs(60)).await.expect("within budget");
        }
        assert!(limiter.check_and_record(key, 3, Duration::from_secs(60)).await.is_err());

        limiter.reset(key).await.expect("reset");
        assert!(limiter.check_and_record(key, 3, Duration::from_secs(60)).await.is_ok());
    }
}
