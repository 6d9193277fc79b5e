//! Redis-based rate limiter implementation.
//!
//! Sliding window over a Redis sorted set:
//! 1. Remove entries outside the window (`ZREMRANGEBYSCORE`).
//! 2. Count remaining entries (`ZCARD`).
//! 3. Add the current attempt (`ZADD`) and refresh the key TTL.
//!
//! Steps 1-3 run as one atomic pipeline so two concurrent requests can't
//! both pass the check before either records.

use crate::error::{KvError, Result};
use crate::providers::RateLimiter;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// `Redis`-based rate limiter using sliding window algorithm.
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn_manager: ConnectionManager,
}

impl RedisRateLimiter {
    /// Create a new `Redis` rate limiter.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::StoreUnavailable`] if connecting to `Redis` fails.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| KvError::StoreUnavailable(format!("redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| KvError::StoreUnavailable(format!("redis connection manager: {e}")))?;

        Ok(Self { conn_manager })
    }

    fn rate_limit_key(key: &str) -> String {
        format!("rate_limit:{key}")
    }

    #[allow(clippy::cast_possible_truncation)]
    fn current_timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64
    }
}

impl RateLimiter for RedisRateLimiter {
    async fn check_and_record(&self, key: &str, max_attempts: u32, window: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let rate_key = Self::rate_limit_key(key);
        let now_ms = Self::current_timestamp_ms();
        #[allow(clippy::cast_possible_truncation)]
        let window_ms = window.as_millis() as u64;
        let window_start = now_ms.saturating_sub(window_ms);

        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .zrembyscore(&rate_key, 0, window_start as isize)
            .ignore()
            .zcard(&rate_key)
            .zadd(&rate_key, now_ms, now_ms)
            .ignore()
            .expire(&rate_key, 3600)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, key = %key, "rate limit pipeline failed (safe default: deny)");
                KvError::StoreUnavailable(format!("rate limit check: {e}"))
            })?;

        if count >= u64::from(max_attempts) {
            tracing::warn!(
                rate_limit_exceeded = true,
                key = %key,
                attempts = count + 1,
                max_attempts = max_attempts,
                window_ms = window_ms,
                "rate limit exceeded"
            );
            return Err(KvError::TooManyAttempts { retry_after: Duration::from_millis(window_ms) });
        }

        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let rate_key = Self::rate_limit_key(key);

        let _: () = conn
            .del(&rate_key)
            .await
            .map_err(|e| KvError::StoreUnavailable(format!("rate limit reset: {e}")))?;

        Ok(())
    }

    async fn get_attempts(&self, key: &str) -> Result<u32> {
        let mut conn = self.conn_manager.clone();
        let rate_key = Self::rate_limit_key(key);

        let count: u64 = conn
            .zcard(&rate_key)
            .await
            .map_err(|e| KvError::StoreUnavailable(format!("rate limit count: {e}")))?;

        #[allow(clippy::cast_possible_truncation)]
        Ok(count as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn blocks_once_the_window_limit_is_reached() {
        let limiter = RedisRateLimiter::new("redis://127.0.0.1:6379").await.unwrap();
        let key = format!("test:block:{}", uuid::Uuid::new_v4());

        for i in 1..=5 {
            let result = limiter.check_and_record(&key, 5, Duration::from_secs(60)).await;
            assert!(result.is_ok(), "attempt {i} should succeed");
        }

        let result = limiter.check_and_record(&key, 5, Duration::from_secs(60)).await;
        assert!(matches!(result, Err(KvError::TooManyAttempts { .. })));

        limiter.reset(&key).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn reset_clears_the_window() {
        let limiter = RedisRateLimiter::new("redis://127.0.0.1:6379").await.unwrap();
        let key = format!("test:reset:{}", uuid::Uuid::new_v4());

        for _ in 0..5 {
            limiter.check_and_record(&key, 5, Duration::from_secs(60)).await.unwrap();
        }
        assert!(limiter.check_and_record(&key, 5, Duration::from_secs(60)).await.is_err());

        limiter.reset(&key).await.unwrap();
        assert!(limiter.check_and_record(&key, 5, Duration::from_secs(60)).await.is_ok());

        limiter.reset(&key).await.unwrap();
    }
}
