//! Bounded exponential backoff for handler re-delivery.
//!
//! The consumer loop does not retry forever: each delivery gets at most
//! [`RetryPolicy::max_attempts`] tries before the record is routed to the
//! dead-letter sink. Delay between attempts grows exponentially, capped at
//! `max_delay`.

use std::env;
use std::time::Duration;

/// Retry schedule governing handler re-delivery.
///
/// # Default values
///
/// - `max_attempts`: 5 (the initial try plus 4 retries)
/// - `initial_delay`: 2 seconds
/// - `max_delay`: 60 seconds
/// - `multiplier`: 2.0
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first. A delivery whose
    /// `attempt` reaches this value without succeeding is dead-lettered.
    pub max_attempts: u32,
    /// Delay before the first retry (i.e. before attempt 2).
    pub initial_delay: Duration,
    /// Delay cap; backoff never exceeds this regardless of attempt number.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Build a policy from `RETRY_MAX_RETRIES` / `RETRY_INITIAL_DELAY_MS` /
    /// `RETRY_MAX_DELAY_MS` / `RETRY_BACKOFF_MULTIPLIER`, falling back to the
    /// default for any variable that is unset or fails to parse.
    #[must_use]
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_attempts: env_parse("RETRY_MAX_RETRIES").unwrap_or(default.max_attempts),
            initial_delay: env_parse("RETRY_INITIAL_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.initial_delay),
            max_delay: env_parse("RETRY_MAX_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.max_delay),
            multiplier: env_parse("RETRY_BACKOFF_MULTIPLIER").unwrap_or(default.multiplier),
        }
    }

    /// Delay to wait before retrying the given failed attempt number
    /// (1-indexed: the delay returned after attempt 1 fails is the wait
    /// before attempt 2 starts).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent as i32);
        let delay = Duration::from_millis(delay_ms as u64);
        if delay > self.max_delay {
            self.max_delay
        } else {
            delay
        }
    }

    /// Whether another attempt is allowed after `attempt` has failed.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(16));
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        };
        // 2 * 2^5 = 64s, capped to 60s
        assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(60));
    }

    #[test]
    fn should_retry_stops_at_max_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }
}
