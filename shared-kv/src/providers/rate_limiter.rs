//! Rate limiter trait, shared by C5's role-aware request limiter and any
//! other caller needing a sliding-window budget over a key.

use crate::error::Result;
use std::time::Duration;

/// Sliding-window rate limiter over an arbitrary string key.
///
/// C5 keys by `(userId, role)` or `ip` for anonymous requests; other
/// callers are free to key however suits them.
pub trait RateLimiter: Send + Sync {
    /// Check and record one attempt atomically.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::KvError::TooManyAttempts`] once `key` has
    /// recorded `max_attempts` or more within `window`.
    fn check_and_record(
        &self,
        key: &str,
        max_attempts: u32,
        window: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Reset the limiter for `key`, e.g. after a successful auth.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store is unreachable.
    fn reset(&self, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Current attempt count for `key` in its live window.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store is unreachable.
    fn get_attempts(&self, key: &str) -> impl std::future::Future<Output = Result<u32>> + Send;
}
