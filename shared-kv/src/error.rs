//! Error types for the shared-KV layer: rate limiting, the realtime
//! subscription registry, and JWT pre-validation.

use thiserror::Error;

/// Result type alias used throughout this crate.
pub type Result<T> = std::result::Result<T, KvError>;

/// Error taxonomy for the shared-KV layer.
#[derive(Debug, Error, Clone)]
pub enum KvError {
    /// Rate limit exceeded; callers surface this as 429 with the given
    /// retry-after hint.
    #[error("too many attempts, retry after {retry_after:?}")]
    TooManyAttempts {
        /// Duration to wait before retrying.
        retry_after: std::time::Duration,
    },

    /// The requested entry was not found (e.g. no subscription registry
    /// entry for a journey room, or an expired/absent connection record).
    #[error("not found")]
    NotFound,

    /// The JWT failed signature, expiry, or claim validation.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The backing Redis connection is unavailable; retryable.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Any other failure.
    #[error("shared-kv error: {0}")]
    Other(String),
}
