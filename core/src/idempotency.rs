//! The idempotency ledger contract.
//!
//! The ledger is the single authoritative "already done" signal for the
//! worker runtime's at-most-once effect guarantee. A row exists for
//! `(event_id, consumer_name)` if and only if that consumer has already
//! completed the side effects for that event at least once.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// Unique key a ledger row is addressed by.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    /// The event being processed.
    pub event_id: Uuid,
    /// The consumer processing it, e.g. `"allocation-engine"`.
    pub consumer_name: String,
}

impl LedgerKey {
    /// Build a key.
    #[must_use]
    pub fn new(event_id: Uuid, consumer_name: impl Into<String>) -> Self {
        Self {
            event_id,
            consumer_name: consumer_name.into(),
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.event_id, self.consumer_name)
    }
}

/// Errors from ledger operations.
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    /// The backing store is unavailable; retryable by the caller.
    #[error("ledger store unavailable: {0}")]
    StoreUnavailable(String),

    /// Any other storage failure.
    #[error("ledger error: {0}")]
    Other(String),
}

/// Durable record of `(event_id, consumer_name)` pairs whose side effects
/// have committed, used to suppress duplicate delivery.
///
/// # Dyn compatibility
///
/// As with [`crate::event_bus::EventBus`], methods return boxed futures so
/// the ledger can be held as `Arc<dyn IdempotencyLedger>` inside consumer
/// tasks spawned per partition.
pub trait IdempotencyLedger: Send + Sync {
    /// Look up whether `key` has already been recorded.
    ///
    /// This is the sole authoritative "already processed" check — callers
    /// must not substitute a side-effect-side existence check for it, since
    /// the two can diverge (see the allocation engine's recovery path for
    /// the one place that deliberately tolerates the divergence).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] on a transient connection
    /// failure; the worker runtime treats this as retryable.
    fn contains(
        &self,
        key: &LedgerKey,
    ) -> Pin<Box<dyn Future<Output = Result<bool, LedgerError>> + Send + '_>>;

    /// Record that `key`'s side effects have committed.
    ///
    /// Must be called only after the side effects themselves are durable.
    /// Implementations over a relational store with strong consistency may
    /// run this in the same transaction as the side effect; implementations
    /// split across stores run it last and accept the recoverable
    /// inconsistency window the spec calls out.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] on a transient connection
    /// failure. A unique-constraint violation (concurrent writer already
    /// recorded the same key) is not an error — implementations must treat
    /// it as success.
    fn record(
        &self,
        key: &LedgerKey,
        event_type: &str,
        correlation_id: Uuid,
        payload_digest: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), LedgerError>> + Send + '_>>;
}
