//! In-memory [`IdempotencyLedger`] fixture.
//!
//! Grounded on `worker-runtime`'s own `InMemoryLedger` test double
//! (`worker-runtime/src/consumer.rs`'s test module).

use platform_core::{IdempotencyLedger, LedgerError, LedgerKey};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use uuid::Uuid;

/// An in-memory [`IdempotencyLedger`] backed by a `HashSet<LedgerKey>`.
#[derive(Default)]
pub struct InMemoryIdempotencyLedger {
    seen: Mutex<HashSet<LedgerKey>>,
}

impl InMemoryIdempotencyLedger {
    /// Build an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys recorded so far.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Whether the ledger has no recorded keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdempotencyLedger for InMemoryIdempotencyLedger {
    fn contains(&self, key: &LedgerKey) -> Pin<Box<dyn Future<Output = Result<bool, LedgerError>> + Send + '_>> {
        let found = self.seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner).contains(key);
        Box::pin(async move { Ok(found) })
    }

    fn record(
        &self,
        key: &LedgerKey,
        _event_type: &str,
        _correlation_id: Uuid,
        _payload_digest: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), LedgerError>> + Send + '_>> {
        self.seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(key.clone());
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_then_contains_reports_true() {
        let ledger = InMemoryIdempotencyLedger::new();
        let key = LedgerKey::new(Uuid::new_v4(), "allocation-engine");

        assert!(!ledger.contains(&key).await.expect("contains"));
        ledger.record(&key, "PURCHASE_CREATED", Uuid::new_v4(), "digest").await.expect("record");
        assert!(ledger.contains(&key).await.expect("contains"));
        assert_eq!(ledger.len(), 1);
    }
}
