//! In-memory [`DeadLetterSink`] fixture.
//!
//! Grounded on `worker-runtime`'s own `RecordingSink` test double
//! (`worker-runtime/src/consumer.rs`'s test module); generalized with a
//! `records()` accessor so callers outside that crate can assert on what
//! was dead-lettered.

use platform_core::{DeadLetterRecord, DeadLetterSink, DeadLetterSinkError};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// An in-memory [`DeadLetterSink`] that records every write for later
/// inspection.
#[derive(Default)]
pub struct InMemoryDeadLetterSink {
    records: Mutex<Vec<DeadLetterRecord>>,
}

impl InMemoryDeadLetterSink {
    /// Build an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record written so far, in write order.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl DeadLetterSink for InMemoryDeadLetterSink {
    fn record(
        &self,
        record: DeadLetterRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeadLetterSinkError>> + Send + '_>> {
        self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(record);
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use platform_core::Envelope;
    use uuid::Uuid;

    #[tokio::test]
    async fn record_is_retained_for_inspection() {
        let sink = InMemoryDeadLetterSink::new();
        let envelope = Envelope::new_root(Uuid::new_v4(), "allocation-engine", "1.0.0");
        sink.record(DeadLetterRecord {
            id: Uuid::new_v4(),
            consumer_name: "allocation-engine".to_string(),
            source_topic: "purchases".to_string(),
            source_partition: Some(0),
            source_offset: Some(42),
            envelope,
            event_type: "PURCHASE_CREATED".to_string(),
            payload: b"{}".to_vec(),
            error_reason: "handler panicked".to_string(),
            attempt_count: 3,
            failed_at: Utc::now(),
        })
        .await
        .expect("record");

        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.records()[0].consumer_name, "allocation-engine");
    }
}
