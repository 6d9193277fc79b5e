//! Dead-letter record shape written when a handler exhausts its retry budget,
//! and the [`DeadLetterSink`] contract for durably storing them.

use crate::event::Envelope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// A record routed to the dead-letter topic/table after attempt exhaustion
/// or a non-retryable failure.
///
/// Carries everything needed to triage and, if desired, manually replay the
/// original record: the source topic/partition/offset, the failure reason,
/// how many attempts were made, and the original envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    /// Unique id of this dead-letter entry (not the original event id).
    pub id: Uuid,
    /// Name of the consumer that gave up on the record.
    pub consumer_name: String,
    /// Source topic the record was read from.
    pub source_topic: String,
    /// Source partition, when the transport exposes one.
    pub source_partition: Option<i32>,
    /// Source offset, when the transport exposes one.
    pub source_offset: Option<i64>,
    /// The original envelope, preserved for correlation.
    pub envelope: Envelope,
    /// The original record's `type` discriminator.
    pub event_type: String,
    /// The original wire payload, for replay.
    pub payload: Vec<u8>,
    /// Human-readable failure reason.
    pub error_reason: String,
    /// Number of attempts made before giving up.
    pub attempt_count: u32,
    /// When this entry was first recorded.
    pub failed_at: DateTime<Utc>,
}

/// Errors from dead-letter sink operations.
#[derive(Error, Debug, Clone)]
pub enum DeadLetterSinkError {
    /// The backing store is unavailable; retryable by the caller.
    #[error("dead-letter store unavailable: {0}")]
    StoreUnavailable(String),

    /// Any other storage failure.
    #[error("dead-letter sink error: {0}")]
    Other(String),
}

/// Durable storage for [`DeadLetterRecord`]s.
///
/// The worker runtime writes a record here only after attempt exhaustion or a
/// non-retryable decode failure, and commits the source offset only after
/// this write has been acknowledged — losing a dead letter would silently
/// drop the only failure trail for that event.
pub trait DeadLetterSink: Send + Sync {
    /// Persist `record`.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterSinkError::StoreUnavailable`] on a transient
    /// connection failure; the worker runtime retries the write (not the
    /// whole handler) before giving up and holding the offset.
    fn record(
        &self,
        record: DeadLetterRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeadLetterSinkError>> + Send + '_>>;
}
