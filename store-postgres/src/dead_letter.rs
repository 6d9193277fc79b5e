//! Postgres-backed [`DeadLetterSink`].
//!
//! Adapted from the teacher's `DeadLetterQueue`, retargeted at the new
//! `dead_letters` table shape (one row per [`DeadLetterRecord`], not the
//! older `failed_events` shape keyed by stream id) and its status/resolution
//! workflow dropped — this expansion's dead-letter table is a write-once
//! audit trail for the worker runtime, not a reprocessing queue with its own
//! lifecycle; triage and replay are operational concerns outside C2's scope.

use platform_core::{DeadLetterRecord, DeadLetterSink, DeadLetterSinkError};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// Postgres-backed dead-letter sink.
pub struct PostgresDeadLetterSink {
    pool: PgPool,
}

impl PostgresDeadLetterSink {
    /// Build a sink over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List entries for a consumer, most recent first.
    ///
    /// Operational/triage helper; not part of the [`DeadLetterSink`]
    /// contract the worker runtime depends on.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterSinkError::Other`] if the query fails.
    pub async fn list_for_consumer(
        &self,
        consumer_name: &str,
        limit: i64,
    ) -> Result<Vec<DeadLetterRow>, DeadLetterSinkError> {
        let rows = sqlx::query(
            r"
            SELECT id, consumer_name, source_topic, source_partition, source_offset,
                   envelope, event_type, payload, error_reason, attempt_count, failed_at
            FROM dead_letters
            WHERE consumer_name = $1
            ORDER BY failed_at DESC
            LIMIT $2
            ",
        )
        .bind(consumer_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DeadLetterSinkError::Other(e.to_string()))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<DeadLetterRow, DeadLetterSinkError> {
        let envelope_json: serde_json::Value = row.get("envelope");
        let envelope = serde_json::from_value(envelope_json)
            .map_err(|e| DeadLetterSinkError::Other(e.to_string()))?;

        Ok(DeadLetterRow {
            id: row.get("id"),
            record: DeadLetterRecord {
                id: row.get("id"),
                consumer_name: row.get("consumer_name"),
                source_topic: row.get("source_topic"),
                source_partition: row.get("source_partition"),
                source_offset: row.get("source_offset"),
                envelope,
                event_type: row.get("event_type"),
                payload: row.get("payload"),
                error_reason: row.get("error_reason"),
                attempt_count: u32::try_from(row.get::<i32, _>("attempt_count")).unwrap_or(0),
                failed_at: row.get("failed_at"),
            },
        })
    }
}

/// A dead-letter row as read back from storage (record plus its storage id).
#[derive(Debug, Clone)]
pub struct DeadLetterRow {
    /// Storage-assigned id, same as [`DeadLetterRecord::id`].
    pub id: Uuid,
    /// The record itself.
    pub record: DeadLetterRecord,
}

impl DeadLetterSink for PostgresDeadLetterSink {
    fn record(
        &self,
        record: DeadLetterRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeadLetterSinkError>> + Send + '_>> {
        Box::pin(async move {
            let envelope_json = serde_json::to_value(&record.envelope)
                .map_err(|e| DeadLetterSinkError::Other(e.to_string()))?;

            #[allow(clippy::cast_possible_wrap)]
            let attempt_count = record.attempt_count as i32;

            sqlx::query(
                r"
                INSERT INTO dead_letters (
                    id, consumer_name, source_topic, source_partition, source_offset,
                    envelope, event_type, payload, error_reason, attempt_count, failed_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (id) DO NOTHING
                ",
            )
            .bind(record.id)
            .bind(&record.consumer_name)
            .bind(&record.source_topic)
            .bind(record.source_partition)
            .bind(record.source_offset)
            .bind(&envelope_json)
            .bind(&record.event_type)
            .bind(&record.payload)
            .bind(&record.error_reason)
            .bind(attempt_count)
            .bind(record.failed_at)
            .execute(&self.pool)
            .await
            .map_err(|e| DeadLetterSinkError::StoreUnavailable(e.to_string()))?;

            tracing::warn!(
                dead_letter_id = %record.id,
                consumer_name = %record.consumer_name,
                event_type = %record.event_type,
                error = %record.error_reason,
                attempt_count = record.attempt_count,
                "record routed to dead-letter sink"
            );

            metrics::counter!(
                "dead_letter.records_written",
                "consumer_name" => record.consumer_name.clone()
            )
            .increment(1);

            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use platform_core::Envelope;

    fn sample_record() -> DeadLetterRecord {
        DeadLetterRecord {
            id: Uuid::new_v4(),
            consumer_name: "allocation-engine".to_string(),
            source_topic: "purchase-created".to_string(),
            source_partition: None,
            source_offset: None,
            envelope: Envelope::new_root(Uuid::new_v4(), "purchase-created", "1.0.0"),
            event_type: "purchase-created".to_string(),
            payload: b"{}".to_vec(),
            error_reason: "handler panicked".to_string(),
            attempt_count: 5,
            failed_at: Utc::now(),
        }
    }

    #[test]
    fn sample_record_serializes_envelope_cleanly() {
        let record = sample_record();
        let value = serde_json::to_value(&record.envelope).expect("envelope should serialize");
        assert!(value.is_object());
    }
}
