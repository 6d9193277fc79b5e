//! Postgres-backed [`IdempotencyLedger`].
//!
//! Backs the `idempotency_ledger(event_id, consumer_name, correlation_id,
//! event_type, payload_digest, processed_at)` table, keyed by the
//! `(event_id, consumer_name)` primary key the ledger contract is defined
//! against.

use chrono::Utc;
use platform_core::{IdempotencyLedger, LedgerError, LedgerKey};
use sqlx::PgPool;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// Postgres-backed idempotency ledger.
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Build a ledger over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl IdempotencyLedger for PostgresLedger {
    fn contains(
        &self,
        key: &LedgerKey,
    ) -> Pin<Box<dyn Future<Output = Result<bool, LedgerError>> + Send + '_>> {
        let event_id = key.event_id;
        let consumer_name = key.consumer_name.clone();
        Box::pin(async move {
            let row: Option<(i32,)> = sqlx::query_as(
                r"
                SELECT 1 FROM idempotency_ledger
                WHERE event_id = $1 AND consumer_name = $2
                ",
            )
            .bind(event_id)
            .bind(&consumer_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LedgerError::StoreUnavailable(e.to_string()))?;

            Ok(row.is_some())
        })
    }

    fn record(
        &self,
        key: &LedgerKey,
        event_type: &str,
        correlation_id: Uuid,
        payload_digest: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), LedgerError>> + Send + '_>> {
        let event_id = key.event_id;
        let consumer_name = key.consumer_name.clone();
        let event_type = event_type.to_string();
        let payload_digest = payload_digest.to_string();
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO idempotency_ledger (
                    event_id, consumer_name, correlation_id, event_type,
                    payload_digest, processed_at
                ) VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (event_id, consumer_name) DO NOTHING
                ",
            )
            .bind(event_id)
            .bind(&consumer_name)
            .bind(correlation_id)
            .bind(&event_type)
            .bind(&payload_digest)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::StoreUnavailable(e.to_string()))?;

            metrics::counter!("ledger.records_written", "consumer_name" => consumer_name)
                .increment(1);

            Ok(())
        })
    }
}
