//! Postgres persistence for the platform backbone.
//!
//! Owns the three durable tables the core persists directly (§6 of the
//! platform spec): the idempotency ledger, the dead-letter sink, and the
//! allocation/session/journey rows the allocation engine writes in reaction
//! to `PURCHASE_CREATED`. Everything here implements a trait fixed by
//! `platform-core`; nothing in those crates depends on `sqlx` directly.
//!
//! # Example
//!
//! ```ignore
//! use platform_store_postgres::{PostgresLedger, PostgresDeadLetterSink};
//! use sqlx::PgPool;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = PgPool::connect("postgres://localhost/platform").await?;
//!     let ledger = PostgresLedger::new(pool.clone());
//!     let dlq = PostgresDeadLetterSink::new(pool);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod allocation;
pub mod dead_letter;
pub mod ledger;

pub use allocation::PostgresAllocationRepository;
pub use dead_letter::{DeadLetterRow, PostgresDeadLetterSink};
pub use ledger::PostgresLedger;
