//! # Platform Worker Runtime
//!
//! The idempotent consumer loop that sits between the event bus and a
//! consumer's business logic: RECEIVED → LEDGER_CHECK → HANDLER →
//! LEDGER_WRITE/BACKOFF/DLQ → COMMIT_OFFSET.
//!
//! Consumers implement [`EventHandler`]; [`consumer::run`] drives the state
//! machine against any [`platform_core::EventBus`] and
//! [`platform_core::IdempotencyLedger`] implementation, retrying transient
//! failures with [`RetryPolicy`]'s bounded exponential backoff and routing
//! exhausted or fatal failures to a [`platform_core::DeadLetterSink`].
//!
//! ## Example
//!
//! ```ignore
//! use platform_worker_runtime::{consumer, retry::RetryPolicy};
//! use std::sync::Arc;
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! consumer::run(
//!     event_bus,
//!     ledger,
//!     dead_letter_sink,
//!     Arc::new(my_handler),
//!     RetryPolicy::from_env(),
//!     shutdown_rx,
//! ).await?;
//! ```

pub mod consumer;
pub mod handler;
pub mod metrics;
pub mod retry;

pub use consumer::run;
pub use handler::{EventHandler, HandlerError};
pub use retry::RetryPolicy;
