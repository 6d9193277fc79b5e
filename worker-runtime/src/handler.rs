//! The [`EventHandler`] contract consumer loops dispatch to.

use platform_core::EnrichedEvent;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Outcome of a handler invocation, distinguishing retryable failures from
/// fatal ones so the dispatch loop — not the handler — owns the
/// retry/dead-letter decision.
#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    /// A downstream dependency (store, HTTP upstream, broker) was
    /// temporarily unavailable. The loop retries with backoff.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The record itself is unprocessable — bad envelope, unknown event
    /// type, a payload schema violation the handler rejects outright. The
    /// loop routes it straight to the dead-letter sink without retrying.
    #[error("fatal failure: {0}")]
    Fatal(String),
}

/// One named consumer's business logic for a bounded set of topics.
///
/// # Dyn compatibility
///
/// As with [`platform_core::EventBus`], `handle` returns a boxed future so
/// the handler can be held as `Arc<dyn EventHandler>` and invoked from a
/// freshly spawned task per delivery (see [`crate::consumer::run`]).
pub trait EventHandler: Send + Sync {
    /// Name this consumer is registered under in the idempotency ledger and
    /// in its Kafka consumer group, e.g. `"allocation-engine"`.
    fn consumer_name(&self) -> &str;

    /// Topics this handler subscribes to.
    fn topics(&self) -> &[&str];

    /// Process one delivered event.
    ///
    /// Called only after the idempotency ledger has confirmed this
    /// `(event_id, consumer_name)` pair has not already been processed.
    /// Must not itself consult the ledger or commit the offset — the
    /// consumer loop owns both.
    ///
    /// # Errors
    ///
    /// See [`HandlerError`] for how the two variants are treated.
    fn handle(
        &self,
        event: &EnrichedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>>;
}
