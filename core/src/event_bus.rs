//! Event bus abstraction over a partitioned durable log.
//!
//! [`EventBus`] hides the transport (Kafka/Redpanda, NATS JetStream, Pulsar —
//! whatever the deployment picks) behind `publish`/`subscribe`. Producers
//! publish [`EnrichedEvent`]s keyed by partition so causally related events
//! land on the same partition; subscribers pull an [`EventStream`] scoped to
//! a consumer group.
//!
//! # Dyn compatibility
//!
//! The trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async
//! fn` so it can be used as `Arc<dyn EventBus>` — required by the worker
//! runtime, which holds the bus behind a shared handle across consumer tasks.

use crate::event::EnrichedEvent;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors surfaced by an [`EventBus`] implementation.
///
/// Callers distinguish retryable transport failures (`ConnectionFailed`,
/// `TransportError`) from fatal ones (`InvalidTopic`, malformed envelope
/// caught at `DeserializationFailed`) — the worker runtime routes the latter
/// straight to the dead-letter queue rather than retrying.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Could not establish or re-establish the underlying transport connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A publish call failed.
    #[error("publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// Topic that was being published to.
        topic: String,
        /// Underlying failure reason.
        reason: String,
    },

    /// A subscribe call failed to establish its consumer group.
    #[error("subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// Topics the subscription targeted.
        topics: Vec<String>,
        /// Underlying failure reason.
        reason: String,
    },

    /// A delivered record could not be decoded into an `EnrichedEvent`.
    #[error("deserialization failed: {0}")]
    DeserializationFailed(String),

    /// The topic name is not a valid target for this bus.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// The consumer group could not be formed or rebalanced.
    #[error("consumer group error: {0}")]
    ConsumerGroupError(String),

    /// A transient network/broker failure. Retryable by the caller.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Anything else.
    #[error("event bus error: {0}")]
    Other(String),
}

/// A committable acknowledgment for one delivered record.
///
/// The offset is not advanced until [`Ack::commit`] is called. The worker
/// runtime calls it only after the handler has succeeded and the
/// idempotency ledger write has committed, or after a dead-letter publish
/// has been acknowledged — never before, per the at-least-once contract.
pub struct Ack(Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send>> + Send>);

impl Ack {
    /// Wrap a commit closure.
    pub fn new<F, Fut>(commit: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), EventBusError>> + Send + 'static,
    {
        Self(Box::new(move || Box::pin(commit())))
    }

    /// Advance the offset for the record this ack belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::TransportError`] if the commit call fails;
    /// the caller has already completed its work, so a commit failure here
    /// only risks redelivery, not a lost side effect.
    pub async fn commit(self) -> Result<(), EventBusError> {
        (self.0)().await
    }
}

/// One delivered record, paired with the means to acknowledge it.
pub struct Delivery {
    /// The decoded event.
    pub event: EnrichedEvent,
    /// The commit handle for this record's offset.
    pub ack: Ack,
}

/// Why a single delivery could not be turned into a [`Delivery`].
///
/// Carries the `Ack` in both variants: a malformed record is fatal
/// (non-retryable), but the consumer must still be able to route it to the
/// dead-letter queue and commit past it rather than stall the partition.
pub enum DeliveryError {
    /// The record's bytes did not decode into an `EnrichedEvent`.
    Decode {
        /// Raw bytes as received, preserved for the dead-letter record.
        raw: Vec<u8>,
        /// Decode failure reason.
        reason: String,
        /// Commit handle for this record.
        ack: Ack,
    },
    /// A transport-level failure unrelated to any specific record.
    Bus(EventBusError),
}

/// Stream of records delivered to a subscription.
///
/// Each item is a `Result`: decode failures surface as
/// [`DeliveryError::Decode`] rather than terminating the stream, since a
/// single malformed record must not take down the whole consumer task.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Delivery, DeliveryError>> + Send>>;

/// Publish/subscribe access to the partitioned event log.
///
/// Implementations deliver each record **at least once**; duplicate
/// delivery is expected, not exceptional, and is handled by the idempotency
/// ledger one layer up (see the worker runtime). Per-key ordering is the
/// only ordering guarantee: events sharing a partition key are delivered to
/// a given consumer group in publication order, but there is no ordering
/// across keys or across consumer groups.
pub trait EventBus: Send + Sync {
    /// Publish an event to `topic`.
    ///
    /// The implementation derives the partition key from
    /// `event.payload.partition_key()`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] (retryable by the caller) or
    /// [`EventBusError::InvalidTopic`]/[`EventBusError::Other`] for fatal
    /// envelope problems.
    fn publish(
        &self,
        topic: &str,
        event: &EnrichedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe `group` to `topics`, returning a pull-based stream of
    /// [`Delivery`] records. Each record's `Ack` must be committed by the
    /// caller; the offset does not advance on its own.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the consumer group
    /// cannot be formed.
    fn subscribe(
        &self,
        group: &str,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
