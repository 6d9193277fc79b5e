//! Kafka-compatible event bus implementation over `rdkafka`.
//!
//! Works against Redpanda, Apache Kafka, or any broker that speaks the Kafka
//! wire protocol — the transport choice the platform core deliberately
//! leaves open. Delivery is **at-least-once**: consumer offsets are
//! committed only when the caller explicitly calls [`Ack::commit`] on the
//! handle attached to each [`Delivery`], never automatically.
//!
//! # Partitioning
//!
//! The producer uses `event.payload.partition_key()` as the Kafka message
//! key, so causally dependent events (e.g. all events for one student+course
//! pair) land on the same partition and are observed in publish order by any
//! one consumer group.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use platform_core::event::EnrichedEvent;
use platform_core::event_bus::{Ack, Delivery, DeliveryError, EventBus, EventBusError, EventStream};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Kafka-backed [`EventBus`].
pub struct KafkaEventBus {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    client_id: String,
    auto_offset_reset: String,
}

impl KafkaEventBus {
    /// Connect with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be
    /// created (invalid broker list, unreachable brokers at connect time).
    pub fn new(brokers: &str, client_id: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).client_id(client_id).build()
    }

    /// Start a fluent builder.
    #[must_use]
    pub fn builder() -> KafkaEventBusBuilder {
        KafkaEventBusBuilder::default()
    }
}

/// Builder for [`KafkaEventBus`].
#[derive(Default)]
pub struct KafkaEventBusBuilder {
    brokers: Option<String>,
    client_id: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    auto_offset_reset: Option<String>,
}

impl KafkaEventBusBuilder {
    /// Comma-separated broker addresses, from `KAFKA_BROKERS`.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Client id reported to the broker, from `KAFKA_CLIENT_ID`.
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Producer acknowledgment mode: `"0"`, `"1"`, or `"all"`. Default `"all"`.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Compression codec. Default `"lz4"`.
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Producer send timeout. Default 5s.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Offset reset policy for new consumer groups. Default `"earliest"` —
    /// new workers must not silently skip events published before they
    /// first came up.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the bus.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are unset or
    /// the producer fails to initialize.
    pub fn build(self) -> Result<KafkaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("brokers not configured".to_string()))?;
        let client_id = self.client_id.unwrap_or_else(|| "edge-platform".to_string());

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("client.id", &client_id)
            .set("message.timeout.ms", "5000")
            .set("acks", self.producer_acks.as_deref().unwrap_or("all"))
            .set("compression.type", self.compression.as_deref().unwrap_or("lz4"));

        let producer: FutureProducer = producer_config
            .create()
            .map_err(|e| EventBusError::ConnectionFailed(format!("failed to create producer: {e}")))?;

        Ok(KafkaEventBus {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            client_id,
            auto_offset_reset: self.auto_offset_reset.unwrap_or_else(|| "earliest".to_string()),
        })
    }
}

impl EventBus for KafkaEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &EnrichedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let payload = event.to_bytes().map_err(|e| EventBusError::PublishFailed {
                topic: topic.clone(),
                reason: e.to_string(),
            })?;
            let key = event.payload.partition_key();

            let record = FutureRecord::to(&topic).payload(&payload).key(&key);

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition,
                        offset,
                        event_id = %event.metadata.event_id,
                        event_type = event.event_type(),
                        "published event"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(topic = %topic, error = %kafka_error, "publish failed");
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        group: &str,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let brokers = self.brokers.clone();
        let client_id = self.client_id.clone();
        let group = group.to_string();
        let auto_offset_reset = self.auto_offset_reset.clone();

        Box::pin(async move {
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("client.id", &client_id)
                .set("group.id", &group)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer.subscribe(&topic_refs).map_err(|e| EventBusError::SubscriptionFailed {
                topics: topics.clone(),
                reason: format!("failed to subscribe: {e}"),
            })?;

            tracing::info!(topics = ?topics, group = %group, "subscribed");

            let consumer = std::sync::Arc::new(consumer);
            let (tx, rx) = tokio::sync::mpsc::channel(1000);

            let consumer_task = consumer.clone();
            tokio::spawn(async move {
                use futures::StreamExt;
                use rdkafka::consumer::CommitMode;

                let mut stream = consumer_task.stream();
                while let Some(msg_result) = stream.next().await {
                    let item = match msg_result {
                        Ok(message) => {
                            let raw = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
                            let consumer_for_ack = consumer_task.clone();
                            let topic_partition = (message.topic().to_string(), message.partition());
                            let offset = message.offset();
                            // rdkafka's OwnedMessage is needed to commit after
                            // the borrowed `message` goes out of scope.
                            let owned = message.detach();
                            let ack = Ack::new(move || {
                                let consumer = consumer_for_ack;
                                async move {
                                    consumer.commit_message(&owned, CommitMode::Async).map_err(|e| {
                                        EventBusError::TransportError(format!(
                                            "commit failed for {}:{} offset {offset}: {e}",
                                            topic_partition.0, topic_partition.1
                                        ))
                                    })
                                }
                            });

                            match EnrichedEvent::from_bytes(&raw) {
                                Ok(event) => Ok(Delivery { event, ack }),
                                Err(e) => Err(DeliveryError::Decode {
                                    raw,
                                    reason: e.to_string(),
                                    ack,
                                }),
                            }
                        }
                        Err(e) => Err(DeliveryError::Bus(EventBusError::TransportError(e.to_string()))),
                    };

                    if tx.send(item).await.is_err() {
                        tracing::debug!("receiver dropped, exiting consumer task");
                        break;
                    }
                }
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kafka_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<KafkaEventBus>();
        assert_sync::<KafkaEventBus>();
    }

    #[test]
    fn builder_requires_brokers() {
        let err = KafkaEventBus::builder().build().unwrap_err();
        assert!(matches!(err, EventBusError::ConnectionFailed(_)));
    }
}
