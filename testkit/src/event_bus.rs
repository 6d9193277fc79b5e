//! In-memory [`EventBus`] fixture: per-topic queues drained into a finite
//! [`EventStream`] on `subscribe`.
//!
//! Grounded on `worker-runtime`'s own `FakeBus` test double (seen in
//! `worker-runtime/src/consumer.rs`'s test module), generalized into a
//! reusable fixture rather than redefined ad hoc in every crate that needs
//! one.

use platform_core::{Ack, Delivery, EnrichedEvent, EventBus, EventBusError, EventStream};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// An in-memory [`EventBus`] backed by per-topic queues.
///
/// `subscribe` drains every event currently queued under `topics` into a
/// finite stream; it does not wait for later publishes. Callers that need to
/// observe a publish-then-subscribe sequence must publish everything first.
#[derive(Default)]
pub struct InMemoryEventBus {
    topics: Mutex<HashMap<String, VecDeque<EnrichedEvent>>>,
    committed: Arc<AtomicUsize>,
}

impl InMemoryEventBus {
    /// Build an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of acks committed so far, across every subscription drained.
    #[must_use]
    pub fn committed_count(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    /// Number of events still queued under `topic`, awaiting a subscribe.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn queued(&self, topic: &str) -> usize {
        self.topics.lock().unwrap().get(topic).map_or(0, VecDeque::len)
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &EnrichedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        Box::pin(async move {
            self.topics
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .entry(topic)
                .or_default()
                .push_back(event);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        _group: &str,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let mut drained = Vec::new();
        {
            let mut guard = self.topics.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            for topic in topics {
                if let Some(queue) = guard.get_mut(*topic) {
                    drained.extend(queue.drain(..));
                }
            }
        }
        let committed = Arc::clone(&self.committed);
        Box::pin(async move {
            let deliveries: Vec<_> = drained
                .into_iter()
                .map(move |event| {
                    let committed = Arc::clone(&committed);
                    Ok(Delivery {
                        event,
                        ack: Ack::new(move || {
                            committed.fetch_add(1, Ordering::SeqCst);
                            async { Ok(()) }
                        }),
                    })
                })
                .collect();
            let stream: EventStream = Box::pin(futures::stream::iter(deliveries));
            Ok(stream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use platform_core::{DomainEvent, Envelope};
    use uuid::Uuid;

    fn enriched() -> EnrichedEvent {
        EnrichedEvent::new(
            DomainEvent::SessionsGenerated { allocation_id: Uuid::new_v4(), session_count: 3 },
            Envelope::new_root(Uuid::new_v4(), "test", "1.0.0"),
        )
    }

    #[tokio::test]
    async fn subscribe_drains_only_the_published_topic() {
        let bus = InMemoryEventBus::new();
        bus.publish("allocations", &enriched()).await.expect("publish");
        bus.publish("other-topic", &enriched()).await.expect("publish");

        let mut stream = bus.subscribe("test-group", &["allocations"]).await.expect("subscribe");
        let delivery = stream.next().await.expect("one delivery").expect("ok");
        delivery.ack.commit().await.expect("commit");

        assert!(stream.next().await.is_none());
        assert_eq!(bus.committed_count(), 1);
        assert_eq!(bus.queued("other-topic"), 1);
    }
}
