//! The idempotent consumer loop: RECEIVED → LEDGER_CHECK → HANDLER →
//! LEDGER_WRITE/BACKOFF/DLQ → COMMIT_OFFSET.
//!
//! One [`run`] call owns one consumer group subscription end to end. Records
//! for a given partition are processed in delivery order — each handler
//! invocation is spawned as its own task and awaited before the next record
//! is taken off the stream, so a panic is isolated to that one record
//! without reordering the partition.

use crate::handler::{EventHandler, HandlerError};
use crate::retry::RetryPolicy;
use futures::StreamExt;
use platform_core::{
    DeadLetterRecord, DeadLetterSink, DeadLetterSinkError, DeliveryError, EnrichedEvent, EventBus,
    EventBusError, IdempotencyLedger, LedgerKey,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Soft deadline for a single handler attempt. Beyond it the attempt is
/// cancelled and counted as a failure, same as any other transient error.
const HANDLER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the consumer loop for `handler` until the event stream ends or
/// `shutdown` fires.
///
/// # Errors
///
/// Returns [`EventBusError`] if the initial subscribe call fails. Per-record
/// failures never propagate out of this function — they are retried,
/// dead-lettered, or logged internally.
pub async fn run(
    event_bus: Arc<dyn EventBus>,
    ledger: Arc<dyn IdempotencyLedger>,
    dead_letter_sink: Arc<dyn DeadLetterSink>,
    handler: Arc<dyn EventHandler>,
    retry_policy: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), EventBusError> {
    let consumer_name = handler.consumer_name().to_string();
    let topics = handler.topics().to_vec();

    tracing::info!(
        consumer_name = %consumer_name,
        topics = ?topics,
        "starting consumer loop"
    );

    let mut stream = event_bus.subscribe(&consumer_name, &topics).await?;

    loop {
        let delivery = tokio::select! {
            biased;
            () = wait_for_shutdown(&mut shutdown) => {
                tracing::info!(consumer_name = %consumer_name, "shutdown signal received, stopping consumer loop");
                return Ok(());
            }
            next = stream.next() => next,
        };

        let Some(delivery) = delivery else {
            tracing::warn!(consumer_name = %consumer_name, "event stream ended");
            return Ok(());
        };

        match delivery {
            Ok(delivery) => {
                process_delivery(
                    &ledger,
                    &dead_letter_sink,
                    &handler,
                    &retry_policy,
                    &topics,
                    delivery.event,
                    delivery.ack,
                )
                .await;
            }
            Err(DeliveryError::Decode { raw, reason, ack }) => {
                tracing::error!(
                    consumer_name = %consumer_name,
                    error = %reason,
                    "record failed to decode, routing straight to dead-letter"
                );
                let record = DeadLetterRecord {
                    id: Uuid::new_v4(),
                    consumer_name: consumer_name.clone(),
                    source_topic: topics.join(","),
                    source_partition: None,
                    source_offset: None,
                    envelope: undecodable_envelope(),
                    event_type: "UNKNOWN".to_string(),
                    payload: raw,
                    error_reason: reason,
                    attempt_count: 1,
                    failed_at: chrono::Utc::now(),
                };
                if let Err(sink_err) = dead_letter_sink.record(record).await {
                    tracing::error!(error = %sink_err, "failed to write dead-letter record for undecodable delivery");
                    continue;
                }
                if let Err(commit_err) = ack.commit().await {
                    tracing::error!(error = %commit_err, "failed to commit offset after dead-lettering undecodable delivery");
                }
            }
            Err(DeliveryError::Bus(bus_err)) => {
                tracing::error!(consumer_name = %consumer_name, error = %bus_err, "transport-level error from event bus, continuing");
            }
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender dropped; treat as shutdown so the loop doesn't spin.
            return;
        }
    }
}

/// A best-effort envelope for a record that could not be decoded at all —
/// there is no real `event_id`/`correlation_id` to recover, so this exists
/// purely to satisfy `DeadLetterRecord`'s shape for triage tooling.
fn undecodable_envelope() -> platform_core::Envelope {
    platform_core::Envelope::new_root(Uuid::nil(), "unknown", "0.0.0")
}

#[allow(clippy::too_many_arguments)]
async fn process_delivery(
    ledger: &Arc<dyn IdempotencyLedger>,
    dead_letter_sink: &Arc<dyn DeadLetterSink>,
    handler: &Arc<dyn EventHandler>,
    retry_policy: &RetryPolicy,
    topics: &[&str],
    event: EnrichedEvent,
    ack: platform_core::Ack,
) {
    let consumer_name = handler.consumer_name().to_string();
    let key = LedgerKey::new(event.metadata.event_id, consumer_name.clone());
    let event_type = event.event_type().to_string();
    let correlation_id = event.metadata.correlation_id;

    match ledger.contains(&key).await {
        Ok(true) => {
            tracing::debug!(
                event_id = %key.event_id,
                consumer_name = %consumer_name,
                "event already processed, skipping handler and committing"
            );
            metrics::counter!("worker.events.deduplicated", "consumer" => consumer_name.clone()).increment(1);
            commit(ack, &consumer_name).await;
            return;
        }
        Ok(false) => {}
        Err(err) => {
            // Ledger unavailable: this is itself a transient failure. We
            // do not commit; the record will be redelivered when the
            // process (or a peer in the same group) comes back up and the
            // ledger check can be retried from scratch.
            tracing::error!(error = %err, event_id = %key.event_id, "idempotency ledger unavailable, leaving offset uncommitted");
            return;
        }
    }

    let mut attempt: u32 = 1;
    loop {
        tracing::debug!(
            event_id = %key.event_id,
            consumer_name = %consumer_name,
            attempt,
            "dispatching to handler"
        );

        let handler_clone = Arc::clone(handler);
        let event_clone = event.clone();
        let joined = tokio::time::timeout(
            HANDLER_ATTEMPT_TIMEOUT,
            tokio::spawn(async move { handler_clone.handle(&event_clone).await }),
        )
        .await;

        let outcome: Result<(), HandlerError> = match joined {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                tracing::error!(
                    event_id = %key.event_id,
                    consumer_name = %consumer_name,
                    attempt,
                    error = %join_err,
                    "handler task panicked"
                );
                Err(HandlerError::Fatal(format!("handler panicked: {join_err}")))
            }
            Err(_elapsed) => {
                tracing::warn!(
                    event_id = %key.event_id,
                    consumer_name = %consumer_name,
                    attempt,
                    "handler exceeded soft deadline, counting as a failed attempt"
                );
                Err(HandlerError::Transient("handler attempt timed out".to_string()))
            }
        };

        match outcome {
            Ok(()) => {
                let digest = payload_digest(&event);
                if let Err(err) = ledger.record(&key, &event_type, correlation_id, &digest).await {
                    tracing::error!(error = %err, event_id = %key.event_id, "failed to write idempotency ledger record, leaving offset uncommitted");
                    return;
                }
                metrics::counter!("worker.events.processed", "consumer" => consumer_name.clone()).increment(1);
                commit(ack, &consumer_name).await;
                return;
            }
            Err(HandlerError::Fatal(reason)) => {
                tracing::error!(event_id = %key.event_id, consumer_name = %consumer_name, reason = %reason, "fatal handler error, routing to dead-letter");
                if dead_letter(dead_letter_sink, &consumer_name, topics, &event, &reason, attempt).await.is_ok() {
                    commit(ack, &consumer_name).await;
                }
                return;
            }
            Err(HandlerError::Transient(reason)) => {
                if retry_policy.should_retry(attempt) {
                    let delay = retry_policy.delay_for_attempt(attempt);
                    metrics::counter!("worker.events.retried", "consumer" => consumer_name.clone()).increment(1);
                    tracing::warn!(
                        event_id = %key.event_id,
                        consumer_name = %consumer_name,
                        attempt,
                        delay_ms = delay.as_millis(),
                        reason = %reason,
                        "transient handler failure, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                tracing::error!(event_id = %key.event_id, consumer_name = %consumer_name, attempt, reason = %reason, "retries exhausted, routing to dead-letter");
                if dead_letter(dead_letter_sink, &consumer_name, topics, &event, &reason, attempt).await.is_ok() {
                    commit(ack, &consumer_name).await;
                }
                return;
            }
        }
    }
}

/// Write a dead-letter record for a handler failure.
///
/// # Errors
///
/// Returns the sink's error unchanged so the caller can leave the offset
/// uncommitted on failure, matching the decode-error path above: the
/// record is redelivered and re-dead-lettered rather than silently lost.
async fn dead_letter(
    sink: &Arc<dyn DeadLetterSink>,
    consumer_name: &str,
    topics: &[&str],
    event: &EnrichedEvent,
    reason: &str,
    attempt_count: u32,
) -> Result<(), DeadLetterSinkError> {
    let payload = match event.to_bytes() {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(error = %err, "failed to re-encode event for dead-letter record");
            Vec::new()
        }
    };
    let record = DeadLetterRecord {
        id: Uuid::new_v4(),
        consumer_name: consumer_name.to_string(),
        source_topic: topics.join(","),
        source_partition: None,
        source_offset: None,
        envelope: event.metadata.clone(),
        event_type: event.event_type().to_string(),
        payload,
        error_reason: reason.to_string(),
        attempt_count,
        failed_at: chrono::Utc::now(),
    };
    metrics::counter!("worker.events.dead_lettered", "consumer" => consumer_name.to_string()).increment(1);
    if let Err(err) = sink.record(record).await {
        tracing::error!(error = %err, "failed to write dead-letter record, leaving offset uncommitted");
        return Err(err);
    }
    Ok(())
}

async fn commit(ack: platform_core::Ack, consumer_name: &str) {
    if let Err(err) = ack.commit().await {
        tracing::error!(error = %err, consumer_name = %consumer_name, "failed to commit offset after processing");
    }
}

fn payload_digest(event: &EnrichedEvent) -> String {
    let bytes = event.to_bytes().unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_core::{Ack, Delivery, DomainEvent, Envelope, EventStream};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeBus {
        deliveries: Mutex<Vec<EnrichedEvent>>,
        committed: Arc<AtomicUsize>,
    }

    impl EventBus for FakeBus {
        fn publish(
            &self,
            _topic: &str,
            _event: &EnrichedEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }

        fn subscribe(
            &self,
            _group: &str,
            _topics: &[&str],
        ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
            let events = std::mem::take(&mut *self.deliveries.lock().unwrap());
            let committed = Arc::clone(&self.committed);
            Box::pin(async move {
                let committed_items: Vec<_> = events
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
                let stream: EventStream = Box::pin(futures::stream::iter(committed_items));
                Ok(stream)
            })
        }
    }

    struct InMemoryLedger {
        seen: Mutex<std::collections::HashSet<LedgerKey>>,
    }

    impl IdempotencyLedger for InMemoryLedger {
        fn contains(
            &self,
            key: &LedgerKey,
        ) -> Pin<Box<dyn Future<Output = Result<bool, platform_core::LedgerError>> + Send + '_>>
        {
            let found = self.seen.lock().unwrap().contains(key);
            Box::pin(async move { Ok(found) })
        }

        fn record(
            &self,
            key: &LedgerKey,
            _event_type: &str,
            _correlation_id: Uuid,
            _payload_digest: &str,
        ) -> Pin<Box<dyn Future<Output = Result<(), platform_core::LedgerError>> + Send + '_>>
        {
            self.seen.lock().unwrap().insert(key.clone());
            Box::pin(async { Ok(()) })
        }
    }

    struct RecordingSink {
        records: Mutex<Vec<DeadLetterRecord>>,
    }

    impl DeadLetterSink for RecordingSink {
        fn record(
            &self,
            record: DeadLetterRecord,
        ) -> Pin<Box<dyn Future<Output = Result<(), platform_core::DeadLetterSinkError>> + Send + '_>>
        {
            self.records.lock().unwrap().push(record);
            Box::pin(async { Ok(()) })
        }
    }

    struct FailingSink;

    impl DeadLetterSink for FailingSink {
        fn record(
            &self,
            _record: DeadLetterRecord,
        ) -> Pin<Box<dyn Future<Output = Result<(), platform_core::DeadLetterSinkError>> + Send + '_>>
        {
            Box::pin(async { Err(platform_core::DeadLetterSinkError::StoreUnavailable("sink down".to_string())) })
        }
    }

    struct CountingHandler {
        calls: AtomicUsize,
        fail_until: usize,
        fatal: bool,
    }

    impl EventHandler for CountingHandler {
        fn consumer_name(&self) -> &str {
            "test-consumer"
        }

        fn topics(&self) -> &[&str] {
            &["test-topic"]
        }

        fn handle(
            &self,
            _event: &EnrichedEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move {
                if self.fatal {
                    return Err(HandlerError::Fatal("always fatal".to_string()));
                }
                if call <= self.fail_until {
                    return Err(HandlerError::Transient("not yet".to_string()));
                }
                Ok(())
            })
        }
    }

    fn test_event() -> EnrichedEvent {
        let id = Uuid::new_v4();
        EnrichedEvent::new(
            DomainEvent::NotificationRequested {
                user_id: id,
                kind: "test".to_string(),
                payload: serde_json::Value::Null,
            },
            Envelope::new_root(id, "test-suite", "1.0.0"),
        )
    }

    #[tokio::test]
    async fn succeeds_after_transient_retries_and_commits_once() {
        let event = test_event();
        let committed = Arc::new(AtomicUsize::new(0));
        let bus: Arc<dyn EventBus> = Arc::new(FakeBus {
            deliveries: Mutex::new(vec![event]),
            committed: Arc::clone(&committed),
        });
        let ledger: Arc<dyn IdempotencyLedger> = Arc::new(InMemoryLedger {
            seen: Mutex::new(std::collections::HashSet::new()),
        });
        let sink: Arc<dyn DeadLetterSink> = Arc::new(RecordingSink {
            records: Mutex::new(Vec::new()),
        });
        let handler: Arc<dyn EventHandler> = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            fail_until: 2,
            fatal: false,
        });
        let mut policy = RetryPolicy::default();
        policy.initial_delay = Duration::from_millis(1);
        policy.max_delay = Duration::from_millis(5);

        let (_tx, rx) = watch::channel(false);
        run(bus, ledger, sink, handler, policy, rx).await.unwrap();

        assert_eq!(committed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fatal_error_dead_letters_and_commits_without_retry() {
        let event = test_event();
        let committed = Arc::new(AtomicUsize::new(0));
        let bus: Arc<dyn EventBus> = Arc::new(FakeBus {
            deliveries: Mutex::new(vec![event]),
            committed: Arc::clone(&committed),
        });
        let ledger: Arc<dyn IdempotencyLedger> = Arc::new(InMemoryLedger {
            seen: Mutex::new(std::collections::HashSet::new()),
        });
        let sink = Arc::new(RecordingSink {
            records: Mutex::new(Vec::new()),
        });
        let handler: Arc<dyn EventHandler> = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            fail_until: 0,
            fatal: true,
        });

        let (_tx, rx) = watch::channel(false);
        run(bus, ledger, sink.clone(), handler, RetryPolicy::default(), rx)
            .await
            .unwrap();

        assert_eq!(committed.load(Ordering::SeqCst), 1);
        assert_eq!(sink.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fatal_error_leaves_offset_uncommitted_when_dead_letter_write_fails() {
        let event = test_event();
        let committed = Arc::new(AtomicUsize::new(0));
        let bus: Arc<dyn EventBus> = Arc::new(FakeBus {
            deliveries: Mutex::new(vec![event]),
            committed: Arc::clone(&committed),
        });
        let ledger: Arc<dyn IdempotencyLedger> = Arc::new(InMemoryLedger {
            seen: Mutex::new(std::collections::HashSet::new()),
        });
        let sink: Arc<dyn DeadLetterSink> = Arc::new(FailingSink);
        let handler: Arc<dyn EventHandler> = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            fail_until: 0,
            fatal: true,
        });

        let (_tx, rx) = watch::channel(false);
        run(bus, ledger, sink, handler, RetryPolicy::default(), rx)
            .await
            .unwrap();

        assert_eq!(committed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn already_processed_events_skip_the_handler() {
        let event = test_event();
        let key = LedgerKey::new(event.metadata.event_id, "test-consumer".to_string());
        let committed = Arc::new(AtomicUsize::new(0));
        let bus: Arc<dyn EventBus> = Arc::new(FakeBus {
            deliveries: Mutex::new(vec![event]),
            committed: Arc::clone(&committed),
        });
        let mut seen = std::collections::HashSet::new();
        seen.insert(key);
        let ledger: Arc<dyn IdempotencyLedger> = Arc::new(InMemoryLedger {
            seen: Mutex::new(seen),
        });
        let sink: Arc<dyn DeadLetterSink> = Arc::new(RecordingSink {
            records: Mutex::new(Vec::new()),
        });
        let handler: Arc<dyn EventHandler> = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            fail_until: 0,
            fatal: false,
        });

        let (_tx, rx) = watch::channel(false);
        run(bus, ledger, sink, handler, RetryPolicy::default(), rx)
            .await
            .unwrap();

        assert_eq!(committed.load(Ordering::SeqCst), 1);
    }
}
