//! The dispatch loop: one task per Redis Pub/Sub channel, decoding each
//! message and fanning it out to this instance's local sockets.
//!
//! Because [`LocalSocketRegistry`](crate::fanout::local_registry::LocalSocketRegistry)
//! only ever holds sockets that upgraded against *this* process, looking a
//! recipient up there already is the "filter to entries whose prefix
//! matches the local instance id" step the dispatch algorithm describes —
//! there is no need to round-trip the shared KV per event per recipient.
//! The KV-backed [`SubscriptionRegistry`](platform_shared_kv::SubscriptionRegistry)
//! stays load-bearing for connection registration, the per-instance cap,
//! and journey-ownership checks; it is simply not consulted on this hot
//! path.

use crate::fanout::local_registry::LocalSocketRegistry;
use crate::fanout::visibility::{recipients, should_receive};
use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use platform_core::{DomainEvent, EnrichedEvent};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Name of the Redis Pub/Sub channel carrying business events, per §6.
pub const BUSINESS_EVENTS_CHANNEL: &str = "business-events";

/// Name of the Redis Pub/Sub channel carrying in-progress journey location
/// updates, per §6.
pub const JOURNEY_UPDATES_CHANNEL: &str = "journey:updates";

/// Name of the Redis Pub/Sub channel announcing a journey reached a
/// terminal state, per §6.
pub const JOURNEY_ENDED_CHANNEL: &str = "journey:ended";

/// The server → client WebSocket frame wrapping a fanned-out event.
#[derive(Debug, Clone, serde::Serialize)]
struct BusinessEventFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    event: &'a EnrichedEvent,
}

impl<'a> BusinessEventFrame<'a> {
    fn new(event: &'a EnrichedEvent) -> Self {
        Self { kind: "business-event", event }
    }
}

/// Server → client frames delivered to a journey's room.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type")]
enum JourneyFrame {
    /// A trainer's live location update.
    #[serde(rename = "journey:location")]
    Location {
        #[serde(rename = "journeyId")]
        journey_id: Uuid,
        location: (f64, f64),
        sequence: u64,
        timestamp: DateTime<Utc>,
    },
    /// The journey reached a terminal state; no further location updates
    /// will follow.
    #[serde(rename = "journey:ended")]
    Ended {
        #[serde(rename = "journeyId")]
        journey_id: Uuid,
    },
}

/// Subscribe to `business-events`, `journey:updates`, and `journey:ended`,
/// and fan out every decoded message to this instance's local sockets until
/// `shutdown` reports `true`.
///
/// # Errors
///
/// Returns an error if the Redis Pub/Sub connection cannot be established;
/// callers treat this as fatal to the gateway process.
pub async fn run(
    redis_url: &str,
    sockets: Arc<LocalSocketRegistry>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let client = redis::Client::open(redis_url)?;
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(BUSINESS_EVENTS_CHANNEL).await?;
    pubsub.subscribe(JOURNEY_UPDATES_CHANNEL).await?;
    pubsub.subscribe(JOURNEY_ENDED_CHANNEL).await?;
    let mut stream = pubsub.on_message();

    loop {
        tokio::select! {
            () = wait_for_shutdown(&mut shutdown) => {
                tracing::info!("fanout dispatcher shutting down");
                return Ok(());
            }
            message = stream.next() => {
                match message {
                    Some(msg) => {
                        let channel = msg.get_channel_name().to_string();
                        if let Ok(payload) = msg.get_payload::<Vec<u8>>() {
                            match channel.as_str() {
                                BUSINESS_EVENTS_CHANNEL => dispatch_payload(&payload, &sockets),
                                JOURNEY_UPDATES_CHANNEL | JOURNEY_ENDED_CHANNEL => {
                                    dispatch_journey_payload(&payload, &sockets);
                                }
                                other => {
                                    tracing::warn!(channel = %other, "message on unrecognized pub/sub channel");
                                }
                            }
                        }
                    }
                    None => {
                        tracing::warn!("fanout pub/sub stream ended");
                        return Ok(());
                    }
                }
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
            return;
        }
    }
}

fn dispatch_payload(payload: &[u8], sockets: &LocalSocketRegistry) {
    let enriched = match EnrichedEvent::from_bytes(payload) {
        Ok(event) => event,
        Err(error) => {
            tracing::warn!(%error, "dropping malformed business-events message");
            return;
        }
    };

    let recipient_ids = recipients(&enriched.payload);
    if recipient_ids.is_empty() {
        return;
    }

    let frame = BusinessEventFrame::new(&enriched);
    let json = match serde_json::to_string(&frame) {
        Ok(json) => json,
        Err(error) => {
            tracing::error!(%error, "failed to serialize business event frame");
            return;
        }
    };

    for recipient_id in recipient_ids {
        sockets.for_user(recipient_id, |role| {
            should_receive(&enriched.payload, recipient_id, role).then(|| Message::Text(json.clone()))
        });
    }

    sockets.for_admins(|| Some(Message::Text(json.clone())));
}

fn dispatch_journey_payload(payload: &[u8], sockets: &LocalSocketRegistry) {
    let enriched = match EnrichedEvent::from_bytes(payload) {
        Ok(event) => event,
        Err(error) => {
            tracing::warn!(%error, "dropping malformed journey message");
            return;
        }
    };

    let frame = match enriched.payload {
        DomainEvent::JourneyLocationUpdated { journey_id, location, sequence, .. } => {
            JourneyFrame::Location { journey_id, location, sequence, timestamp: enriched.metadata.produced_at }
        }
        DomainEvent::JourneyEnded { journey_id, .. } => JourneyFrame::Ended { journey_id },
        other => {
            tracing::warn!(event_type = other.event_type(), "non-journey event on a journey channel");
            return;
        }
    };

    let journey_id = match &frame {
        JourneyFrame::Location { journey_id, .. } | JourneyFrame::Ended { journey_id } => journey_id.to_string(),
    };

    let json = match serde_json::to_string(&frame) {
        Ok(json) => json,
        Err(error) => {
            tracing::error!(%error, "failed to serialize journey frame");
            return;
        }
    };

    sockets.for_journey(&journey_id, &Message::Text(json));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::visibility::Role;
    use platform_core::Envelope;

    fn enriched(payload: DomainEvent) -> EnrichedEvent {
        let event_id = Uuid::new_v4();
        EnrichedEvent::new(payload, Envelope::new_root(event_id, "test", "1.0.0"))
    }

    #[test]
    fn dispatch_delivers_to_the_students_local_socket_and_to_admins() {
        let sockets = LocalSocketRegistry::new();
        let student_id = Uuid::new_v4();
        let (student_tx, mut student_rx) = tokio::sync::mpsc::unbounded_channel();
        let (admin_tx, mut admin_rx) = tokio::sync::mpsc::unbounded_channel();
        let (other_tx, mut other_rx) = tokio::sync::mpsc::unbounded_channel();
        sockets.insert("sock-student".to_string(), student_id, Role::Student, student_tx);
        sockets.insert("sock-admin".to_string(), Uuid::new_v4(), Role::Admin, admin_tx);
        sockets.insert("sock-other".to_string(), Uuid::new_v4(), Role::Student, other_tx);

        let event = enriched(DomainEvent::PurchaseCreated {
            student_id,
            course_id: Uuid::new_v4(),
            purchase_tier: 10,
            metadata: serde_json::Value::Null,
        });
        let payload = event.to_bytes().expect("encode");

        dispatch_payload(&payload, &sockets);

        assert!(student_rx.try_recv().is_ok());
        assert!(admin_rx.try_recv().is_ok());
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn dispatch_drops_events_with_no_derivable_recipients() {
        let sockets = LocalSocketRegistry::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        sockets.insert("sock-admin".to_string(), Uuid::new_v4(), Role::Admin, tx);

        let event = enriched(DomainEvent::SessionsGenerated { allocation_id: Uuid::new_v4(), session_count: 5 });
        let payload = event.to_bytes().expect("encode");

        dispatch_payload(&payload, &sockets);

        // An empty recipient set means the dispatcher returns before even
        // the unconditional admin broadcast, per the "drop empty" rule.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn journey_dispatch_delivers_only_to_that_journeys_room() {
        let sockets = LocalSocketRegistry::new();
        let (member_tx, mut member_rx) = tokio::sync::mpsc::unbounded_channel();
        let (other_tx, mut other_rx) = tokio::sync::mpsc::unbounded_channel();
        sockets.insert("sock-member".to_string(), Uuid::new_v4(), Role::Student, member_tx);
        sockets.insert("sock-other".to_string(), Uuid::new_v4(), Role::Student, other_tx);

        let journey_id = Uuid::new_v4();
        sockets.join_journey(&journey_id.to_string(), "sock-member");

        let event = enriched(DomainEvent::JourneyLocationUpdated {
            journey_id,
            trainer_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            location: (12.97, 77.59),
            sequence: 1,
        });
        let payload = event.to_bytes().expect("encode");

        dispatch_journey_payload(&payload, &sockets);

        assert!(member_rx.try_recv().is_ok());
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn journey_ended_dispatch_uses_the_same_room() {
        let sockets = LocalSocketRegistry::new();
        let (member_tx, mut member_rx) = tokio::sync::mpsc::unbounded_channel();
        sockets.insert("sock-member".to_string(), Uuid::new_v4(), Role::Student, member_tx);

        let journey_id = Uuid::new_v4();
        sockets.join_journey(&journey_id.to_string(), "sock-member");

        let event = enriched(DomainEvent::JourneyEnded { journey_id, session_id: Uuid::new_v4() });
        let payload = event.to_bytes().expect("encode");

        dispatch_journey_payload(&payload, &sockets);

        let received = member_rx.try_recv().expect("delivered");
        if let Message::Text(text) = received {
            assert!(text.contains("journey:ended"));
        } else {
            panic!("expected a text frame");
        }
    }
}
