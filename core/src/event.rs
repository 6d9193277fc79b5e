//! The domain event model: typed payloads, the metadata envelope, and the
//! wire-level enriched record that the event log actually carries.
//!
//! An [`Envelope`] is attached to every payload before it leaves a producer.
//! Handlers never see a bare payload; they see an [`EnrichedEvent`], the
//! union of payload and envelope, exactly as delivered by the log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while encoding or decoding events on the wire.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize an event to its wire representation.
    #[error("failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to decode a wire record back into an [`EnrichedEvent`].
    #[error("failed to deserialize event: {0}")]
    DeserializationError(String),

    /// The `type` discriminator did not match any known variant.
    ///
    /// Per the event-type contract, unknown tags are fatal at decode time —
    /// they are never silently dropped or retried.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
}

/// Metadata envelope attached to every event by its producer.
///
/// `event_id` must be stable across re-emission: a producer re-publishing a
/// logically identical occurrence (e.g. after a crash and retry) derives the
/// same `event_id` from the business key so that replays collapse under the
/// idempotency ledger. `correlation_id` is copied verbatim from the inbound
/// envelope whenever a handler produces new events in reaction to one it
/// consumed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Globally unique id of the logical occurrence this event represents.
    pub event_id: Uuid,
    /// Correlation id threaded through a causal chain of events and requests.
    pub correlation_id: Uuid,
    /// Name of the producing service, e.g. `"payment-service"`.
    pub source: String,
    /// Semver string of the producer's event schema.
    pub version: String,
    /// Wall-clock time the event was produced.
    pub produced_at: DateTime<Utc>,
}

impl Envelope {
    /// Start a new causal chain: a fresh correlation id equal to the event id.
    #[must_use]
    pub fn new_root(event_id: Uuid, source: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            event_id,
            correlation_id: event_id,
            source: source.into(),
            version: version.into(),
            produced_at: Utc::now(),
        }
    }

    /// Derive a new envelope for an event emitted in reaction to this one,
    /// inheriting `correlation_id` and stamping a fresh `event_id`.
    #[must_use]
    pub fn derive(&self, event_id: Uuid, source: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            event_id,
            correlation_id: self.correlation_id,
            source: source.into(),
            version: version.into(),
            produced_at: Utc::now(),
        }
    }
}

/// The closed set of domain event types carried by the log.
///
/// Each variant carries its payload fields directly. Consumers match
/// exhaustively; a new variant is a breaking wire change by design (see
/// `EventError::UnknownEventType`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum DomainEvent {
    /// A student purchased a course tier; triggers allocation.
    PurchaseCreated {
        /// Purchasing student.
        student_id: Uuid,
        /// Purchased course.
        course_id: Uuid,
        /// Purchased tier (number of sessions).
        purchase_tier: u32,
        /// Free-form hints: preferred time slot, preferred start date, etc.
        metadata: serde_json::Value,
    },
    /// A trainer (or none) was selected for a purchase.
    TrainerAllocated {
        /// The allocation created.
        allocation_id: Uuid,
        /// Purchasing student.
        student_id: Uuid,
        /// Purchased course.
        course_id: Uuid,
        /// Selected trainer, absent when no eligible trainer was found.
        trainer_id: Option<Uuid>,
    },
    /// The initial session schedule for an allocation was created.
    SessionsGenerated {
        /// Owning allocation.
        allocation_id: Uuid,
        /// Number of sessions generated.
        session_count: u32,
    },
    /// A downstream notification should be dispatched.
    NotificationRequested {
        /// Recipient user.
        user_id: Uuid,
        /// Notification template/kind key.
        kind: String,
        /// Template parameters.
        payload: serde_json::Value,
    },
    /// A trainer began a session.
    SessionStarted {
        /// The session.
        session_id: Uuid,
        /// Student on this session.
        student_id: Uuid,
        /// Trainer on this session.
        trainer_id: Uuid,
    },
    /// A session was marked complete.
    SessionCompleted {
        /// The session.
        session_id: Uuid,
        /// Student on this session.
        student_id: Uuid,
        /// Trainer on this session.
        trainer_id: Uuid,
    },
    /// A session's scheduled date changed.
    SessionRescheduled {
        /// The session.
        session_id: Uuid,
        /// New scheduled date.
        new_scheduled_date: DateTime<Utc>,
    },
    /// A session's trainer was swapped.
    SessionSubstituted {
        /// The session.
        session_id: Uuid,
        /// Student on this session.
        student_id: Uuid,
        /// Trainer originally assigned.
        original_trainer_id: Uuid,
        /// Trainer now assigned.
        substitute_trainer_id: Uuid,
    },
    /// Payroll figures for a trainer were recomputed.
    PayrollRecalculated {
        /// Trainer whose payroll changed.
        trainer_id: Uuid,
        /// Recalculated period key, e.g. `"2026-07"`.
        period: String,
    },
    /// A trainer's live location updated during an in-progress journey.
    JourneyLocationUpdated {
        /// The journey.
        journey_id: Uuid,
        /// Trainer on this journey.
        trainer_id: Uuid,
        /// Student awaiting this journey.
        student_id: Uuid,
        /// Latitude/longitude pair.
        location: (f64, f64),
        /// Monotonic sequence number within the journey.
        sequence: u64,
    },
    /// A journey reached a terminal state.
    JourneyEnded {
        /// The journey.
        journey_id: Uuid,
        /// Session the journey was travelling toward.
        session_id: Uuid,
    },
    /// A catch-all for course-domain facts the core treats opaquely.
    CourseUpdated {
        /// The course.
        course_id: Uuid,
        /// Opaque change payload, owned by the course service.
        payload: serde_json::Value,
    },
}

impl DomainEvent {
    /// The static `type` discriminator, also used as the Kafka partition key
    /// prefix and as part of the dead-letter record.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::PurchaseCreated { .. } => "PURCHASE_CREATED",
            Self::TrainerAllocated { .. } => "TRAINER_ALLOCATED",
            Self::SessionsGenerated { .. } => "SESSIONS_GENERATED",
            Self::NotificationRequested { .. } => "NOTIFICATION_REQUESTED",
            Self::SessionStarted { .. } => "SESSION_STARTED",
            Self::SessionCompleted { .. } => "SESSION_COMPLETED",
            Self::SessionRescheduled { .. } => "SESSION_RESCHEDULED",
            Self::SessionSubstituted { .. } => "SESSION_SUBSTITUTED",
            Self::PayrollRecalculated { .. } => "PAYROLL_RECALCULATED",
            Self::JourneyLocationUpdated { .. } => "JOURNEY_LOCATION_UPDATED",
            Self::JourneyEnded { .. } => "JOURNEY_ENDED",
            Self::CourseUpdated { .. } => "COURSE_UPDATED",
        }
    }

    /// The business id used to choose the partition key, so causally
    /// dependent events for the same entity land on the same partition.
    #[must_use]
    pub fn partition_key(&self) -> String {
        match self {
            Self::PurchaseCreated { student_id, course_id, .. } => {
                format!("{student_id}:{course_id}")
            }
            Self::TrainerAllocated { allocation_id, .. } => allocation_id.to_string(),
            Self::SessionsGenerated { allocation_id, .. } => allocation_id.to_string(),
            Self::NotificationRequested { user_id, .. } => user_id.to_string(),
            Self::SessionStarted { session_id, .. }
            | Self::SessionCompleted { session_id, .. }
            | Self::SessionRescheduled { session_id, .. }
            | Self::SessionSubstituted { session_id, .. } => session_id.to_string(),
            Self::PayrollRecalculated { trainer_id, .. } => trainer_id.to_string(),
            Self::JourneyLocationUpdated { journey_id, .. } | Self::JourneyEnded { journey_id, .. } => {
                journey_id.to_string()
            }
            Self::CourseUpdated { course_id, .. } => course_id.to_string(),
        }
    }
}

/// The unit the event log actually transports: payload plus envelope.
///
/// Wire format is self-describing JSON (`{type, payload fields…, _metadata}`)
/// per the external wire contract: `DomainEvent`'s internal `#[serde(tag =
/// "type")]` representation nests payload fields at the top level next to
/// `type`, and `_metadata` carries the envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnrichedEvent {
    /// The typed payload.
    #[serde(flatten)]
    pub payload: DomainEvent,
    /// The metadata envelope.
    #[serde(rename = "_metadata")]
    pub metadata: Envelope,
}

impl EnrichedEvent {
    /// Wrap a payload with its envelope.
    #[must_use]
    pub const fn new(payload: DomainEvent, metadata: Envelope) -> Self {
        Self { payload, metadata }
    }

    /// The `type` discriminator of the wrapped payload.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    /// Encode to the wire representation (self-describing JSON).
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if `serde_json` fails,
    /// which in practice only happens for non-UTF-8 map keys, not reachable
    /// from this type's fields.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Decode from the wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] for malformed JSON or a
    /// missing required field, and [`EventError::UnknownEventType`] when the
    /// `type` tag does not match a known variant.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(bytes).map_err(|e| {
            // serde's internal tagged-enum error message includes the
            // unrecognized variant name, the best signal available for
            // telling "unknown type" apart from "malformed record".
            let msg = e.to_string();
            if msg.contains("unknown variant") {
                EventError::UnknownEventType(msg)
            } else {
                EventError::DeserializationError(msg)
            }
        })
    }
}

impl fmt::Display for EnrichedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(event_id={}, correlation_id={})",
            self.event_type(),
            self.metadata.event_id,
            self.metadata.correlation_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_payload_and_envelope() {
        let event_id = Uuid::new_v4();
        let envelope = Envelope::new_root(event_id, "payment-service", "1.0.0");
        let enriched = EnrichedEvent::new(
            DomainEvent::PurchaseCreated {
                student_id: Uuid::new_v4(),
                course_id: Uuid::new_v4(),
                purchase_tier: 10,
                metadata: serde_json::json!({"preferredTimeSlot": "morning"}),
            },
            envelope.clone(),
        );

        let bytes = enriched.to_bytes().expect("encode");
        let decoded = EnrichedEvent::from_bytes(&bytes).expect("decode");

        assert_eq!(decoded.metadata, envelope);
        assert_eq!(decoded.payload, enriched.payload);
    }

    #[test]
    fn unknown_type_is_fatal_at_decode() {
        let bad = br#"{"type":"NOT_A_REAL_EVENT","_metadata":{"eventId":"00000000-0000-0000-0000-000000000000","correlationId":"00000000-0000-0000-0000-000000000000","source":"x","version":"1.0.0","producedAt":"2026-01-01T00:00:00Z"}}"#;
        let err = EnrichedEvent::from_bytes(bad).unwrap_err();
        assert!(matches!(err, EventError::UnknownEventType(_)));
    }

    #[test]
    fn derived_envelope_inherits_correlation_id() {
        let root = Envelope::new_root(Uuid::new_v4(), "purchase-service", "1.0.0");
        let child = root.derive(Uuid::new_v4(), "allocation-engine", "1.0.0");
        assert_eq!(child.correlation_id, root.correlation_id);
        assert_ne!(child.event_id, root.event_id);
    }

    #[test]
    fn partition_key_groups_purchase_by_student_and_course() {
        let student_id = Uuid::new_v4();
        let course_id = Uuid::new_v4();
        let event = DomainEvent::PurchaseCreated {
            student_id,
            course_id,
            purchase_tier: 20,
            metadata: serde_json::Value::Null,
        };
        assert_eq!(event.partition_key(), format!("{student_id}:{course_id}"));
    }
}
