//! [`PurchaseCreatedHandler`]: the `EventHandler` the worker runtime drives
//! in reaction to `PURCHASE_CREATED`.

use crate::selection::{select_trainer, SelectionOutcome, SelectionRequest};
use crate::sessions::{generate_sessions, DeliveryMode, PlannedSession};
use crate::trainer_directory::{GeoPoint, Gender, TrainerDirectory, TrainerDirectoryError, Zone};
use chrono::NaiveDate;
use platform_core::{
    AllocationRepository, AllocationStatus, DomainEvent, EnrichedEvent, EventBus, EventBusError,
    Envelope, NewAllocation, NewSession, RepositoryError, SessionType,
};
use platform_worker_runtime::{EventHandler, HandlerError};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

/// Consumer name this handler registers under; also the name recorded in
/// the idempotency ledger row for each purchase it processes.
pub const CONSUMER_NAME: &str = "allocation-worker";

const PURCHASE_CREATED_TOPIC: &str = "purchase-created";
const TRAINER_ALLOCATED_TOPIC: &str = "trainer-allocated";
const SESSIONS_GENERATED_TOPIC: &str = "sessions-generated";
const ENVELOPE_SOURCE: &str = "allocation-engine";
const ENVELOPE_VERSION: &str = "1.0.0";

/// Schedule-affecting hints carried on a purchase event's free-form
/// `metadata` field.
///
/// Course category/subcategory and the student's location are carried here
/// rather than looked up from a separate course/student service: course
/// content and student profile data are out of this engine's scope per the
/// platform's Non-goals, so the purchase event itself is the narrowest
/// interface that still gives the selection algorithm what it needs.
#[derive(Debug, Deserialize)]
struct PurchaseMetadata {
    course_category: String,
    course_subcategory: String,
    student_lat: f64,
    student_lon: f64,
    student_zone: ZoneHint,
    #[serde(default)]
    preferred_time_slot: Option<String>,
    #[serde(default)]
    preferred_start_date: Option<NaiveDate>,
    #[serde(default)]
    preferred_gender: Option<GenderHint>,
    #[serde(default)]
    delivery_mode: Option<DeliveryModeHint>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ZoneHint {
    Urban,
    Medium,
    Periphery,
}

impl From<ZoneHint> for Zone {
    fn from(hint: ZoneHint) -> Self {
        match hint {
            ZoneHint::Urban => Self::Urban,
            ZoneHint::Medium => Self::Medium,
            ZoneHint::Periphery => Self::Periphery,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum GenderHint {
    Female,
    Male,
    Other,
}

impl From<GenderHint> for Gender {
    fn from(hint: GenderHint) -> Self {
        match hint {
            GenderHint::Female => Self::Female,
            GenderHint::Male => Self::Male,
            GenderHint::Other => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DeliveryModeHint {
    Online,
    Offline,
    Hybrid,
}

impl From<DeliveryModeHint> for DeliveryMode {
    fn from(hint: DeliveryModeHint) -> Self {
        match hint {
            DeliveryModeHint::Online => Self::Online,
            DeliveryModeHint::Offline => Self::Offline,
            DeliveryModeHint::Hybrid => Self::Hybrid,
        }
    }
}

/// Handles `PURCHASE_CREATED`: runs trainer selection, generates the initial
/// session schedule, and publishes `TRAINER_ALLOCATED`.
pub struct PurchaseCreatedHandler {
    repository: Arc<dyn AllocationRepository>,
    directory: Arc<dyn TrainerDirectory>,
    event_bus: Arc<dyn EventBus>,
}

impl PurchaseCreatedHandler {
    /// Build a handler over its three collaborators.
    #[must_use]
    pub fn new(
        repository: Arc<dyn AllocationRepository>,
        directory: Arc<dyn TrainerDirectory>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self { repository, directory, event_bus }
    }

    async fn handle_purchase_created(&self, event: EnrichedEvent) -> Result<(), HandlerError> {
        let DomainEvent::PurchaseCreated { student_id, course_id, purchase_tier, metadata } =
            event.payload
        else {
            // The consumer loop only ever routes this topic's events here;
            // a mismatched payload is a wiring bug, not a data problem.
            return Err(HandlerError::Fatal(format!(
                "PurchaseCreatedHandler received a non-PurchaseCreated payload: {}",
                event.metadata.source
            )));
        };

        // Recovery path: an allocation may already exist if a prior attempt
        // committed the side effect but crashed before the ledger write.
        // Re-running the selection algorithm would be wasted work (and,
        // absent this check, would race the uniqueness index every time).
        match self.repository.find_active_allocation(student_id, course_id).await {
            Ok(Some(_)) => return Ok(()),
            Ok(None) => {}
            Err(RepositoryError::StoreUnavailable(reason)) => {
                return Err(HandlerError::Transient(reason));
            }
            Err(other) => return Err(HandlerError::Fatal(other.to_string())),
        }

        let purchase_metadata: PurchaseMetadata = serde_json::from_value(metadata)
            .map_err(|e| HandlerError::Fatal(format!("invalid purchase metadata: {e}")))?;

        let start_date = purchase_metadata
            .preferred_start_date
            .unwrap_or_else(|| tomorrow(event.metadata.produced_at.date_naive()));
        let delivery_mode = purchase_metadata
            .delivery_mode
            .map_or(DeliveryMode::Offline, Into::into);
        let planned = generate_sessions(purchase_tier, start_date, delivery_mode);
        let proposed_dates: Vec<NaiveDate> = planned.iter().map(|p| p.scheduled_date).collect();

        let allocation_id = derive_allocation_id(student_id, course_id);

        let selection_request = SelectionRequest {
            course_category: &purchase_metadata.course_category,
            course_subcategory: &purchase_metadata.course_subcategory,
            student_location: GeoPoint {
                lat: purchase_metadata.student_lat,
                lon: purchase_metadata.student_lon,
            },
            student_zone: purchase_metadata.student_zone.into(),
            preferred_gender: purchase_metadata.preferred_gender.map(Into::into),
            preferred_time_slot: purchase_metadata.preferred_time_slot.as_deref(),
            proposed_dates: &proposed_dates,
        };

        let outcome = select_trainer(self.directory.as_ref(), &selection_request)
            .await
            .map_err(|e| match e {
                TrainerDirectoryError::Unavailable(reason) => HandlerError::Transient(reason),
                TrainerDirectoryError::Other(reason) => HandlerError::Fatal(reason),
            })?;

        let (trainer_id, status, allocation_metadata, sessions) = match outcome {
            SelectionOutcome::Matched(trainer_id) => (
                Some(trainer_id),
                AllocationStatus::Approved,
                json!({}),
                new_sessions(allocation_id, student_id, trainer_id, &planned),
            ),
            SelectionOutcome::NoEligibleTrainer => (
                None,
                AllocationStatus::Pending,
                json!({ "reason": "no eligible trainer found" }),
                Vec::new(),
            ),
        };

        let new_allocation = NewAllocation {
            id: allocation_id,
            student_id,
            course_id,
            trainer_id,
            status,
            metadata: allocation_metadata,
        };

        let created = self
            .repository
            .create_allocation(new_allocation, sessions.clone())
            .await;
        let _allocation = match created {
            Ok(allocation) => allocation,
            Err(RepositoryError::Conflict(_)) => {
                // Convergent: someone else's attempt won the uniqueness race.
                return Ok(());
            }
            Err(RepositoryError::StoreUnavailable(reason)) => {
                return Err(HandlerError::Transient(reason));
            }
            Err(other) => return Err(HandlerError::Fatal(other.to_string())),
        };

        self.publish_trainer_allocated(&event.metadata, &allocation_id, student_id, course_id, trainer_id)
            .await?;

        if !sessions.is_empty() {
            self.publish_sessions_generated(&event.metadata, allocation_id, sessions.len())
                .await?;
        }

        metrics::counter!("allocation.purchase_processed").increment(1);

        Ok(())
    }

    async fn publish_trainer_allocated(
        &self,
        inbound_envelope: &Envelope,
        allocation_id: &Uuid,
        student_id: Uuid,
        course_id: Uuid,
        trainer_id: Option<Uuid>,
    ) -> Result<(), HandlerError> {
        let envelope = inbound_envelope.derive(*allocation_id, ENVELOPE_SOURCE, ENVELOPE_VERSION);
        let payload = DomainEvent::TrainerAllocated {
            allocation_id: *allocation_id,
            student_id,
            course_id,
            trainer_id,
        };
        let enriched = EnrichedEvent::new(payload, envelope);

        self.event_bus
            .publish(TRAINER_ALLOCATED_TOPIC, &enriched)
            .await
            .map_err(map_publish_error)
    }

    async fn publish_sessions_generated(
        &self,
        inbound_envelope: &Envelope,
        allocation_id: Uuid,
        session_count: usize,
    ) -> Result<(), HandlerError> {
        let event_id = derive_sessions_generated_id(allocation_id);
        let envelope = inbound_envelope.derive(event_id, ENVELOPE_SOURCE, ENVELOPE_VERSION);
        #[allow(clippy::cast_possible_truncation)]
        let payload = DomainEvent::SessionsGenerated {
            allocation_id,
            session_count: session_count as u32,
        };
        let enriched = EnrichedEvent::new(payload, envelope);

        self.event_bus
            .publish(SESSIONS_GENERATED_TOPIC, &enriched)
            .await
            .map_err(map_publish_error)
    }
}

/// A malformed topic/envelope is this handler's bug, not a transport hiccup;
/// everything else is worth retrying.
fn map_publish_error(error: EventBusError) -> HandlerError {
    match error {
        EventBusError::InvalidTopic(reason) => HandlerError::Fatal(reason),
        other => HandlerError::Transient(other.to_string()),
    }
}

impl EventHandler for PurchaseCreatedHandler {
    fn consumer_name(&self) -> &str {
        CONSUMER_NAME
    }

    fn topics(&self) -> &[&str] {
        &[PURCHASE_CREATED_TOPIC]
    }

    fn handle(
        &self,
        event: &EnrichedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
        let event = event.clone();
        Box::pin(async move { self.handle_purchase_created(event).await })
    }
}

fn new_sessions(
    allocation_id: Uuid,
    student_id: Uuid,
    trainer_id: Uuid,
    planned: &[PlannedSession],
) -> Vec<NewSession> {
    planned
        .iter()
        .enumerate()
        .map(|(index, session)| {
            #[allow(clippy::cast_possible_truncation)]
            let session_number = index as u32 + 1;
            NewSession {
                session_id: derive_session_id(allocation_id, session_number),
                student_id,
                trainer_id,
                scheduled_date: session.scheduled_date,
                session_type: session.session_type,
            }
        })
        .collect()
}

/// Deterministically derive an allocation id from `(studentId, courseId)`.
///
/// `purchase-created` itself carries a free event id (there is no stable
/// business key upstream of the purchase), but every event *derived* from
/// it must be reproducible across redelivery so a crash-and-retry doesn't
/// mint a second allocation. `(studentId, courseId)` is the allocation's own
/// natural key, so it is what the id is derived from, not the purchase's
/// event id.
fn derive_allocation_id(student_id: Uuid, course_id: Uuid) -> Uuid {
    let namespace = Uuid::new_v5(&Uuid::NAMESPACE_URL, b"edge-learning:allocation");
    let key = format!("{student_id}:{course_id}");
    Uuid::new_v5(&namespace, key.as_bytes())
}

/// Deterministically derive a session id from `(allocationId, sessionNumber)`.
fn derive_session_id(allocation_id: Uuid, session_number: u32) -> Uuid {
    let namespace = Uuid::new_v5(&Uuid::NAMESPACE_URL, b"edge-learning:session");
    let key = format!("{allocation_id}:{session_number}");
    Uuid::new_v5(&namespace, key.as_bytes())
}

fn derive_sessions_generated_id(allocation_id: Uuid) -> Uuid {
    let namespace = Uuid::new_v5(&Uuid::NAMESPACE_URL, b"edge-learning:sessions-generated");
    Uuid::new_v5(&namespace, allocation_id.as_bytes())
}

fn tomorrow(today: NaiveDate) -> NaiveDate {
    today.succ_opt().unwrap_or(today)
}
