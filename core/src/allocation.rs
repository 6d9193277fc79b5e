//! Allocation/session/journey row shapes and the repository contract the
//! allocation engine persists them through.
//!
//! These are the core's other piece of durable state (alongside the
//! idempotency ledger): rows created by the allocation engine in reaction to
//! `PURCHASE_CREATED` and mutated by later session/journey handlers. The
//! trait lives here rather than in `platform-allocation-engine` so that
//! crate can depend on the contract without depending on
//! `platform-store-postgres`, mirroring [`crate::idempotency::IdempotencyLedger`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle state of an allocation.
///
/// `Approved` and `Active` are the two states that count as "exists" for
/// the `(studentId, courseId)` uniqueness guarantee; `Pending` allocations
/// (no eligible trainer found) and `Cancelled` allocations do not occupy
/// the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    /// No eligible trainer was found; `metadata.reason` explains why.
    Pending,
    /// A trainer has been matched but the allocation has not yet started.
    Approved,
    /// The allocation has at least one session in progress or completed.
    Active,
    /// Terminal: the allocation was cancelled. Preserved, never deleted.
    Cancelled,
}

impl AllocationStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Active => "active",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from a database string.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Other`] if `s` is not a known status.
    pub fn parse(s: &str) -> Result<Self, RepositoryError> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "active" => Ok(Self::Active),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(RepositoryError::Other(format!(
                "unknown allocation status: {other}"
            ))),
        }
    }
}

/// A trainer allocation for a `(studentId, courseId)` purchase.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Allocation {
    /// Allocation id; doubles as the `eventId` of the `TRAINER_ALLOCATED` event.
    pub id: Uuid,
    /// The purchasing student.
    pub student_id: Uuid,
    /// The purchased course.
    pub course_id: Uuid,
    /// The matched trainer, absent when `status = pending`.
    pub trainer_id: Option<Uuid>,
    /// Lifecycle state.
    pub status: AllocationStatus,
    /// Free-form metadata; carries `reason` when `status = pending`.
    pub metadata: Value,
    /// When the allocation was created.
    pub created_at: DateTime<Utc>,
    /// When the allocation was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a new [`Allocation`]; `id` is supplied by the
/// caller so it can double as the derived `TRAINER_ALLOCATED` event id.
#[derive(Clone, Debug)]
pub struct NewAllocation {
    /// Allocation id, pre-derived by the caller.
    pub id: Uuid,
    /// The purchasing student.
    pub student_id: Uuid,
    /// The purchased course.
    pub course_id: Uuid,
    /// The matched trainer, if any was found.
    pub trainer_id: Option<Uuid>,
    /// Lifecycle state at creation time.
    pub status: AllocationStatus,
    /// Free-form metadata; carries `reason` when `status = pending`.
    pub metadata: Value,
}

/// One of `N` daily sessions generated for an allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Scheduled, not yet started.
    Scheduled,
    /// Completed normally.
    Completed,
    /// Cancelled; preserved, never deleted.
    Cancelled,
}

impl SessionStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from a database string.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Other`] if `s` is not a known status.
    pub fn parse(s: &str) -> Result<Self, RepositoryError> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(RepositoryError::Other(format!(
                "unknown session status: {other}"
            ))),
        }
    }
}

/// Delivery mode of a single session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// Fixed-time, non-bookable online session.
    Online,
    /// In-person session.
    Offline,
}

impl SessionType {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }

    /// Parse from a database string.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Other`] if `s` is not a known session type.
    pub fn parse(s: &str) -> Result<Self, RepositoryError> {
        match s {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            other => Err(RepositoryError::Other(format!(
                "unknown session type: {other}"
            ))),
        }
    }
}

/// A single generated session belonging to an allocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Session id, deterministically derived from `(allocationId, sessionNumber)`.
    pub session_id: Uuid,
    /// Owning allocation.
    pub allocation_id: Uuid,
    /// The student, denormalized for query convenience.
    pub student_id: Uuid,
    /// The assigned trainer.
    pub trainer_id: Uuid,
    /// Calendar date the session falls on.
    pub scheduled_date: NaiveDate,
    /// Lifecycle state.
    pub status: SessionStatus,
    /// Online or offline delivery.
    pub session_type: SessionType,
}

/// Fields needed to create a new [`Session`] row.
#[derive(Clone, Debug)]
pub struct NewSession {
    /// Session id, pre-derived by the caller.
    pub session_id: Uuid,
    /// The student, denormalized for query convenience.
    pub student_id: Uuid,
    /// The assigned trainer.
    pub trainer_id: Uuid,
    /// Calendar date the session falls on.
    pub scheduled_date: NaiveDate,
    /// Online or offline delivery.
    pub session_type: SessionType,
}

/// Lifecycle state of a journey (a trainer's live-session run).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStatus {
    /// In progress; at most one per session by the partial unique index.
    Active,
    /// Completed normally.
    Completed,
    /// Cancelled; preserved, never deleted.
    Cancelled,
}

impl JourneyStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from a database string.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Other`] if `s` is not a known status.
    pub fn parse(s: &str) -> Result<Self, RepositoryError> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(RepositoryError::Other(format!(
                "unknown journey status: {other}"
            ))),
        }
    }
}

/// A trainer's live run through a single session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Journey {
    /// Journey id.
    pub journey_id: Uuid,
    /// The session this journey runs.
    pub session_id: Uuid,
    /// The trainer running it.
    pub trainer_id: Uuid,
    /// The student it's run for, used by the gateway's subscribe-ownership check.
    pub student_id: String,
    /// Lifecycle state.
    pub status: JourneyStatus,
    /// When the journey started, if it has.
    pub started_at: Option<DateTime<Utc>>,
    /// When the journey ended, if it has.
    pub ended_at: Option<DateTime<Utc>>,
}

/// Errors from allocation/session/journey repository operations.
#[derive(Error, Debug, Clone)]
pub enum RepositoryError {
    /// The backing store is unavailable; retryable by the caller.
    #[error("repository store unavailable: {0}")]
    StoreUnavailable(String),

    /// The `(studentId, courseId)` or `(sessionId)` uniqueness constraint was
    /// violated by a concurrent writer. Per the recovery path, callers must
    /// treat this as convergent success, not a failure.
    #[error("uniqueness conflict: {0}")]
    Conflict(String),

    /// Any other storage failure.
    #[error("repository error: {0}")]
    Other(String),
}

/// Persistence contract for allocations, the sessions generated under them,
/// and the journeys run against those sessions.
///
/// # Dyn compatibility
///
/// As with [`crate::idempotency::IdempotencyLedger`], methods return boxed
/// futures so the repository can be held as `Arc<dyn AllocationRepository>`
/// inside the allocation engine's per-partition consumer tasks.
pub trait AllocationRepository: Send + Sync {
    /// Look up an allocation in `{approved, active}` for `(student_id, course_id)`.
    ///
    /// This is the recovery path's pre-ledger-check query: if it returns
    /// `Some`, the caller short-circuits and marks the event processed
    /// without re-running the selection algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::StoreUnavailable`] on a transient
    /// connection failure.
    fn find_active_allocation(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Allocation>, RepositoryError>> + Send + '_>>;

    /// Create `allocation` together with its generated `sessions` in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Conflict`] if the partial unique index on
    /// `(student_id, course_id)` rejects the insert — callers must treat
    /// this the same as a successful create (the existing row is the
    /// convergent state). Returns [`RepositoryError::StoreUnavailable`] on a
    /// transient connection failure.
    fn create_allocation(
        &self,
        allocation: NewAllocation,
        sessions: Vec<NewSession>,
    ) -> Pin<Box<dyn Future<Output = Result<Allocation, RepositoryError>> + Send + '_>>;

    /// Look up the active journey for `session_id`, if one exists.
    ///
    /// Used by the gateway's subscribe-ownership check (`journey:{journeyId}`
    /// rooms): a student may only subscribe to a journey whose session
    /// belongs to them.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::StoreUnavailable`] on a transient
    /// connection failure.
    fn find_active_journey_for_session(
        &self,
        session_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Journey>, RepositoryError>> + Send + '_>>;
}
