//! In-memory [`AllocationRepository`] fixture.
//!
//! Grounded on the same `Arc<Mutex<Vec<_>>>` idiom as this crate's other
//! fixtures; enforces the `(student_id, course_id)` uniqueness conflict the
//! real Postgres-backed implementation's partial unique index enforces, so
//! tests against this fixture exercise the same recovery path.

use chrono::Utc;
use platform_core::{Allocation, AllocationRepository, AllocationStatus, Journey, NewAllocation, NewSession, RepositoryError, Session};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use uuid::Uuid;

/// An in-memory [`AllocationRepository`].
///
/// Journeys have no `create` operation on the trait (they are created by a
/// session-started handler elsewhere in the platform); tests that need one
/// present call [`InMemoryAllocationRepository::seed_journey`] directly.
#[derive(Default)]
pub struct InMemoryAllocationRepository {
    allocations: Mutex<Vec<Allocation>>,
    sessions: Mutex<Vec<Session>>,
    journeys: Mutex<Vec<Journey>>,
}

impl InMemoryAllocationRepository {
    /// Build an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a journey directly, bypassing `create_allocation`, for tests
    /// that only need `find_active_journey_for_session` to succeed.
    #[allow(clippy::missing_panics_doc)]
    pub fn seed_journey(&self, journey: Journey) {
        self.journeys.lock().unwrap().push(journey);
    }

    /// Snapshot of every allocation created so far.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn allocations(&self) -> Vec<Allocation> {
        self.allocations.lock().unwrap().clone()
    }

    /// Snapshot of every session created so far.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.lock().unwrap().clone()
    }
}

impl AllocationRepository for InMemoryAllocationRepository {
    fn find_active_allocation(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Allocation>, RepositoryError>> + Send + '_>> {
        let found = self
            .allocations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .find(|allocation| {
                allocation.student_id == student_id
                    && allocation.course_id == course_id
                    && matches!(allocation.status, AllocationStatus::Approved | AllocationStatus::Active)
            })
            .cloned();
        Box::pin(async move { Ok(found) })
    }

    fn create_allocation(
        &self,
        allocation: NewAllocation,
        sessions: Vec<NewSession>,
    ) -> Pin<Box<dyn Future<Output = Result<Allocation, RepositoryError>> + Send + '_>> {
        let conflict = self
            .allocations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .any(|existing| {
                existing.student_id == allocation.student_id
                    && existing.course_id == allocation.course_id
                    && matches!(existing.status, AllocationStatus::Approved | AllocationStatus::Active)
            });

        if conflict {
            return Box::pin(async move {
                Err(RepositoryError::Conflict(format!(
                    "allocation already exists for student {} course {}",
                    allocation.student_id, allocation.course_id
                )))
            });
        }

        let now = Utc::now();
        let row = Allocation {
            id: allocation.id,
            student_id: allocation.student_id,
            course_id: allocation.course_id,
            trainer_id: allocation.trainer_id,
            status: allocation.status,
            metadata: allocation.metadata,
            created_at: now,
            updated_at: now,
        };
        self.allocations.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(row.clone());

        let mut stored_sessions = self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for session in sessions {
            stored_sessions.push(Session {
                session_id: session.session_id,
                allocation_id: row.id,
                student_id: session.student_id,
                trainer_id: session.trainer_id,
                scheduled_date: session.scheduled_date,
                status: platform_core::SessionStatus::Scheduled,
                session_type: session.session_type,
            });
        }

        Box::pin(async move { Ok(row) })
    }

    fn find_active_journey_for_session(
        &self,
        session_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Journey>, RepositoryError>> + Send + '_>> {
        let found = self
            .journeys
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .find(|journey| {
                journey.session_id == session_id
                    && journey.status == platform_core::JourneyStatus::Active
            })
            .cloned();
        Box::pin(async move { Ok(found) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_core::JourneyStatus;
    use serde_json::json;

    fn new_allocation(student_id: Uuid, course_id: Uuid) -> NewAllocation {
        NewAllocation {
            id: Uuid::new_v4(),
            student_id,
            course_id,
            trainer_id: Some(Uuid::new_v4()),
            status: AllocationStatus::Approved,
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn create_then_find_active_round_trips() {
        let repo = InMemoryAllocationRepository::new();
        let student_id = Uuid::new_v4();
        let course_id = Uuid::new_v4();

        repo.create_allocation(new_allocation(student_id, course_id), vec![]).await.expect("create");

        let found = repo.find_active_allocation(student_id, course_id).await.expect("find").expect("present");
        assert_eq!(found.student_id, student_id);
    }

    #[tokio::test]
    async fn second_create_for_the_same_pair_conflicts() {
        let repo = InMemoryAllocationRepository::new();
        let student_id = Uuid::new_v4();
        let course_id = Uuid::new_v4();

        repo.create_allocation(new_allocation(student_id, course_id), vec![]).await.expect("first create");
        let second = repo.create_allocation(new_allocation(student_id, course_id), vec![]).await;

        assert!(matches!(second, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn seeded_journey_is_found_by_session() {
        let repo = InMemoryAllocationRepository::new();
        let session_id = Uuid::new_v4();
        repo.seed_journey(Journey {
            journey_id: Uuid::new_v4(),
            session_id,
            trainer_id: Uuid::new_v4(),
            student_id: Uuid::new_v4().to_string(),
            status: JourneyStatus::Active,
            started_at: None,
            ended_at: None,
        });

        let found = repo.find_active_journey_for_session(session_id).await.expect("find");
        assert!(found.is_some());
    }
}
