//! Postgres-backed [`AllocationRepository`].
//!
//! Backs the `allocations`/`sessions`/`journeys` tables. The partial unique
//! index `(student_id, course_id) WHERE status IN ('approved','active')` is
//! the final arbiter the allocation engine's recovery path relies on: a
//! concurrent create that loses the race surfaces here as a unique
//! violation, mapped to [`RepositoryError::Conflict`] rather than bubbled up
//! as a generic database error.

use platform_core::{
    Allocation, AllocationRepository, AllocationStatus, Journey, JourneyStatus, NewAllocation,
    NewSession, RepositoryError, Session, SessionStatus, SessionType,
};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(sqlx::error::DatabaseError::code)
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}

/// Postgres-backed allocation/session/journey repository.
pub struct PostgresAllocationRepository {
    pool: PgPool,
}

impl PostgresAllocationRepository {
    /// Build a repository over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_allocation(
        tx: &mut Transaction<'_, Postgres>,
        allocation: &NewAllocation,
    ) -> Result<Allocation, sqlx::Error> {
        let row = sqlx::query(
            r"
            INSERT INTO allocations (
                id, student_id, course_id, trainer_id, status, metadata,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            RETURNING id, student_id, course_id, trainer_id, status, metadata,
                      created_at, updated_at
            ",
        )
        .bind(allocation.id)
        .bind(&allocation.student_id)
        .bind(&allocation.course_id)
        .bind(allocation.trainer_id)
        .bind(allocation.status.as_str())
        .bind(&allocation.metadata)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row_to_allocation(&row))
    }

    async fn insert_sessions(
        tx: &mut Transaction<'_, Postgres>,
        allocation_id: Uuid,
        sessions: &[NewSession],
    ) -> Result<(), sqlx::Error> {
        for session in sessions {
            sqlx::query(
                r"
                INSERT INTO sessions (
                    session_id, allocation_id, student_id, trainer_id,
                    scheduled_date, status, session_type
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(session.session_id)
            .bind(allocation_id)
            .bind(&session.student_id)
            .bind(session.trainer_id)
            .bind(session.scheduled_date)
            .bind(SessionStatus::Scheduled.as_str())
            .bind(session.session_type.as_str())
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

fn row_to_allocation(row: &sqlx::postgres::PgRow) -> Allocation {
    let status_str: String = row.get("status");
    Allocation {
        id: row.get("id"),
        student_id: row.get("student_id"),
        course_id: row.get("course_id"),
        trainer_id: row.get("trainer_id"),
        status: AllocationStatus::parse(&status_str).unwrap_or(AllocationStatus::Pending),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl AllocationRepository for PostgresAllocationRepository {
    fn find_active_allocation(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Allocation>, RepositoryError>> + Send + '_>>
    {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT id, student_id, course_id, trainer_id, status, metadata,
                       created_at, updated_at
                FROM allocations
                WHERE student_id = $1 AND course_id = $2
                  AND status IN ('approved', 'active')
                ",
            )
            .bind(student_id)
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::StoreUnavailable(e.to_string()))?;

            Ok(row.as_ref().map(row_to_allocation))
        })
    }

    fn create_allocation(
        &self,
        allocation: NewAllocation,
        sessions: Vec<NewSession>,
    ) -> Pin<Box<dyn Future<Output = Result<Allocation, RepositoryError>> + Send + '_>> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| RepositoryError::StoreUnavailable(e.to_string()))?;

            let created = match Self::insert_allocation(&mut tx, &allocation).await {
                Ok(created) => created,
                Err(e) if is_unique_violation(&e) => {
                    return Err(RepositoryError::Conflict(format!(
                        "allocation already exists for ({}, {})",
                        allocation.student_id, allocation.course_id
                    )));
                }
                Err(e) => return Err(RepositoryError::StoreUnavailable(e.to_string())),
            };

            Self::insert_sessions(&mut tx, created.id, &sessions)
                .await
                .map_err(|e| RepositoryError::StoreUnavailable(e.to_string()))?;

            tx.commit()
                .await
                .map_err(|e| RepositoryError::StoreUnavailable(e.to_string()))?;

            metrics::counter!(
                "allocation.created",
                "status" => allocation.status.as_str()
            )
            .increment(1);

            Ok(created)
        })
    }

    fn find_active_journey_for_session(
        &self,
        session_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Journey>, RepositoryError>> + Send + '_>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT journey_id, session_id, trainer_id, student_id, status,
                       started_at, ended_at
                FROM journeys
                WHERE session_id = $1 AND status = 'active'
                ",
            )
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::StoreUnavailable(e.to_string()))?;

            row.as_ref()
                .map(|row| {
                    let status_str: String = row.get("status");
                    Ok(Journey {
                        journey_id: row.get("journey_id"),
                        session_id: row.get("session_id"),
                        trainer_id: row.get("trainer_id"),
                        student_id: row.get("student_id"),
                        status: JourneyStatus::parse(&status_str)?,
                        started_at: row.get("started_at"),
                        ended_at: row.get("ended_at"),
                    })
                })
                .transpose()
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            AllocationStatus::Pending,
            AllocationStatus::Approved,
            AllocationStatus::Active,
            AllocationStatus::Cancelled,
        ] {
            assert_eq!(AllocationStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn session_type_round_trips_through_strings() {
        for kind in [SessionType::Online, SessionType::Offline] {
            assert_eq!(SessionType::parse(kind.as_str()).unwrap(), kind);
        }
    }
}
