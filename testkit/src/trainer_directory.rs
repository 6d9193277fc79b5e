//! In-memory [`TrainerDirectory`] fixture.
//!
//! Grounded on `allocation-engine`'s own crate-private `FixtureDirectory`
//! test double (`allocation-engine/src/selection.rs`'s test module), lifted
//! out into a reusable fixture so other crates' tests (and integration
//! tests that span the allocation engine) don't each hand-roll one.

use chrono::NaiveDate;
use platform_allocation_engine::trainer_directory::{TrainerDirectory, TrainerDirectoryError, TrainerProfile};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use uuid::Uuid;

/// An in-memory [`TrainerDirectory`] keyed by course category/subcategory.
#[derive(Default)]
pub struct FixtureTrainerDirectory {
    candidates: Mutex<HashMap<(String, String), Vec<TrainerProfile>>>,
    daily_counts: Mutex<HashMap<(Uuid, NaiveDate), u32>>,
}

impl FixtureTrainerDirectory {
    /// Build an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `profile` as a candidate for `course_category`/`course_subcategory`.
    #[allow(clippy::missing_panics_doc)]
    pub fn add_candidate(&self, course_category: &str, course_subcategory: &str, profile: TrainerProfile) {
        self.candidates
            .lock()
            .unwrap()
            .entry((course_category.to_string(), course_subcategory.to_string()))
            .or_default()
            .push(profile);
    }

    /// Set `trainer_id`'s already-scheduled session count for `date`.
    #[allow(clippy::missing_panics_doc)]
    pub fn set_daily_session_count(&self, trainer_id: Uuid, date: NaiveDate, count: u32) {
        self.daily_counts.lock().unwrap().insert((trainer_id, date), count);
    }
}

impl TrainerDirectory for FixtureTrainerDirectory {
    fn candidates_for_course(
        &self,
        course_category: &str,
        course_subcategory: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TrainerProfile>, TrainerDirectoryError>> + Send + '_>> {
        let key = (course_category.to_string(), course_subcategory.to_string());
        let candidates = self.candidates.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(&key).cloned().unwrap_or_default();
        Box::pin(async move { Ok(candidates) })
    }

    fn daily_session_count(
        &self,
        trainer_id: Uuid,
        date: NaiveDate,
    ) -> Pin<Box<dyn Future<Output = Result<u32, TrainerDirectoryError>> + Send + '_>> {
        let count = self
            .daily_counts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&(trainer_id, date))
            .copied()
            .unwrap_or(0);
        Box::pin(async move { Ok(count) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use platform_allocation_engine::trainer_directory::{ApprovalStatus, GeoPoint};

    fn profile(trainer_id: Uuid) -> TrainerProfile {
        TrainerProfile {
            trainer_id,
            specialties: vec!["yoga:hatha".to_string()],
            approval_status: ApprovalStatus::Approved,
            base_location: GeoPoint { lat: 12.97, lon: 77.59 },
            gender: None,
            active_workload: 0,
            available_time_slots: vec!["morning".to_string()],
            approved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn candidates_are_scoped_to_their_registered_course() {
        let directory = FixtureTrainerDirectory::new();
        let trainer_id = Uuid::new_v4();
        directory.add_candidate("yoga", "hatha", profile(trainer_id));

        let found = directory.candidates_for_course("yoga", "hatha").await.expect("candidates");
        assert_eq!(found.len(), 1);
        assert!(directory.candidates_for_course("yoga", "vinyasa").await.expect("candidates").is_empty());
    }

    #[tokio::test]
    async fn daily_session_count_defaults_to_zero() {
        let directory = FixtureTrainerDirectory::new();
        let trainer_id = Uuid::new_v4();
        let date = Utc::now().date_naive();

        assert_eq!(directory.daily_session_count(trainer_id, date).await.expect("count"), 0);
        directory.set_daily_session_count(trainer_id, date, 4);
        assert_eq!(directory.daily_session_count(trainer_id, date).await.expect("count"), 4);
    }
}
