//! The trainer selection algorithm: hard filters, then soft-constraint
//! scoring over the surviving candidates.

use crate::trainer_directory::{ApprovalStatus, GeoPoint, Gender, TrainerDirectory, TrainerDirectoryError, Zone};
use chrono::NaiveDate;
use uuid::Uuid;

/// Daily session capacity per trainer; a hard cap regardless of zone or tier.
const DAILY_CAPACITY: u32 = 8;

/// The purchase-derived request the selection algorithm matches against.
#[derive(Clone, Debug)]
pub struct SelectionRequest<'a> {
    /// Course category, e.g. `"music"`.
    pub course_category: &'a str,
    /// Course subcategory, e.g. `"piano"`.
    pub course_subcategory: &'a str,
    /// Student's home location.
    pub student_location: GeoPoint,
    /// Student's zone, fixing the feasibility radius.
    pub student_zone: Zone,
    /// Preferred trainer gender, if the student expressed one.
    pub preferred_gender: Option<Gender>,
    /// Preferred time slot, if the student expressed one.
    pub preferred_time_slot: Option<&'a str>,
    /// The calendar dates the generated session schedule will occupy; used
    /// for the daily-capacity hard filter.
    pub proposed_dates: &'a [NaiveDate],
}

/// Outcome of running the selection algorithm.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// A trainer was matched.
    Matched(Uuid),
    /// No eligible trainer survived the hard filters; this is a business
    /// outcome, not a failure — the caller creates a pending allocation.
    NoEligibleTrainer,
}

/// Run the selection algorithm against `directory` for `request`.
///
/// Hard filters, in order: course-specialty match, approval status,
/// geographic feasibility, daily capacity. Surviving candidates are scored
/// by gender-preference match, time-slot availability, and inverse active
/// workload; ties are broken by earliest-approved trainer.
///
/// # Errors
///
/// Propagates [`TrainerDirectoryError`] from the directory lookup; a
/// transient directory failure is the caller's to retry, not folded into
/// [`SelectionOutcome::NoEligibleTrainer`].
pub async fn select_trainer(
    directory: &dyn TrainerDirectory,
    request: &SelectionRequest<'_>,
) -> Result<SelectionOutcome, TrainerDirectoryError> {
    let candidates = directory
        .candidates_for_course(request.course_category, request.course_subcategory)
        .await?;

    let mut eligible = Vec::new();
    for candidate in candidates {
        if candidate.approval_status != ApprovalStatus::Approved {
            continue;
        }
        let specializes = candidate.specialties.iter().any(|s| s == request.course_category)
            && candidate.specialties.iter().any(|s| s == request.course_subcategory);
        if !specializes {
            continue;
        }
        let distance = candidate.base_location.distance_km(&request.student_location);
        if distance > request.student_zone.radius_km() {
            continue;
        }

        let mut within_capacity = true;
        for date in request.proposed_dates {
            let count = directory.daily_session_count(candidate.trainer_id, *date).await?;
            if count >= DAILY_CAPACITY {
                within_capacity = false;
                break;
            }
        }
        if !within_capacity {
            continue;
        }

        eligible.push(candidate);
    }

    if eligible.is_empty() {
        return Ok(SelectionOutcome::NoEligibleTrainer);
    }

    let mut best = eligible.remove(0);
    let mut best_score = score(&best, request);
    for candidate in eligible {
        let candidate_score = score(&candidate, request);
        let candidate_is_better = candidate_score > best_score
            || ((candidate_score - best_score).abs() < f64::EPSILON
                && candidate.approved_at < best.approved_at);
        if candidate_is_better {
            best_score = candidate_score;
            best = candidate;
        }
    }

    Ok(SelectionOutcome::Matched(best.trainer_id))
}

fn score(candidate: &crate::trainer_directory::TrainerProfile, request: &SelectionRequest<'_>) -> f64 {
    const GENDER_MATCH_WEIGHT: f64 = 3.0;
    const TIME_SLOT_WEIGHT: f64 = 2.0;

    let mut total = 0.0;

    if let Some(preferred) = request.preferred_gender {
        if candidate.gender == Some(preferred) {
            total += GENDER_MATCH_WEIGHT;
        }
    }

    if let Some(slot) = request.preferred_time_slot {
        if candidate.available_time_slots.iter().any(|s| s == slot) {
            total += TIME_SLOT_WEIGHT;
        }
    }

    // Inverse of current active workload: lighter-loaded trainers score higher.
    total += 1.0 / f64::from(candidate.active_workload + 1);

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer_directory::TrainerProfile;
    use chrono::Utc;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    struct FixtureDirectory {
        profiles: Vec<TrainerProfile>,
        daily_counts: Mutex<std::collections::HashMap<(Uuid, NaiveDate), u32>>,
    }

    impl TrainerDirectory for FixtureDirectory {
        fn candidates_for_course(
            &self,
            _course_category: &str,
            _course_subcategory: &str,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<TrainerProfile>, TrainerDirectoryError>> + Send + '_>>
        {
            let profiles = self.profiles.clone();
            Box::pin(async move { Ok(profiles) })
        }

        fn daily_session_count(
            &self,
            trainer_id: Uuid,
            date: NaiveDate,
        ) -> Pin<Box<dyn Future<Output = Result<u32, TrainerDirectoryError>> + Send + '_>> {
            let count = self
                .daily_counts
                .lock()
                .expect("lock poisoned")
                .get(&(trainer_id, date))
                .copied()
                .unwrap_or(0);
            Box::pin(async move { Ok(count) })
        }
    }

    fn profile(trainer_id: Uuid, specialties: &[&str]) -> TrainerProfile {
        TrainerProfile {
            trainer_id,
            specialties: specialties.iter().map(|s| (*s).to_string()).collect(),
            approval_status: ApprovalStatus::Approved,
            base_location: GeoPoint { lat: 12.9716, lon: 77.5946 },
            gender: None,
            active_workload: 0,
            available_time_slots: vec![],
            approved_at: Utc::now(),
        }
    }

    fn bangalore() -> GeoPoint {
        GeoPoint { lat: 12.9716, lon: 77.5946 }
    }

    fn far_away() -> GeoPoint {
        GeoPoint { lat: 28.6139, lon: 77.2090 }
    }

    #[tokio::test]
    async fn matches_the_only_eligible_candidate() {
        let trainer_id = Uuid::new_v4();
        let directory = FixtureDirectory {
            profiles: vec![profile(trainer_id, &["piano"])],
            daily_counts: Mutex::new(std::collections::HashMap::new()),
        };
        let request = SelectionRequest {
            course_category: "music",
            course_subcategory: "piano",
            student_location: bangalore(),
            student_zone: Zone::Urban,
            preferred_gender: None,
            preferred_time_slot: None,
            proposed_dates: &[NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()],
        };

        let outcome = select_trainer(&directory, &request).await.unwrap();
        assert_eq!(outcome, SelectionOutcome::Matched(trainer_id));
    }

    #[tokio::test]
    async fn rejects_a_candidate_specializing_only_in_the_broad_category() {
        let directory = FixtureDirectory {
            profiles: vec![profile(Uuid::new_v4(), &["music"])],
            daily_counts: Mutex::new(std::collections::HashMap::new()),
        };
        let request = SelectionRequest {
            course_category: "music",
            course_subcategory: "piano",
            student_location: bangalore(),
            student_zone: Zone::Urban,
            preferred_gender: None,
            preferred_time_slot: None,
            proposed_dates: &[NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()],
        };

        let outcome = select_trainer(&directory, &request).await.unwrap();
        assert_eq!(outcome, SelectionOutcome::NoEligibleTrainer);
    }

    #[tokio::test]
    async fn rejects_candidates_outside_the_feasibility_radius() {
        let mut far_profile = profile(Uuid::new_v4(), &["piano"]);
        far_profile.base_location = far_away();
        let directory = FixtureDirectory {
            profiles: vec![far_profile],
            daily_counts: Mutex::new(std::collections::HashMap::new()),
        };
        let request = SelectionRequest {
            course_category: "music",
            course_subcategory: "piano",
            student_location: bangalore(),
            student_zone: Zone::Urban,
            preferred_gender: None,
            preferred_time_slot: None,
            proposed_dates: &[NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()],
        };

        let outcome = select_trainer(&directory, &request).await.unwrap();
        assert_eq!(outcome, SelectionOutcome::NoEligibleTrainer);
    }

    #[tokio::test]
    async fn rejects_candidates_at_daily_capacity() {
        let trainer_id = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let mut counts = std::collections::HashMap::new();
        counts.insert((trainer_id, date), 8);
        let directory = FixtureDirectory {
            profiles: vec![profile(trainer_id, &["piano"])],
            daily_counts: Mutex::new(counts),
        };
        let request = SelectionRequest {
            course_category: "music",
            course_subcategory: "piano",
            student_location: bangalore(),
            student_zone: Zone::Urban,
            preferred_gender: None,
            preferred_time_slot: None,
            proposed_dates: &[date],
        };

        let outcome = select_trainer(&directory, &request).await.unwrap();
        assert_eq!(outcome, SelectionOutcome::NoEligibleTrainer);
    }

    #[tokio::test]
    async fn prefers_lower_workload_candidate_when_otherwise_tied() {
        let busy = {
            let mut p = profile(Uuid::new_v4(), &["piano"]);
            p.active_workload = 10;
            p
        };
        let light_id = Uuid::new_v4();
        let light = {
            let mut p = profile(light_id, &["piano"]);
            p.active_workload = 0;
            p
        };
        let directory = FixtureDirectory {
            profiles: vec![busy, light],
            daily_counts: Mutex::new(std::collections::HashMap::new()),
        };
        let request = SelectionRequest {
            course_category: "music",
            course_subcategory: "piano",
            student_location: bangalore(),
            student_zone: Zone::Urban,
            preferred_gender: None,
            preferred_time_slot: None,
            proposed_dates: &[NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()],
        };

        let outcome = select_trainer(&directory, &request).await.unwrap();
        assert_eq!(outcome, SelectionOutcome::Matched(light_id));
    }
}
