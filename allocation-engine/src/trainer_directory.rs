//! The narrow view of trainer/course/student master data the selection
//! algorithm needs, read through a trait this crate depends on but does not
//! own.
//!
//! A real deployment backs [`TrainerDirectory`] with an HTTP call to the
//! trainer service; `platform-testkit` provides an in-memory fixture for
//! tests. The *matching algorithm* is this crate's concern — the data
//! source behind trainer profiles belongs to an external collaborator.

use chrono::{DateTime, NaiveDate, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// A student or trainer's approximate home/base location.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl GeoPoint {
    /// Great-circle distance to `other`, in kilometers.
    ///
    /// Haversine formula; adequate for the sub-10km urban/medium/periphery
    /// radii the selection algorithm checks against.
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;

        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lon = (other.lon - self.lon).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_KM * c
    }
}

/// Zone classification driving the geographic-feasibility radius.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Zone {
    /// Dense urban area: 3km radius.
    Urban,
    /// Medium-density area: 4km radius.
    Medium,
    /// Sparse/periphery area: 5km radius.
    Periphery,
}

impl Zone {
    /// The configured feasibility radius for this zone, in kilometers.
    #[must_use]
    pub const fn radius_km(self) -> f64 {
        match self {
            Self::Urban => 3.0,
            Self::Medium => 4.0,
            Self::Periphery => 5.0,
        }
    }
}

/// Gender, for the soft gender-preference matching signal only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gender {
    /// Female.
    Female,
    /// Male.
    Male,
    /// Any other or unspecified gender identity.
    Other,
}

/// A trainer's approval state in the trainer service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalStatus {
    /// Eligible for allocation.
    Approved,
    /// Not yet reviewed.
    Pending,
    /// Reviewed and rejected; never eligible.
    Rejected,
}

/// A trainer profile as surfaced to the selection algorithm.
#[derive(Clone, Debug)]
pub struct TrainerProfile {
    /// The trainer's id.
    pub trainer_id: Uuid,
    /// Course categories/subcategories this trainer is qualified to teach.
    pub specialties: Vec<String>,
    /// Approval state in the trainer service.
    pub approval_status: ApprovalStatus,
    /// Base location used for the geographic-feasibility filter.
    pub base_location: GeoPoint,
    /// Self-reported gender, used only for the soft preference signal.
    pub gender: Option<Gender>,
    /// Current active workload (open allocations), used for the soft
    /// inverse-workload scoring signal.
    pub active_workload: u32,
    /// Time slots this trainer is available for, e.g. `"morning"`, `"evening"`.
    pub available_time_slots: Vec<String>,
    /// When this trainer was approved; breaks scoring ties (earliest wins).
    pub approved_at: DateTime<Utc>,
}

/// Errors surfaced by a [`TrainerDirectory`] implementation.
#[derive(Error, Debug, Clone)]
pub enum TrainerDirectoryError {
    /// The directory's backing collaborator is unavailable; retryable.
    #[error("trainer directory unavailable: {0}")]
    Unavailable(String),

    /// Any other directory failure.
    #[error("trainer directory error: {0}")]
    Other(String),
}

/// Read-only view of trainer master data needed by the selection algorithm.
///
/// # Dyn compatibility
///
/// Methods return boxed futures so the directory can be held as
/// `Arc<dyn TrainerDirectory>` inside the consumer task processing
/// `PURCHASE_CREATED` events.
pub trait TrainerDirectory: Send + Sync {
    /// Approved-or-not trainers qualified for `course_category`/
    /// `course_subcategory`; the selection algorithm applies the approval,
    /// geography, and capacity filters itself so it can explain which filter
    /// rejected a given candidate.
    ///
    /// # Errors
    ///
    /// Returns [`TrainerDirectoryError::Unavailable`] on a transient
    /// collaborator failure.
    fn candidates_for_course(
        &self,
        course_category: &str,
        course_subcategory: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TrainerProfile>, TrainerDirectoryError>> + Send + '_>>;

    /// Number of sessions already scheduled for `trainer_id` on `date`,
    /// across all allocations. Backs the day-by-day daily-capacity hard cap.
    ///
    /// # Errors
    ///
    /// Returns [`TrainerDirectoryError::Unavailable`] on a transient
    /// collaborator failure.
    fn daily_session_count(
        &self,
        trainer_id: Uuid,
        date: NaiveDate,
    ) -> Pin<Box<dyn Future<Output = Result<u32, TrainerDirectoryError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        let point = GeoPoint { lat: 12.9716, lon: 77.5946 };
        assert!(point.distance_km(&point) < f64::EPSILON);
    }

    #[test]
    fn distance_increases_with_separation() {
        let bangalore = GeoPoint { lat: 12.9716, lon: 77.5946 };
        let nearby = GeoPoint { lat: 12.98, lon: 77.60 };
        let far = GeoPoint { lat: 28.6139, lon: 77.2090 };

        let near_distance = bangalore.distance_km(&nearby);
        let far_distance = bangalore.distance_km(&far);

        assert!(near_distance < 5.0);
        assert!(far_distance > near_distance);
    }

    #[test]
    fn zone_radii_match_the_documented_schedule() {
        assert!((Zone::Urban.radius_km() - 3.0).abs() < f64::EPSILON);
        assert!((Zone::Medium.radius_km() - 4.0).abs() < f64::EPSILON);
        assert!((Zone::Periphery.radius_km() - 5.0).abs() < f64::EPSILON);
    }
}
