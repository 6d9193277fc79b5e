//! Session-schedule generation for a purchase tier.

use chrono::{Datelike, NaiveDate, Weekday};
use platform_core::SessionType;

/// Delivery mode requested for an allocation, carried in the purchase
/// event's `metadata` hints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Every session online.
    Online,
    /// Every session in person.
    Offline,
    /// Mixed online/offline; tier 30 enforces an exact 18/12 split.
    Hybrid,
}

/// One planned session: its date and delivery type, in generation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlannedSession {
    /// Calendar date, skipping Sundays.
    pub scheduled_date: NaiveDate,
    /// Online or offline.
    pub session_type: SessionType,
}

/// Generate `tier` consecutive daily sessions starting at `start`, skipping
/// Sundays.
///
/// For `DeliveryMode::Hybrid` with `tier = 30`, the first 6 sessions are
/// online (fixed time, non-bookable) and the remainder alternate
/// online/offline until exactly 18 online and 12 offline sessions have been
/// allocated, per the purchased-tier schedule. For any other
/// tier/hybrid combination there is no named split in the source
/// specification; this falls back to a plain online/offline alternation
/// starting online, so the mode still produces a mixed schedule rather than
/// silently degrading to all-online.
#[must_use]
pub fn generate_sessions(tier: u32, start: NaiveDate, mode: DeliveryMode) -> Vec<PlannedSession> {
    let mut sessions = Vec::with_capacity(tier as usize);
    let mut date = start;
    let mut online_count = 0u32;
    let mut offline_count = 0u32;

    while sessions.len() < tier as usize {
        if date.weekday() != Weekday::Sun {
            let session_type = next_session_type(tier, mode, sessions.len(), online_count, offline_count);
            match session_type {
                SessionType::Online => online_count += 1,
                SessionType::Offline => offline_count += 1,
            }
            sessions.push(PlannedSession { scheduled_date: date, session_type });
        }
        date = date.succ_opt().expect("date arithmetic does not overflow within a purchase's schedule");
    }

    sessions
}

fn next_session_type(
    tier: u32,
    mode: DeliveryMode,
    index: usize,
    online_count: u32,
    offline_count: u32,
) -> SessionType {
    match mode {
        DeliveryMode::Online => SessionType::Online,
        DeliveryMode::Offline => SessionType::Offline,
        DeliveryMode::Hybrid if tier == 30 => {
            if index < 6 {
                SessionType::Online
            } else if online_count >= 18 {
                SessionType::Offline
            } else if offline_count >= 12 {
                SessionType::Online
            } else if index % 2 == 0 {
                SessionType::Online
            } else {
                SessionType::Offline
            }
        }
        DeliveryMode::Hybrid => {
            if index % 2 == 0 {
                SessionType::Online
            } else {
                SessionType::Offline
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_tier_count_sessions_skipping_sundays() {
        // 2026-08-02 is a Sunday.
        let start = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let sessions = generate_sessions(10, start, DeliveryMode::Online);

        assert_eq!(sessions.len(), 10);
        assert!(sessions.iter().all(|s| s.scheduled_date.weekday() != Weekday::Sun));
        assert!(sessions.iter().all(|s| s.session_type == SessionType::Online));
    }

    #[test]
    fn tier_30_hybrid_splits_exactly_18_online_12_offline() {
        let start = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let sessions = generate_sessions(30, start, DeliveryMode::Hybrid);

        assert_eq!(sessions.len(), 30);
        let online = sessions.iter().filter(|s| s.session_type == SessionType::Online).count();
        let offline = sessions.iter().filter(|s| s.session_type == SessionType::Offline).count();
        assert_eq!(online, 18);
        assert_eq!(offline, 12);

        // First 6 sessions are online per the fixed-time, non-bookable rule.
        assert!(sessions.iter().take(6).all(|s| s.session_type == SessionType::Online));
    }

    #[test]
    fn dates_are_strictly_increasing_and_never_sunday() {
        let start = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let sessions = generate_sessions(20, start, DeliveryMode::Offline);

        for window in sessions.windows(2) {
            assert!(window[1].scheduled_date > window[0].scheduled_date);
        }
        assert!(sessions.iter().all(|s| s.scheduled_date.weekday() != Weekday::Sun));
    }
}
