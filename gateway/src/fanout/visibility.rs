//! Recipient derivation and the role-based visibility filter the dispatch
//! algorithm applies to each candidate socket.

use platform_core::DomainEvent;
use std::collections::HashSet;
use uuid::Uuid;

/// Derive the set of recipient user ids from an event's own content.
///
/// Most events: `{studentId, trainerId}` (there is no separate generic
/// `userId` field on these payloads beyond `NotificationRequested`, which
/// carries its recipient directly as `user_id`). `SESSION_SUBSTITUTED`
/// additionally includes both the original and substitute trainer. Events
/// that carry neither a student nor a trainer id (`SessionsGenerated`,
/// `SessionRescheduled`, `JourneyEnded`, `PayrollRecalculated`'s... wait,
/// `PayrollRecalculated` does carry a trainer id) resolve to an empty set
/// and are dropped by the dispatcher, per the "drop empty" rule.
#[must_use]
pub fn recipients(event: &DomainEvent) -> HashSet<Uuid> {
    let mut ids = HashSet::new();
    match event {
        DomainEvent::PurchaseCreated { student_id, .. } => {
            ids.insert(*student_id);
        }
        DomainEvent::TrainerAllocated { student_id, trainer_id, .. } => {
            ids.insert(*student_id);
            if let Some(trainer_id) = trainer_id {
                ids.insert(*trainer_id);
            }
        }
        DomainEvent::NotificationRequested { user_id, .. } => {
            ids.insert(*user_id);
        }
        DomainEvent::SessionStarted { student_id, trainer_id, .. }
        | DomainEvent::SessionCompleted { student_id, trainer_id, .. } => {
            ids.insert(*student_id);
            ids.insert(*trainer_id);
        }
        DomainEvent::SessionSubstituted {
            student_id, original_trainer_id, substitute_trainer_id, ..
        } => {
            ids.insert(*student_id);
            ids.insert(*original_trainer_id);
            ids.insert(*substitute_trainer_id);
        }
        DomainEvent::PayrollRecalculated { trainer_id, .. } => {
            ids.insert(*trainer_id);
        }
        DomainEvent::JourneyLocationUpdated { trainer_id, student_id, .. } => {
            ids.insert(*trainer_id);
            ids.insert(*student_id);
        }
        DomainEvent::SessionsGenerated { .. }
        | DomainEvent::SessionRescheduled { .. }
        | DomainEvent::JourneyEnded { .. }
        | DomainEvent::CourseUpdated { .. } => {}
    }
    ids
}

/// A connected socket's authenticated identity, as resolved by the bearer
/// token on upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sees every event regardless of recipient derivation.
    Admin,
    /// Sees events where it is the student party.
    Student,
    /// Sees events where it is the trainer party (either side of a
    /// substitution).
    Trainer,
}

impl Role {
    /// Parse a JWT `role` claim into the fanout's three-way role model.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(Self::Admin),
            "student" => Some(Self::Student),
            "trainer" => Some(Self::Trainer),
            _ => None,
        }
    }
}

/// `shouldReceive(event, userId, role)`: the final per-socket visibility
/// check, applied after KV-based recipient lookup has already narrowed the
/// candidate set to sockets belonging to a derived recipient id.
#[must_use]
pub fn should_receive(event: &DomainEvent, user_id: Uuid, role: Role) -> bool {
    match role {
        Role::Admin => true,
        Role::Student => matches!(event_student_id(event), Some(id) if id == user_id),
        Role::Trainer => event_trainer_ids(event).contains(&user_id),
    }
}

fn event_student_id(event: &DomainEvent) -> Option<Uuid> {
    match event {
        DomainEvent::PurchaseCreated { student_id, .. }
        | DomainEvent::TrainerAllocated { student_id, .. }
        | DomainEvent::SessionStarted { student_id, .. }
        | DomainEvent::SessionCompleted { student_id, .. }
        | DomainEvent::SessionSubstituted { student_id, .. }
        | DomainEvent::JourneyLocationUpdated { student_id, .. } => Some(*student_id),
        _ => None,
    }
}

fn event_trainer_ids(event: &DomainEvent) -> HashSet<Uuid> {
    let mut ids = HashSet::new();
    match event {
        DomainEvent::TrainerAllocated { trainer_id: Some(id), .. } => {
            ids.insert(*id);
        }
        DomainEvent::SessionStarted { trainer_id, .. }
        | DomainEvent::SessionCompleted { trainer_id, .. }
        | DomainEvent::JourneyLocationUpdated { trainer_id, .. }
        | DomainEvent::PayrollRecalculated { trainer_id, .. } => {
            ids.insert(*trainer_id);
        }
        DomainEvent::SessionSubstituted { original_trainer_id, substitute_trainer_id, .. } => {
            ids.insert(*original_trainer_id);
            ids.insert(*substitute_trainer_id);
        }
        _ => {}
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn substitution(student_id: Uuid, original: Uuid, substitute: Uuid) -> DomainEvent {
        DomainEvent::SessionSubstituted {
            session_id: Uuid::new_v4(),
            student_id,
            original_trainer_id: original,
            substitute_trainer_id: substitute,
        }
    }

    #[test]
    fn substitution_recipients_include_both_trainers_and_the_student() {
        let student = Uuid::new_v4();
        let original = Uuid::new_v4();
        let substitute = Uuid::new_v4();
        let event = substitution(student, original, substitute);

        let ids = recipients(&event);
        assert_eq!(ids, HashSet::from([student, original, substitute]));
    }

    #[test]
    fn sessions_generated_has_no_derivable_recipients() {
        let event = DomainEvent::SessionsGenerated { allocation_id: Uuid::new_v4(), session_count: 10 };
        assert!(recipients(&event).is_empty());
    }

    #[test]
    fn admin_sees_every_event() {
        let event = DomainEvent::PayrollRecalculated { trainer_id: Uuid::new_v4(), period: "2026-07".into() };
        assert!(should_receive(&event, Uuid::new_v4(), Role::Admin));
    }

    #[test]
    fn student_only_sees_their_own_events() {
        let mine = Uuid::new_v4();
        let someone_else = Uuid::new_v4();
        let event = DomainEvent::TrainerAllocated {
            allocation_id: Uuid::new_v4(),
            student_id: mine,
            course_id: Uuid::new_v4(),
            trainer_id: None,
        };

        assert!(should_receive(&event, mine, Role::Student));
        assert!(!should_receive(&event, someone_else, Role::Student));
    }

    #[test]
    fn trainer_sees_either_side_of_a_substitution() {
        let original = Uuid::new_v4();
        let substitute = Uuid::new_v4();
        let event = substitution(Uuid::new_v4(), original, substitute);

        assert!(should_receive(&event, original, Role::Trainer));
        assert!(should_receive(&event, substitute, Role::Trainer));
        assert!(!should_receive(&event, Uuid::new_v4(), Role::Trainer));
    }
}
