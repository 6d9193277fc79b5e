//! In-process socket registry for this gateway instance.
//!
//! Per §4.4's Rust realization note, this is deliberately the teacher's
//! plain `Arc<Mutex<HashMap<...>>>` concurrency idiom rather than a
//! lock-free map crate: one instance's local socket set is small (bounded
//! by `WS_MAX_CONNECTIONS_PER_INSTANCE`) and short-lived, so a coarse lock
//! is the simplest correct thing.

use crate::fanout::visibility::Role;
use axum::extract::ws::Message;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

struct LocalSocket {
    user_id: Uuid,
    role: Role,
    sender: UnboundedSender<Message>,
}

/// The set of WebSocket connections this gateway instance is currently
/// serving, keyed by socket id.
pub struct LocalSocketRegistry {
    sockets: Mutex<HashMap<String, LocalSocket>>,
    /// Journey rooms: journey id to the set of local socket ids subscribed
    /// to its location updates. Separate from `sockets` since membership
    /// changes independently of connection lifecycle (a socket can join
    /// and leave several journeys across its lifetime).
    journeys: Mutex<HashMap<String, std::collections::HashSet<String>>>,
}

impl LocalSocketRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { sockets: Mutex::new(HashMap::new()), journeys: Mutex::new(HashMap::new()) }
    }

    /// Register a newly upgraded socket. Returns the current local
    /// connection count, for the caller to compare against the cap.
    pub fn insert(&self, socket_id: String, user_id: Uuid, role: Role, sender: UnboundedSender<Message>) -> usize {
        let mut sockets = self.sockets.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        sockets.insert(socket_id, LocalSocket { user_id, role, sender });
        sockets.len()
    }

    /// Remove a socket on disconnect, dropping it from every journey room
    /// it had joined.
    pub fn remove(&self, socket_id: &str) {
        let mut sockets = self.sockets.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        sockets.remove(socket_id);
        drop(sockets);
        let mut journeys = self.journeys.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        journeys.retain(|_, members| {
            members.remove(socket_id);
            !members.is_empty()
        });
    }

    /// Join `socket_id` to `journey_id`'s room, so it receives that
    /// journey's `journey:location`/`journey:ended` frames.
    pub fn join_journey(&self, journey_id: &str, socket_id: &str) {
        let mut journeys = self.journeys.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        journeys.entry(journey_id.to_string()).or_default().insert(socket_id.to_string());
    }

    /// Remove `socket_id` from `journey_id`'s room.
    pub fn leave_journey(&self, journey_id: &str, socket_id: &str) {
        let mut journeys = self.journeys.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(members) = journeys.get_mut(journey_id) {
            members.remove(socket_id);
            if members.is_empty() {
                journeys.remove(journey_id);
            }
        }
    }

    /// Send a pre-serialized frame to every local socket subscribed to
    /// `journey_id`. Unlike `for_user`/`for_admins`, the message is the
    /// same for every member, so the caller passes it once.
    pub fn for_journey(&self, journey_id: &str, message: &Message) {
        let journeys = self.journeys.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(members) = journeys.get(journey_id) else { return };
        let sockets = self.sockets.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for socket_id in members {
            if let Some(socket) = sockets.get(socket_id) {
                let _ = socket.sender.send(message.clone());
            }
        }
    }

    /// Current local connection count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sockets.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// `true` if no sockets are currently registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send a pre-serialized frame to one local socket. Returns `false` if
    /// the socket is unknown or its channel is closed; callers log and
    /// continue per the dispatch algorithm's "emit fails, log and continue".
    pub fn send(&self, socket_id: &str, message: Message) -> bool {
        let sockets = self.sockets.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        sockets.get(socket_id).is_some_and(|socket| socket.sender.send(message).is_ok())
    }

    /// Visit every local socket belonging to `user_id`, applying `f` and
    /// sending the message it returns (if any) to each.
    pub fn for_user(&self, user_id: Uuid, mut f: impl FnMut(Role) -> Option<Message>) {
        let sockets = self.sockets.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for socket in sockets.values().filter(|s| s.user_id == user_id) {
            if let Some(message) = f(socket.role) {
                let _ = socket.sender.send(message);
            }
        }
    }

    /// Visit every local admin socket unconditionally — admins see all,
    /// independent of the event's own derived recipient set.
    pub fn for_admins(&self, mut f: impl FnMut() -> Option<Message>) {
        let sockets = self.sockets.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for socket in sockets.values().filter(|s| s.role == Role::Admin) {
            if let Some(message) = f() {
                let _ = socket.sender.send(message);
            }
        }
    }
}

impl Default for LocalSocketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_the_running_connection_count() {
        let registry = LocalSocketRegistry::new();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        assert_eq!(registry.insert("sock-1".to_string(), Uuid::new_v4(), Role::Student, tx), 1);
    }

    #[test]
    fn remove_drops_the_socket() {
        let registry = LocalSocketRegistry::new();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        registry.insert("sock-1".to_string(), Uuid::new_v4(), Role::Student, tx);
        registry.remove("sock-1");
        assert!(registry.is_empty());
    }

    #[test]
    fn for_user_only_visits_that_users_sockets() {
        let registry = LocalSocketRegistry::new();
        let target = Uuid::new_v4();
        let (tx_a, mut rx_a) = tokio::sync::mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = tokio::sync::mpsc::unbounded_channel();
        registry.insert("sock-a".to_string(), target, Role::Student, tx_a);
        registry.insert("sock-b".to_string(), Uuid::new_v4(), Role::Student, tx_b);

        registry.for_user(target, |_role| Some(Message::Text("hi".into())));

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn for_journey_delivers_only_to_joined_members() {
        let registry = LocalSocketRegistry::new();
        let (tx_a, mut rx_a) = tokio::sync::mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = tokio::sync::mpsc::unbounded_channel();
        registry.insert("sock-a".to_string(), Uuid::new_v4(), Role::Student, tx_a);
        registry.insert("sock-b".to_string(), Uuid::new_v4(), Role::Student, tx_b);
        registry.join_journey("journey-1", "sock-a");

        registry.for_journey("journey-1", &Message::Text("loc".into()));

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn leave_journey_stops_further_delivery() {
        let registry = LocalSocketRegistry::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        registry.insert("sock-a".to_string(), Uuid::new_v4(), Role::Student, tx);
        registry.join_journey("journey-1", "sock-a");
        registry.leave_journey("journey-1", "sock-a");

        registry.for_journey("journey-1", &Message::Text("loc".into()));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn removing_a_socket_drops_its_journey_memberships() {
        let registry = LocalSocketRegistry::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        registry.insert("sock-a".to_string(), Uuid::new_v4(), Role::Student, tx);
        registry.join_journey("journey-1", "sock-a");
        registry.remove("sock-a");

        registry.for_journey("journey-1", &Message::Text("loc".into()));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn for_admins_visits_only_admin_sockets() {
        let registry = LocalSocketRegistry::new();
        let (tx_admin, mut rx_admin) = tokio::sync::mpsc::unbounded_channel();
        let (tx_student, mut rx_student) = tokio::sync::mpsc::unbounded_channel();
        registry.insert("sock-admin".to_string(), Uuid::new_v4(), Role::Admin, tx_admin);
        registry.insert("sock-student".to_string(), Uuid::new_v4(), Role::Student, tx_student);

        registry.for_admins(|| Some(Message::Text("broadcast".into())));

        assert!(rx_admin.try_recv().is_ok());
        assert!(rx_student.try_recv().is_err());
    }
}
