//! In-memory [`SubscriptionRegistry`] fixture.
//!
//! Grounded on `platform-shared-kv`'s `RedisSubscriptionRegistry`
//! (`stores/subscription_redis.rs`): the same connection-keyed-by-socket-id
//! plus user/instance index shape, over plain `HashMap`s instead of Redis
//! sets. TTLs are accepted but not enforced — tests needing expiry
//! semantics exercise the real Redis-backed registry instead.

use chrono::Duration;
use platform_shared_kv::{ConnectionEntry, JourneyOwnership, KvError, Result, SubscriptionRegistry};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// An in-memory [`SubscriptionRegistry`].
#[derive(Default)]
pub struct InMemorySubscriptionRegistry {
    connections: Mutex<HashMap<String, ConnectionEntry>>,
    journeys: Mutex<HashMap<String, JourneyOwnership>>,
}

impl InMemorySubscriptionRegistry {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ownership` so [`SubscriptionRegistry::journey_ownership`]
    /// resolves it, the way a session-started handler would populate the
    /// real Redis-backed registry.
    #[allow(clippy::missing_panics_doc)]
    pub fn seed_journey_ownership(&self, ownership: JourneyOwnership) {
        self.journeys.lock().unwrap().insert(ownership.journey_id.clone(), ownership);
    }
}

impl SubscriptionRegistry for InMemorySubscriptionRegistry {
    fn register_connection(
        &self,
        entry: ConnectionEntry,
        _ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.connections.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(entry.socket_id.clone(), entry);
        Box::pin(async { Ok(()) })
    }

    fn remove_connection(
        &self,
        _user_id: &str,
        _instance_id: &str,
        socket_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.connections.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(socket_id);
        Box::pin(async { Ok(()) })
    }

    fn connections_for_user(
        &self,
        user_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ConnectionEntry>>> + Send + '_>> {
        let entries: Vec<_> = self
            .connections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .filter(|entry| entry.user_id == user_id)
            .cloned()
            .collect();
        Box::pin(async move { Ok(entries) })
    }

    fn connection_count(
        &self,
        instance_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<u32>> + Send + '_>> {
        #[allow(clippy::cast_possible_truncation)]
        let count = self
            .connections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .filter(|entry| entry.instance_id == instance_id)
            .count() as u32;
        Box::pin(async move { Ok(count) })
    }

    fn journey_ownership(
        &self,
        journey_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<JourneyOwnership>> + Send + '_>> {
        let found = self.journeys.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(journey_id).cloned();
        Box::pin(async move { found.ok_or(KvError::NotFound) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(socket_id: &str, user_id: &str, instance_id: &str) -> ConnectionEntry {
        ConnectionEntry {
            user_id: user_id.to_string(),
            instance_id: instance_id.to_string(),
            socket_id: socket_id.to_string(),
            role: "student".to_string(),
        }
    }

    #[tokio::test]
    async fn registers_and_removes_a_connection() {
        let registry = InMemorySubscriptionRegistry::new();
        registry.register_connection(entry("sock-1", "user-a", "gw-1"), Duration::hours(1)).await.expect("register");

        assert_eq!(registry.connections_for_user("user-a").await.expect("lookup").len(), 1);
        assert_eq!(registry.connection_count("gw-1").await.expect("count"), 1);

        registry.remove_connection("user-a", "gw-1", "sock-1").await.expect("remove");
        assert!(registry.connections_for_user("user-a").await.expect("lookup").is_empty());
    }

    #[tokio::test]
    async fn journey_ownership_is_not_found_until_seeded() {
        let registry = InMemorySubscriptionRegistry::new();
        assert!(matches!(registry.journey_ownership("journey-1").await, Err(KvError::NotFound)));

        registry.seed_journey_ownership(JourneyOwnership {
            journey_id: "journey-1".to_string(),
            student_id: "student-a".to_string(),
        });
        let found = registry.journey_ownership("journey-1").await.expect("found");
        assert_eq!(found.student_id, "student-a");
    }
}
