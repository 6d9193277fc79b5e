//! Redis-backed connection registry for C4's realtime fanout plane.
//!
//! Key layout, mirroring the session store's primary-key-plus-user-index
//! shape, and matching the two registry keys the platform names explicitly
//! (`ws:connection:{socketId}`, `ws:user:{userId}`):
//!
//! - `ws:connection:{socketId}` → JSON [`ConnectionEntry`], TTL'd.
//! - `ws:user:{userId}` (Set) → `socketId` members, one per live connection
//!   for that user.
//! - `ws:instance:{instanceId}` (Set) → same `socketId` members, scoped by
//!   instance; backs the per-instance connection cap.
//! - `ws:journey:{journeyId}` → JSON [`JourneyOwnership`], written by
//!   whatever service owns journey creation; read-only from this registry's
//!   side.

use crate::error::{KvError, Result};
use crate::providers::{ConnectionEntry, JourneyOwnership, SubscriptionRegistry};
use chrono::Duration;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::future::Future;
use std::pin::Pin;

/// `Redis`-backed [`SubscriptionRegistry`].
#[derive(Clone)]
pub struct RedisSubscriptionRegistry {
    conn_manager: ConnectionManager,
}

impl RedisSubscriptionRegistry {
    /// Create a new registry over `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::StoreUnavailable`] if connecting to `Redis` fails.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| KvError::StoreUnavailable(format!("redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| KvError::StoreUnavailable(format!("redis connection manager: {e}")))?;
        Ok(Self { conn_manager })
    }

    fn connection_key(socket_id: &str) -> String {
        format!("ws:connection:{socket_id}")
    }

    fn user_index_key(user_id: &str) -> String {
        format!("ws:user:{user_id}")
    }

    fn instance_index_key(instance_id: &str) -> String {
        format!("ws:instance:{instance_id}")
    }

    fn journey_key(journey_id: &str) -> String {
        format!("ws:journey:{journey_id}")
    }
}

impl SubscriptionRegistry for RedisSubscriptionRegistry {
    fn register_connection(
        &self,
        entry: ConnectionEntry,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let conn_key = Self::connection_key(&entry.socket_id);
            let user_key = Self::user_index_key(&entry.user_id);
            let instance_key = Self::instance_index_key(&entry.instance_id);
            let ttl_secs = ttl.num_seconds().max(1);

            let payload = serde_json::to_string(&entry)
                .map_err(|e| KvError::Other(format!("serialize connection entry: {e}")))?;

            redis::pipe()
                .atomic()
                .set_ex(&conn_key, payload, u64::try_from(ttl_secs).unwrap_or(u64::MAX))
                .ignore()
                .sadd(&user_key, &entry.socket_id)
                .ignore()
                .sadd(&instance_key, &entry.socket_id)
                .ignore()
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| KvError::StoreUnavailable(format!("register connection: {e}")))?;

            Ok(())
        })
    }

    fn remove_connection(
        &self,
        user_id: &str,
        instance_id: &str,
        socket_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let user_id = user_id.to_string();
        let instance_id = instance_id.to_string();
        let socket_id = socket_id.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let conn_key = Self::connection_key(&socket_id);
            let user_key = Self::user_index_key(&user_id);
            let instance_key = Self::instance_index_key(&instance_id);

            redis::pipe()
                .atomic()
                .del(&conn_key)
                .ignore()
                .srem(&user_key, &socket_id)
                .ignore()
                .srem(&instance_key, &socket_id)
                .ignore()
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| KvError::StoreUnavailable(format!("remove connection: {e}")))?;

            Ok(())
        })
    }

    fn connections_for_user(
        &self,
        user_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ConnectionEntry>>> + Send + '_>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let user_key = Self::user_index_key(&user_id);

            let socket_ids: Vec<String> = conn
                .smembers(&user_key)
                .await
                .map_err(|e| KvError::StoreUnavailable(format!("list user connections: {e}")))?;

            let mut entries = Vec::with_capacity(socket_ids.len());
            for socket_id in socket_ids {
                let conn_key = Self::connection_key(&socket_id);
                let payload: Option<String> = conn
                    .get(&conn_key)
                    .await
                    .map_err(|e| KvError::StoreUnavailable(format!("fetch connection: {e}")))?;
                // The index can briefly outlive an expired connection key;
                // callers already tolerate stale entries per the TTL contract.
                if let Some(payload) = payload {
                    if let Ok(entry) = serde_json::from_str::<ConnectionEntry>(&payload) {
                        entries.push(entry);
                    }
                }
            }

            Ok(entries)
        })
    }

    fn connection_count(
        &self,
        instance_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<u32>> + Send + '_>> {
        let instance_id = instance_id.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let instance_key = Self::instance_index_key(&instance_id);
            let count: u64 = conn
                .scard(&instance_key)
                .await
                .map_err(|e| KvError::StoreUnavailable(format!("connection count: {e}")))?;
            #[allow(clippy::cast_possible_truncation)]
            Ok(count as u32)
        })
    }

    fn journey_ownership(
        &self,
        journey_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<JourneyOwnership>> + Send + '_>> {
        let journey_id = journey_id.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let key = Self::journey_key(&journey_id);
            let payload: Option<String> = conn
                .get(&key)
                .await
                .map_err(|e| KvError::StoreUnavailable(format!("fetch journey ownership: {e}")))?;
            let payload = payload.ok_or(KvError::NotFound)?;
            serde_json::from_str(&payload)
                .map_err(|e| KvError::Other(format!("deserialize journey ownership: {e}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn registers_and_removes_a_connection() {
        let registry = RedisSubscriptionRegistry::new("redis://127.0.0.1:6379").await.unwrap();
        let user_id = format!("user-{}", uuid::Uuid::new_v4());
        let entry = ConnectionEntry {
            user_id: user_id.clone(),
            instance_id: "gw-test".to_string(),
            socket_id: "sock-1".to_string(),
            role: "student".to_string(),
        };

        registry.register_connection(entry.clone(), Duration::seconds(60)).await.unwrap();
        let found = registry.connections_for_user(&user_id).await.unwrap();
        assert_eq!(found, vec![entry]);

        registry.remove_connection(&user_id, "gw-test", "sock-1").await.unwrap();
        let found = registry.connections_for_user(&user_id).await.unwrap();
        assert!(found.is_empty());
    }
}
