//! Connection registry trait backing C4's realtime fanout plane.
//!
//! Entries are written by the gateway instance that owns the socket and read
//! by the dispatcher resolving recipients for an inbound event. TTL is the
//! sole reclamation mechanism: a failed `remove_connection` on disconnect is
//! non-fatal, per the connection lifecycle contract.

use crate::error::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// One registered WebSocket connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEntry {
    /// The authenticated user owning this socket.
    pub user_id: String,
    /// Gateway instance id that owns the socket, e.g. `"gw-3"`.
    pub instance_id: String,
    /// Socket id, unique within its owning instance.
    pub socket_id: String,
    /// The user's role, consulted by the dispatcher's visibility filter.
    pub role: String,
}

/// A journey room a socket has subscribed to beyond its implicit per-user
/// delivery, and the ownership record used to authorize the subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyOwnership {
    /// The journey id the room is scoped to.
    pub journey_id: String,
    /// The student who owns the journey; only this user may subscribe.
    pub student_id: String,
}

/// Shared-KV registry of live WebSocket connections and journey-room
/// ownership, consulted by the fanout dispatcher on every inbound event.
///
/// # Dyn compatibility
///
/// Methods return boxed futures so the registry can be held as
/// `Arc<dyn SubscriptionRegistry>` across the gateway's dispatcher and
/// connection-handler tasks.
pub trait SubscriptionRegistry: Send + Sync {
    /// Register a socket under `entry.user_id`, with `ttl` (default 1h per
    /// the connection lifecycle contract).
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::KvError::StoreUnavailable`] on a transient
    /// Redis failure.
    fn register_connection(
        &self,
        entry: ConnectionEntry,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Remove a socket's registry entry on disconnect. Callers must treat
    /// failure here as non-fatal; the TTL reclaims orphaned entries.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::KvError::StoreUnavailable`] on a transient
    /// Redis failure.
    fn remove_connection(
        &self,
        user_id: &str,
        instance_id: &str,
        socket_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// All live connections registered for `user_id`, across every gateway
    /// instance. The dispatcher filters this to entries whose
    /// `instance_id` matches its own before looking up local sockets.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::KvError::StoreUnavailable`] on a transient
    /// Redis failure.
    fn connections_for_user(
        &self,
        user_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ConnectionEntry>>> + Send + '_>>;

    /// Current connection count for `instance_id`, checked against the
    /// per-instance connection cap before accepting a new upgrade.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::KvError::StoreUnavailable`] on a transient
    /// Redis failure.
    fn connection_count(
        &self,
        instance_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<u32>> + Send + '_>>;

    /// Look up the ownership record for `journey_id`, used to authorize a
    /// `journey:{journeyId}` room subscription.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::KvError::NotFound`] if no such journey is
    /// registered, or [`crate::error::KvError::StoreUnavailable`] on a
    /// transient Redis failure.
    fn journey_ownership(
        &self,
        journey_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<JourneyOwnership>> + Send + '_>>;
}
