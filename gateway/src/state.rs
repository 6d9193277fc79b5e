//! Application state shared across the gateway's HTTP, WebSocket, and proxy
//! handlers.

use crate::config::GatewayConfig;
use crate::fanout::LocalSocketRegistry;
use platform_shared_kv::config::RateLimitConfig;
use platform_shared_kv::{JwtValidator, RedisRateLimiter, SubscriptionRegistry};
use std::sync::Arc;

/// Shared gateway state: the shared-KV clients, the local socket registry,
/// and the process configuration, all wrapped once at startup behind
/// `Arc` so every handler clones cheaply.
#[derive(Clone)]
pub struct AppState {
    /// Process configuration read at startup.
    pub config: Arc<GatewayConfig>,
    /// Bearer token pre-validator, shared by the WebSocket upgrade handler
    /// and the proxy's auth layer.
    pub jwt_validator: Arc<JwtValidator>,
    /// Role-aware rate limiter backing the proxy's rate-limit layer.
    pub rate_limiter: Arc<RedisRateLimiter>,
    /// Role-aware rate-limit budgets.
    pub rate_limits: RateLimitConfig,
    /// Shared connection registry (C4), used for registration, the
    /// per-instance cap, and journey-ownership checks. Held as `Arc<dyn
    /// SubscriptionRegistry>` rather than the concrete Redis type, matching
    /// how the rest of the platform holds its Redis-backed collaborators.
    pub subscriptions: Arc<dyn SubscriptionRegistry>,
    /// This instance's local socket set.
    pub sockets: Arc<LocalSocketRegistry>,
}

impl AppState {
    /// Assemble application state from its already-constructed
    /// collaborators. Connecting to Redis is async and fallible, so it
    /// happens in the binary entrypoint before this constructor runs.
    #[must_use]
    pub fn new(
        config: Arc<GatewayConfig>,
        rate_limiter: Arc<RedisRateLimiter>,
        subscriptions: Arc<dyn SubscriptionRegistry>,
    ) -> Self {
        let jwt_validator = Arc::new(JwtValidator::new(&config.jwt_secret));
        let rate_limits = RateLimitConfig::from_env();
        Self {
            config,
            jwt_validator,
            rate_limiter,
            rate_limits,
            subscriptions,
            sockets: Arc::new(LocalSocketRegistry::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_with_an_empty_local_socket_set() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AppState>();
    }
}
