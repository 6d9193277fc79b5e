//! Traits for the shared-KV layer's two external dependencies: a
//! sliding-window rate limiter and the realtime connection registry.
//!
//! Both are interfaces, not implementations — `platform-testkit` provides
//! in-memory fixtures for tests; `platform-gateway` wires the `stores`
//! module's Redis-backed implementations in production.

pub mod rate_limiter;
pub mod subscription_registry;

pub use rate_limiter::RateLimiter;
pub use subscription_registry::{ConnectionEntry, JourneyOwnership, SubscriptionRegistry};
