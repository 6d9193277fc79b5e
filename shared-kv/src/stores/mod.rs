//! Redis-backed implementations of the shared-KV traits.

pub mod rate_limiter_redis;
pub mod subscription_redis;

pub use rate_limiter_redis::RedisRateLimiter;
pub use subscription_redis::RedisSubscriptionRegistry;
