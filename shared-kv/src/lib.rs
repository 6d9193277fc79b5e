//! # Platform Shared KV
//!
//! The Redis-backed pieces C4 (realtime fanout) and C5 (gateway proxy) both
//! depend on:
//!
//! - [`providers::RateLimiter`] / [`stores::RedisRateLimiter`] — sliding
//!   window rate limiting, role-aware budgets via [`config::RateLimitConfig`].
//! - [`providers::SubscriptionRegistry`] / [`stores::RedisSubscriptionRegistry`]
//!   — the connection registry backing C4's recipient resolution.
//! - [`jwt::JwtValidator`] — bearer token pre-validation shared by C5's
//!   proxy pipeline and C4's WebSocket upgrade handler.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod config;
pub mod error;
pub mod jwt;
pub mod providers;
pub mod stores;

pub use error::{KvError, Result};
pub use jwt::{Claims, Identity, JwtValidator};
pub use providers::{ConnectionEntry, JourneyOwnership, RateLimiter, SubscriptionRegistry};
pub use stores::{RedisRateLimiter, RedisSubscriptionRegistry};
