//! The gateway proxy and policy layer (C5): JWT pre-validation, role-aware
//! rate limiting, and the streaming reverse proxy, composed as
//! `tower::Layer`s over an `axum` fallback route.

pub mod auth_layer;
pub mod forward;
pub mod rate_limit_layer;

pub use auth_layer::{identity, JwtAuthLayer};
pub use forward::{proxy, ProxyState};
pub use rate_limit_layer::{Budget, RateLimitLayer};
