//! The platform's edge: C4's realtime WebSocket fanout plane and C5's
//! reverse-proxy policy layer, composed over one `axum` router.
//!
//! # Request flow
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ CorrelationIdLayer → JwtAuthLayer →           │
//! │   RateLimitLayer → proxy::forward::proxy      │  C5: HTTP routes
//! ├──────────────────────────────────────────────┤
//! │ handlers::websocket::handle                   │  C4: WebSocket upgrade
//! │   → LocalSocketRegistry + RedisSubscription   │
//! │     Registry                                  │
//! ├──────────────────────────────────────────────┤
//! │ fanout::dispatcher::run                       │  C4: Pub/Sub → sockets
//! └──────────────────────────────────────────────┘
//! ```
//!
//! JWT pre-validation and the rate limiter live in `platform-shared-kv`,
//! shared with every other service that needs them; this crate owns only
//! the gateway-specific wiring: routing, the socket registries, and the
//! dispatch loop.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod fanout;
pub mod handlers;
pub mod middleware;
pub mod proxy;
pub mod state;

pub use config::GatewayConfig;
pub use error::AppError;
pub use extractors::{ClientIp, CorrelationId, UserAgent};
pub use middleware::{correlation_id_layer, CorrelationIdExt, CORRELATION_ID_HEADER};
pub use state::AppState;

/// Result type alias for gateway handlers.
pub type WebResult<T> = Result<T, AppError>;
