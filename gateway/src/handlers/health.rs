//! Health check endpoints for load balancers and orchestrators.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use platform_shared_kv::RateLimiter as _;
use serde::Serialize;

/// Liveness: the process is up and serving requests. Does not touch Redis.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// One dependency's reachability, as reported by `/health/ready`.
#[derive(Debug, Serialize)]
struct ComponentHealth {
    component: &'static str,
    healthy: bool,
}

/// Readiness response: overall status plus the component breakdown.
#[derive(Debug, Serialize)]
struct ReadinessReport {
    status: &'static str,
    components: Vec<ComponentHealth>,
}

/// Readiness: are this instance's Redis-backed dependencies reachable.
///
/// Checks both the rate limiter's and the subscription registry's
/// connections with a cheap round-trip each, rather than assuming the
/// connection manager's last-known state still holds.
///
/// # Endpoint
///
/// ```text
/// GET /health/ready
/// ```
///
/// # Status codes
///
/// - 200 OK: every component reachable
/// - 503 Service Unavailable: at least one component unreachable
pub async fn health_check_ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessReport>) {
    let rate_limiter_healthy = state.rate_limiter.get_attempts("health-check").await.is_ok();
    let subscriptions_healthy = state.subscriptions.connection_count(&state.config.instance_id).await.is_ok();

    let components = vec![
        ComponentHealth { component: "rate_limiter", healthy: rate_limiter_healthy },
        ComponentHealth { component: "subscription_registry", healthy: subscriptions_healthy },
    ];
    let all_healthy = rate_limiter_healthy && subscriptions_healthy;

    let status = if all_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let report = ReadinessReport { status: if all_healthy { "healthy" } else { "degraded" }, components };

    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn liveness_always_reports_ok() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
