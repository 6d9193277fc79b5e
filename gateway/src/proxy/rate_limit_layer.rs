//! Role-aware rate-limit layer, step 3 of the proxy pipeline.
//!
//! Keyed by `(userId, role)` when the JWT layer resolved an identity, or by
//! client IP for anonymous requests. Budgets are role-specific; auth
//! endpoints get the stricter `otp`/`auth` budget regardless of the
//! caller's resolved role, since the budget that matters is the one for
//! the route being hit, not the caller's identity.

use crate::error::AppError;
use crate::proxy::auth_layer::identity;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use platform_shared_kv::config::RateLimitConfig;
use platform_shared_kv::RedisRateLimiter as RateLimiterImpl;
use std::net::IpAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Budget selection for a given request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// Stricter budget for auth/OTP-style endpoints.
    Auth,
    /// The caller's own role budget (student/trainer/admin).
    RoleBased,
}

/// Layer enforcing a sliding-window budget before the request reaches the
/// downstream proxy.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiterImpl>,
    config: RateLimitConfig,
    budget: Budget,
}

impl RateLimitLayer {
    /// Build a layer over `limiter`, selecting `budget` for every request
    /// this layer instance guards.
    #[must_use]
    pub const fn new(limiter: Arc<RateLimiterImpl>, config: RateLimitConfig, budget: Budget) -> Self {
        Self { limiter, config, budget }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            limiter: Arc::clone(&self.limiter),
            config: self.config,
            budget: self.budget,
        }
    }
}

/// Middleware enforcing the configured rate-limit budget.
#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    limiter: Arc<RateLimiterImpl>,
    config: RateLimitConfig,
    budget: Budget,
}

impl<S> Service<Request> for RateLimitMiddleware<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let limiter = Arc::clone(&self.limiter);
        let config = self.config;
        let budget = self.budget;
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let (key, limit) = rate_limit_key_and_budget(&req, config, budget);

            if let Err(error) = limiter.check_and_record(&key, limit.max_attempts, limit.window).await {
                let app_error: AppError = error.into();
                return Ok(app_error.into_response());
            }

            inner.call(req).await
        })
    }
}

fn rate_limit_key_and_budget(
    req: &Request,
    config: RateLimitConfig,
    budget: Budget,
) -> (String, platform_shared_kv::config::RateLimitBudget) {
    if budget == Budget::Auth {
        let key = format!("auth:{}", client_ip(req));
        return (key, config.auth);
    }

    match identity(req) {
        Some(identity) => {
            let limit = match identity.role.as_str() {
                "trainer" => config.trainer,
                "admin" => config.admin,
                _ => config.student,
            };
            (format!("{}:{}", identity.role, identity.user_id), limit)
        }
        None => (format!("ip:{}", client_ip(req)), config.student),
    }
}

fn client_ip(req: &Request) -> IpAddr {
    req.headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}
