//! JWT pre-validation layer, step 2 of the proxy pipeline.
//!
//! Verifies signature and expiry against the shared secret and resolves
//! `(userId, role)`; an invalid or expired token short-circuits with 401
//! before reaching the downstream. An absent token passes through —
//! fine-grained authorization is the downstream service's job.

use crate::error::AppError;
use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use platform_shared_kv::{Identity, JwtValidator};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Layer applying [`JwtValidator`] pre-validation to every request.
#[derive(Clone)]
pub struct JwtAuthLayer {
    validator: Arc<JwtValidator>,
}

impl JwtAuthLayer {
    /// Build a layer over `validator`.
    #[must_use]
    pub const fn new(validator: Arc<JwtValidator>) -> Self {
        Self { validator }
    }
}

impl<S> Layer<S> for JwtAuthLayer {
    type Service = JwtAuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        JwtAuthMiddleware { inner, validator: Arc::clone(&self.validator) }
    }
}

/// Middleware enforcing JWT pre-validation.
#[derive(Clone)]
pub struct JwtAuthMiddleware<S> {
    inner: S,
    validator: Arc<JwtValidator>,
}

impl<S> Service<Request> for JwtAuthMiddleware<S>
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

    fn call(&mut self, mut req: Request) -> Self::Future {
        let validator = Arc::clone(&self.validator);
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let token = bearer_token(&req);

            if let Some(token) = token {
                match validator.validate(&token) {
                    Ok(identity) => {
                        req.extensions_mut().insert(identity);
                    }
                    Err(error) => {
                        let app_error: AppError = error.into();
                        return Ok(app_error.into_response());
                    }
                }
            }

            inner.call(req).await
        })
    }
}

fn bearer_token(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Read the identity a prior [`JwtAuthLayer`] pass resolved, if any.
#[must_use]
pub fn identity(req: &Request) -> Option<&Identity> {
    req.extensions().get::<Identity>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    fn token_for(secret: &str, sub: &str, role: &str, exp_offset_secs: i64) -> String {
        #[derive(serde::Serialize)]
        struct Claims {
            sub: String,
            role: String,
            exp: i64,
        }
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &Claims { sub: sub.to_string(), role: role.to_string(), exp: chrono::Utc::now().timestamp() + exp_offset_secs },
            &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("test token encodes")
    }

    #[test]
    fn bearer_token_strips_the_scheme_prefix() {
        let token = token_for("secret", "user-1", "student", 3600);
        let req = HttpRequest::builder()
            .header(axum::http::header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("valid request");

        assert_eq!(bearer_token(&req), Some(token));
    }

    #[test]
    fn bearer_token_is_none_without_the_header() {
        let req = HttpRequest::builder().body(Body::empty()).expect("valid request");
        assert_eq!(bearer_token(&req), None);
    }
}
