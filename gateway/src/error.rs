//! Gateway error envelope.
//!
//! Bridges proxy-pipeline and fanout failures to HTTP responses, implementing
//! Axum's `IntoResponse` so any layer can return `Result<_, AppError>`
//! directly. The response body follows the wire contract every
//! gateway-originated failure uses: `{success: false, message, code}`.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use std::fmt;

/// Application error type for gateway handlers and proxy layers.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: String,
    retry_after: Option<std::time::Duration>,
    #[allow(dead_code)]
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new gateway error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self { status, message: message.into(), code: code.into(), retry_after: None, source: None }
    }

    /// Attach a source error, logged but never exposed to the client.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 401: missing, malformed, expired, or tampered bearer token.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, "UNAUTHORIZED")
    }

    /// 429: rate limit exceeded. `retry_after` becomes the `Retry-After` header.
    #[must_use]
    pub fn too_many_requests(message: impl Into<String>, retry_after: std::time::Duration) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message, "TOO_MANY_REQUESTS")
            .with_retry_after(retry_after)
    }

    /// 502: downstream DNS/connect failure or upstream 5xx.
    #[must_use]
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message, "SERVICE_UNAVAILABLE")
    }

    /// 504: proxy read timeout exceeded.
    #[must_use]
    pub fn request_timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, message, "REQUEST_TIMEOUT")
    }

    /// 400: malformed request, e.g. an unroutable path or bad upgrade request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }

    /// 500: anything the gateway itself couldn't recover from.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_SERVER_ERROR")
    }

    fn with_retry_after(mut self, retry_after: std::time::Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
    code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = %self.code,
                message = %self.message,
                error = self.source.as_ref().map(ToString::to_string),
                "gateway request failed"
            );
        }

        let retry_after = self.retry_after;
        let body = ErrorResponse { success: false, message: self.message, code: self.code };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(retry_after) = retry_after {
            if let Ok(value) =
                axum::http::HeaderValue::from_str(&retry_after.as_secs().to_string())
            {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("an internal error occurred").with_source(err)
    }
}

impl From<platform_shared_kv::KvError> for AppError {
    fn from(err: platform_shared_kv::KvError) -> Self {
        match err {
            platform_shared_kv::KvError::TooManyAttempts { retry_after } => {
                Self::too_many_requests("rate limit exceeded", retry_after)
            }
            platform_shared_kv::KvError::InvalidToken(reason) => Self::unauthorized(reason),
            platform_shared_kv::KvError::StoreUnavailable(reason) => {
                Self::service_unavailable(reason)
            }
            platform_shared_kv::KvError::NotFound => Self::bad_request("not found"),
            platform_shared_kv::KvError::Other(reason) => Self::internal(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let err = AppError::bad_request("invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] invalid input");
    }

    #[test]
    fn too_many_requests_carries_retry_after() {
        let err = AppError::too_many_requests("slow down", std::time::Duration::from_secs(30));
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.retry_after, Some(std::time::Duration::from_secs(30)));
    }

    #[test]
    fn kv_error_maps_invalid_token_to_unauthorized() {
        let err: AppError = platform_shared_kv::KvError::InvalidToken("expired".to_string()).into();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.code, "UNAUTHORIZED");
    }
}
