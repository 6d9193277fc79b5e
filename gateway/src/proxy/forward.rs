//! Step 4 of the proxy pipeline: resolve the downstream target and stream
//! the request through without buffering.

use crate::config::RouteTable;
use crate::error::AppError;
use crate::middleware::{CorrelationIdExt, CORRELATION_ID_HEADER};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Duration;

/// Shared state the fallback proxy handler needs.
#[derive(Clone)]
pub struct ProxyState {
    /// The routing table resolving path prefixes to downstream targets.
    pub routes: Arc<RouteTable>,
    /// HTTP client used to stream requests to downstream services.
    pub client: reqwest::Client,
    /// Read timeout applied to each proxied request.
    pub read_timeout: Duration,
}

impl ProxyState {
    /// Build proxy state with a client configured for streaming bodies and
    /// bounded by `read_timeout`.
    #[must_use]
    pub fn new(routes: Arc<RouteTable>, read_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(read_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { routes, client, read_timeout }
    }
}

/// The catch-all fallback handler: proxies any request not served by a
/// local route to its resolved downstream target.
///
/// # Errors
///
/// Returns [`AppError::bad_request`] when no route matches, and maps
/// connect/timeout failures per §4.5's failure semantics.
pub async fn proxy(State(state): State<ProxyState>, req: Request) -> Result<Response, AppError> {
    let path = req.uri().path().to_string();
    let route = state
        .routes
        .resolve(&path)
        .ok_or_else(|| AppError::bad_request(format!("no route for path {path}")))?
        .clone();

    let target_url = format!("{}{}", route.target, req.uri().path_and_query().map_or("", |pq| pq.as_str()));
    let method = req.method().clone();
    let correlation_id = req.try_correlation_id();
    let mut headers = req.headers().clone();
    apply_correlation_id(&mut headers, correlation_id);
    let body_bytes = axum::body::to_bytes(req.into_body(), usize::MAX)
        .await
        .map_err(|e| AppError::bad_request(format!("failed to read request body: {e}")))?;

    let upstream = build_upstream_request(&state.client, &method, &target_url, &headers, body_bytes);

    match upstream.send().await {
        Ok(response) => map_upstream_response(response).await,
        Err(error) if error.is_timeout() => Err(AppError::request_timeout("downstream request timed out")),
        Err(error) => {
            tracing::warn!(%error, target = %target_url, "downstream connect failed");
            Err(AppError::service_unavailable("downstream service unavailable"))
        }
    }
}

/// Overwrite `headers`' correlation id header with `correlation_id`, so a
/// gateway-generated id (or one read from the inbound request) is carried
/// onto the proxied request rather than silently dropped.
fn apply_correlation_id(headers: &mut HeaderMap, correlation_id: Option<uuid::Uuid>) {
    let Some(correlation_id) = correlation_id else { return };
    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        headers.insert(CORRELATION_ID_HEADER, value);
    }
}

fn build_upstream_request(
    client: &reqwest::Client,
    method: &Method,
    url: &str,
    headers: &HeaderMap,
    body: axum::body::Bytes,
) -> reqwest::RequestBuilder {
    let reqwest_method =
        reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET);
    let mut builder = client.request(reqwest_method, url).body(body);
    for (name, value) in headers {
        if name == axum::http::header::HOST {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            builder = builder.header(name, value);
        }
    }
    builder
}

async fn map_upstream_response(response: reqwest::Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_server_error() {
        return Err(AppError::service_unavailable(format!("upstream returned {status}")));
    }

    let status = axum::http::StatusCode::from_u16(status.as_u16())
        .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    let headers = response.headers().clone();
    let body = response.bytes().await.map_err(|e| AppError::service_unavailable(e.to_string()))?;

    let mut builder = Response::builder().status(status);
    for (name, value) in &headers {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(body)).map_or_else(|_| Err(AppError::internal("failed to build proxy response")), |r| Ok(r.into_response()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteTable;

    #[test]
    fn proxy_state_builds_a_client_with_the_configured_timeout() {
        let routes = Arc::new(RouteTable::default());
        let state = ProxyState::new(routes, Duration::from_secs(55));
        assert_eq!(state.read_timeout, Duration::from_secs(55));
    }

    #[test]
    fn apply_correlation_id_overwrites_the_outgoing_header() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_ID_HEADER, HeaderValue::from_static("stale"));
        let id = uuid::Uuid::new_v4();

        apply_correlation_id(&mut headers, Some(id));

        assert_eq!(headers.get(CORRELATION_ID_HEADER).unwrap(), &id.to_string());
    }

    #[test]
    fn apply_correlation_id_is_a_no_op_when_absent() {
        let mut headers = HeaderMap::new();
        apply_correlation_id(&mut headers, None);
        assert!(headers.get(CORRELATION_ID_HEADER).is_none());
    }
}
