//! The realtime fanout plane's WebSocket endpoint: upgrade, connection
//! lifecycle, and the journey subscription protocol described in §6.

use crate::fanout::Role;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use chrono::Duration as ChronoDuration;
use futures::{SinkExt, StreamExt};
use platform_shared_kv::{ConnectionEntry, JourneyOwnership, SubscriptionRegistry as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire frames this endpoint exchanges, per §6's WebSocket protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum WsFrame {
    /// Client → server: subscribe to a journey's location updates.
    #[serde(rename = "subscribe:journey")]
    SubscribeJourney {
        /// The journey to subscribe to.
        journey_id: String,
    },
    /// Client → server: stop receiving a journey's location updates.
    #[serde(rename = "unsubscribe:journey")]
    UnsubscribeJourney {
        /// The journey to unsubscribe from.
        journey_id: String,
    },
    /// Server → client: subscription accepted.
    #[serde(rename = "subscribe:journey:ok")]
    SubscribeJourneyOk {
        /// The journey now subscribed to.
        journey_id: String,
    },
    /// Server → client: subscription refused.
    #[serde(rename = "subscribe:journey:error")]
    SubscribeJourneyError {
        /// Why the subscription was refused.
        message: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct UpgradeQuery {
    token: Option<String>,
}

/// Connection-registry TTL applied on registration, per §4.4's default.
const CONNECTION_TTL: ChronoDuration = ChronoDuration::hours(1);

/// Handle a WebSocket upgrade request.
///
/// Resolves the bearer token from the `Authorization` header or, since
/// browser WebSocket clients cannot set custom headers on the handshake, a
/// `token` query parameter. A missing or invalid token refuses the
/// connection before upgrading; an already-full instance does the same.
pub async fn handle(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<UpgradeQuery>,
    headers: axum::http::HeaderMap,
) -> Response {
    let token = bearer_token(&headers).or(query.token);

    let Some(token) = token else {
        return axum::http::StatusCode::UNAUTHORIZED.into_response();
    };

    let identity = match state.jwt_validator.validate(&token) {
        Ok(identity) => identity,
        Err(error) => {
            tracing::debug!(%error, "websocket upgrade rejected: invalid token");
            return axum::http::StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let Some(role) = Role::parse(&identity.role) else {
        tracing::debug!(role = %identity.role, "websocket upgrade rejected: unrecognized role");
        return axum::http::StatusCode::FORBIDDEN.into_response();
    };

    let Ok(user_id) = identity.user_id.parse::<Uuid>() else {
        return axum::http::StatusCode::BAD_REQUEST.into_response();
    };

    if state.sockets.len() >= state.config.max_connections_per_instance as usize {
        tracing::warn!(instance_id = %state.config.instance_id, "per-instance connection cap reached");
        return axum::http::StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, identity.role, role))
}

fn bearer_token(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid, role_str: String, role: Role) {
    let socket_id = Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();

    state.sockets.insert(socket_id.clone(), user_id, role, tx);

    let entry = ConnectionEntry {
        user_id: user_id.to_string(),
        instance_id: state.config.instance_id.clone(),
        socket_id: socket_id.clone(),
        role: role_str,
    };
    if let Err(error) = state.subscriptions.register_connection(entry, CONNECTION_TTL).await {
        tracing::warn!(%error, "failed to register connection in the shared KV");
    }

    let forward_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => handle_client_frame(&text, &state, user_id, &socket_id).await,
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    forward_task.abort();
    state.sockets.remove(&socket_id);
    if let Err(error) =
        state.subscriptions.remove_connection(&user_id.to_string(), &state.config.instance_id, &socket_id).await
    {
        // Non-fatal per §4.4: the TTL garbage-collects stale entries.
        tracing::debug!(%error, "failed to remove connection from the shared KV");
    }
}

async fn handle_client_frame(text: &str, state: &AppState, user_id: Uuid, socket_id: &str) {
    let Ok(frame) = serde_json::from_str::<WsFrame>(text) else {
        tracing::debug!("dropping unrecognized websocket frame");
        return;
    };

    let reply = match frame {
        WsFrame::SubscribeJourney { journey_id } => {
            subscribe_journey(state, user_id, socket_id, &journey_id).await
        }
        WsFrame::UnsubscribeJourney { journey_id } => {
            state.sockets.leave_journey(&journey_id, socket_id);
            None
        }
        WsFrame::SubscribeJourneyOk { .. } | WsFrame::SubscribeJourneyError { .. } => None,
    };

    if let Some(reply) = reply {
        if let Ok(json) = serde_json::to_string(&reply) {
            state.sockets.send(socket_id, Message::Text(json));
        }
    }
}

async fn subscribe_journey(state: &AppState, user_id: Uuid, socket_id: &str, journey_id: &str) -> Option<WsFrame> {
    let owned = match state.subscriptions.journey_ownership(journey_id).await {
        Ok(ownership) => is_owner(&ownership, user_id),
        Err(_) => false,
    };

    Some(if owned {
        state.sockets.join_journey(journey_id, socket_id);
        WsFrame::SubscribeJourneyOk { journey_id: journey_id.to_string() }
    } else {
        WsFrame::SubscribeJourneyError { message: "Access denied to this journey".to_string() }
    })
}

fn is_owner(ownership: &JourneyOwnership, user_id: Uuid) -> bool {
    ownership.student_id == user_id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_journey_frame_round_trips_through_json() {
        let frame = WsFrame::SubscribeJourney { journey_id: "journey-1".to_string() };
        let json = serde_json::to_string(&frame).expect("serialize");
        assert_eq!(json, r#"{"type":"subscribe:journey","journey_id":"journey-1"}"#);

        let parsed: WsFrame = serde_json::from_str(&json).expect("deserialize");
        assert!(matches!(parsed, WsFrame::SubscribeJourney { journey_id } if journey_id == "journey-1"));
    }

    #[test]
    fn ownership_matches_only_the_journeys_student() {
        let ownership = JourneyOwnership { journey_id: "journey-1".to_string(), student_id: "student-a".to_string() };
        assert!(!is_owner(&ownership, Uuid::new_v4()));
    }
}
