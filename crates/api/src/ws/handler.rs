use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use darkroom_core::error::CoreError;
use darkroom_core::types::DbId;

use crate::auth::jwt::validate_token;
use crate::error::AppError;
use crate::state::AppState;
use crate::ws::HubHandle;

/// Ping cadence of the write pump.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// How long the read pump waits for any inbound frame (Pongs included)
/// before declaring the peer dead. Longer than two keepalive intervals,
/// so a single lost Pong does not kill the connection.
const IDLE_TIMEOUT: Duration = Duration::from_secs(75);

/// Query parameters accepted by the WebSocket endpoint.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Optional JWT access token identifying the connection's owner.
    pub token: Option<String>,
}

/// HTTP handler that upgrades the connection to WebSocket.
///
/// The token is optional: anonymous connections are registered without an
/// owner and still receive broadcasts. A token that is present but invalid
/// is rejected with 401 rather than silently downgraded to anonymous.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let owner_id = match query.token.as_deref() {
        None => None,
        Some(token) => match validate_token(token, &state.config.jwt) {
            Ok(claims) => Some(claims.sub),
            Err(_) => {
                return AppError::Core(CoreError::Unauthorized(
                    "Invalid or expired token".into(),
                ))
                .into_response();
            }
        },
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state.hub, owner_id))
        .into_response()
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with the hub and receives its outbox.
///   2. Spawns a write pump that drains the outbox into the sink.
///   3. Runs the read pump on the current task until the peer goes away.
///   4. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, hub: HubHandle, owner_id: Option<DbId>) {
    let conn_id = Uuid::new_v4();
    tracing::info!(%conn_id, authenticated = owner_id.is_some(), "WebSocket connected");

    let mut outbox = hub.register(conn_id, owner_id).await;

    let (mut sink, mut stream) = socket.split();

    // Write pump: forward outbox messages to the sink, coalescing bursts
    // into a single flush, and ping on an interval to keep NATs and
    // proxies from dropping the connection.
    let send_task = tokio::spawn(async move {
        let start = tokio::time::Instant::now() + KEEPALIVE_INTERVAL;
        let mut keepalive = tokio::time::interval_at(start, KEEPALIVE_INTERVAL);

        'pump: loop {
            tokio::select! {
                received = outbox.recv() => {
                    let Some(first) = received else {
                        // The hub dropped this outbox: eviction or shutdown.
                        let _ = sink.send(Message::Close(None)).await;
                        break 'pump;
                    };

                    let mut batch = vec![first];
                    while let Ok(message) = outbox.try_recv() {
                        batch.push(message);
                    }

                    for message in batch {
                        let is_close = matches!(message, Message::Close(_));
                        if sink.feed(message).await.is_err() {
                            break 'pump;
                        }
                        if is_close {
                            let _ = sink.flush().await;
                            break 'pump;
                        }
                    }
                    if sink.flush().await.is_err() {
                        break 'pump;
                    }
                }
                _ = keepalive.tick() => {
                    if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                        break 'pump;
                    }
                }
            }
        }
    });

    // Read pump: consume inbound frames until close, error, or idleness.
    // Every frame re-arms the idle deadline.
    loop {
        match tokio::time::timeout(IDLE_TIMEOUT, stream.next()).await {
            Err(_) => {
                tracing::debug!(%conn_id, "Idle timeout, closing connection");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(%conn_id, error = %e, "WebSocket receive error");
                break;
            }
            Ok(Some(Ok(Message::Close(_)))) => break,
            Ok(Some(Ok(Message::Pong(_)))) => {
                tracing::trace!(%conn_id, "Pong received");
            }
            Ok(Some(Ok(_))) => {
                // Client frames carry no protocol meaning yet; receiving
                // one still counts as liveness.
            }
        }
    }

    // Clean up: remove the connection and stop the write pump.
    hub.unregister(conn_id).await;
    send_task.abort();
    tracing::info!(%conn_id, "WebSocket disconnected");
}
