//! Real-time side of the server: the WebSocket endpoint, the connection hub,
//! and the frame handlers.

pub mod chat;
pub mod dispatcher;
pub mod hub;
pub mod receipts;
pub mod typing;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use palaver_shared::frames::{close, kind, AuthErrorPayload};
use palaver_shared::Frame;

use crate::services::presence;
use crate::state::AppState;

/// HTTP -> WebSocket upgrade on the shared listener.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let conn_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    state.hub.add(conn_id, tx).await;
    tracing::debug!(conn_id = %conn_id, "websocket connected");

    let (mut sink, mut stream) = socket.split();

    // Writer task: drains the connection's queue. A queued Close frame ends
    // the task after it is flushed.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let is_close = matches!(message, WsMessage::Close(_));
            if sink.send(message).await.is_err() {
                break;
            }
            if is_close {
                break;
            }
        }
    });

    // The client has 5 seconds to present a valid auth frame.
    let timer = spawn_auth_timer(&state, conn_id);
    state.hub.set_auth_timer(conn_id, timer).await;

    // Handlers run sequentially per connection, so ACK order follows
    // persistence order for a single socket.
    while let Some(Ok(message)) = stream.next().await {
        match message {
            WsMessage::Text(text) => dispatcher::handle_text(&state, conn_id, text.as_str()).await,
            WsMessage::Pong(_) => state.hub.mark_alive(conn_id).await,
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    disconnect(&state, conn_id).await;
    // The hub entry is gone, so the queue sender is dropped and the writer
    // drains whatever is left and exits.
    let _ = writer.await;
    tracing::debug!(conn_id = %conn_id, "websocket closed");
}

/// Arm the auth-handshake deadline: unauthenticated connections get an
/// `auth:error` frame and close 4001 when it fires. Cancelled by the hub on
/// successful authentication.
fn spawn_auth_timer(state: &AppState, conn_id: Uuid) -> JoinHandle<()> {
    let state = state.clone();
    tokio::spawn(async move {
        tokio::time::sleep(hub::AUTH_TIMEOUT).await;
        if !state.hub.is_authenticated(conn_id).await {
            tracing::debug!(conn_id = %conn_id, "authentication timeout");
            let frame = Frame::server(
                kind::AUTH_ERROR,
                &AuthErrorPayload {
                    message: "Authentication timeout".to_string(),
                },
            );
            state.hub.send_to_conn(conn_id, &frame).await;
            state
                .hub
                .close_conn(conn_id, close::AUTH_FAILURE, "authentication timeout")
                .await;
        }
    })
}

/// Remove a connection and, when it was the user's last one, run the offline
/// presence transition.
async fn disconnect(state: &AppState, conn_id: Uuid) {
    let Some(user_id) = state.hub.remove(conn_id).await else {
        return;
    };
    if !state.hub.is_user_online(user_id).await {
        if let Err(e) = presence::broadcast_offline(&state.db, &state.hub, user_id).await {
            tracing::warn!(error = %e, user_id = %user_id, "offline presence broadcast failed");
        }
    }
}

/// Liveness ticker: ping every connection each interval, terminate those
/// that missed a pong, and run offline transitions for users they belonged
/// to.
pub fn spawn_heartbeat(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(hub::HEARTBEAT_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let detached = state.hub.sweep().await;
            for user_id in detached {
                if !state.hub.is_user_online(user_id).await {
                    if let Err(e) =
                        presence::broadcast_offline(&state.db, &state.hub, user_id).await
                    {
                        tracing::warn!(error = %e, "offline broadcast after heartbeat kill failed");
                    }
                }
            }
        }
    })
}
