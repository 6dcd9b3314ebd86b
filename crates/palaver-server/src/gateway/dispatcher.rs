//! Inbound frame dispatch: parse, validate the envelope, gate on
//! authentication, validate the per-type payload, and route to a handler.

use serde::de::DeserializeOwned;
use uuid::Uuid;

use palaver_shared::frames::{
    close, code, kind, AuthErrorPayload, AuthPayload, AuthSuccessPayload, ChatReadPayload,
    ChatSendPayload, ChatTypingPayload,
};
use palaver_shared::Frame;

use crate::gateway::{chat, receipts};
use crate::services::presence;
use crate::state::AppState;

pub async fn handle_text(state: &AppState, conn_id: Uuid, text: &str) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            let frame = Frame::error(code::INVALID_MESSAGE, "Malformed JSON", None);
            state.hub.send_to_conn(conn_id, &frame).await;
            return;
        }
    };

    let frame: Frame = match serde_json::from_value(value) {
        Ok(frame) => frame,
        Err(_) => {
            let frame = Frame::error(code::INVALID_MESSAGE, "Malformed frame envelope", None);
            state.hub.send_to_conn(conn_id, &frame).await;
            return;
        }
    };
    if !frame.payload.is_object() {
        let reply = Frame::error(code::INVALID_MESSAGE, "Malformed frame envelope", Some(&frame.id));
        state.hub.send_to_conn(conn_id, &reply).await;
        return;
    }

    if frame.kind == kind::AUTH {
        let Some(payload) = parse_payload::<AuthPayload>(state, conn_id, &frame).await else {
            return;
        };
        handle_auth(state, conn_id, &frame.id, payload).await;
        return;
    }

    // Everything but `auth` requires an authenticated connection.
    let Some(user_id) = state.hub.user_id_of(conn_id).await else {
        let reply = Frame::error(code::NOT_AUTHENTICATED, "Authenticate first", Some(&frame.id));
        state.hub.send_to_conn(conn_id, &reply).await;
        return;
    };

    match frame.kind.as_str() {
        kind::CHAT_SEND => {
            let Some(payload) = parse_payload::<ChatSendPayload>(state, conn_id, &frame).await
            else {
                return;
            };
            chat::handle_send(state, conn_id, user_id, &frame.id, payload).await;
        }
        kind::CHAT_READ => {
            let Some(payload) = parse_payload::<ChatReadPayload>(state, conn_id, &frame).await
            else {
                return;
            };
            receipts::handle_read(state, user_id, payload).await;
        }
        kind::CHAT_TYPING => {
            let Some(payload) = parse_payload::<ChatTypingPayload>(state, conn_id, &frame).await
            else {
                return;
            };
            if let Err(e) = state
                .typing
                .handle(user_id, payload.conversation_id, payload.is_typing)
                .await
            {
                tracing::warn!(error = %e, "typing handler failed");
            }
        }
        other => {
            tracing::debug!(kind = %other, "unknown frame type");
            let reply = Frame::error(code::UNKNOWN_TYPE, "Unknown frame type", Some(&frame.id));
            state.hub.send_to_conn(conn_id, &reply).await;
        }
    }
}

async fn parse_payload<P: DeserializeOwned>(
    state: &AppState,
    conn_id: Uuid,
    frame: &Frame,
) -> Option<P> {
    match serde_json::from_value(frame.payload.clone()) {
        Ok(payload) => Some(payload),
        Err(_) => {
            let reply = Frame::error(code::INVALID_PAYLOAD, "Invalid payload", Some(&frame.id));
            state.hub.send_to_conn(conn_id, &reply).await;
            None
        }
    }
}

/// Verify the token, bind the connection to its user, and run the online
/// presence transition for the user's first connection.
async fn handle_auth(state: &AppState, conn_id: Uuid, frame_id: &str, payload: AuthPayload) {
    let auth = match state.tokens.verify_access(&payload.token) {
        Ok(auth) => auth,
        Err(_) => {
            let reply = Frame::reply(
                kind::AUTH_ERROR,
                &AuthErrorPayload {
                    message: "Invalid token".to_string(),
                },
                frame_id,
            );
            state.hub.send_to_conn(conn_id, &reply).await;
            state
                .hub
                .close_conn(conn_id, close::AUTH_FAILURE, "invalid token")
                .await;
            return;
        }
    };

    let was_online = state.hub.is_user_online(auth.user_id).await;
    if !state.hub.authenticate(conn_id, auth.user_id).await {
        // The socket raced away while we were verifying.
        return;
    }
    tracing::info!(conn_id = %conn_id, user_id = %auth.user_id, "connection authenticated");

    let reply = Frame::reply(
        kind::AUTH_SUCCESS,
        &AuthSuccessPayload {
            user_id: auth.user_id,
        },
        frame_id,
    );
    state.hub.send_to_conn(conn_id, &reply).await;

    // Second devices do not re-announce presence.
    if !was_online {
        if let Err(e) = presence::broadcast_online(&state.db, &state.hub, auth.user_id).await {
            tracing::warn!(error = %e, "online presence broadcast failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        attach_raw_socket, attach_socket, seed_direct, seed_user, test_state,
    };
    use axum::extract::ws::Message as WsMessage;

    fn envelope(kind: &str, payload: serde_json::Value) -> String {
        serde_json::json!({
            "id": "cli-1",
            "type": kind,
            "payload": payload,
            "timestamp": 0,
        })
        .to_string()
    }

    #[tokio::test]
    async fn malformed_json_yields_invalid_message() {
        let state = test_state().await;
        let mut socket = attach_raw_socket(&state).await;

        handle_text(&state, socket.conn_id, "{not json").await;
        let frame = socket.next_frame().await;
        assert_eq!(frame.kind, "error");
        assert_eq!(frame.payload["code"], "INVALID_MESSAGE");
    }

    #[tokio::test]
    async fn missing_envelope_fields_yield_invalid_message() {
        let state = test_state().await;
        let mut socket = attach_raw_socket(&state).await;

        handle_text(&state, socket.conn_id, r#"{"type":"auth"}"#).await;
        let frame = socket.next_frame().await;
        assert_eq!(frame.payload["code"], "INVALID_MESSAGE");
    }

    #[tokio::test]
    async fn unauthenticated_non_auth_frame_is_gated() {
        let state = test_state().await;
        let mut socket = attach_raw_socket(&state).await;

        let text = envelope("chat:typing", serde_json::json!({"conversationId": Uuid::new_v4(), "isTyping": true}));
        handle_text(&state, socket.conn_id, &text).await;
        let frame = socket.next_frame().await;
        assert_eq!(frame.payload["code"], "NOT_AUTHENTICATED");
        assert_eq!(frame.reply_to.as_deref(), Some("cli-1"));
    }

    #[tokio::test]
    async fn bad_payload_shape_yields_invalid_payload() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let mut socket = attach_socket(&state, alice.id).await;

        let text = envelope("chat:send", serde_json::json!({"content": 42}));
        handle_text(&state, socket.conn_id, &text).await;
        let frame = socket.next_frame().await;
        assert_eq!(frame.payload["code"], "INVALID_PAYLOAD");
    }

    #[tokio::test]
    async fn unknown_type_is_reported() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let mut socket = attach_socket(&state, alice.id).await;

        let text = envelope("chat:upvote", serde_json::json!({}));
        handle_text(&state, socket.conn_id, &text).await;
        let frame = socket.next_frame().await;
        assert_eq!(frame.payload["code"], "UNKNOWN_TYPE");
    }

    #[tokio::test]
    async fn valid_auth_upgrades_connection_and_announces_presence_once() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        seed_direct(&state, alice.id, bob.id).await;
        let mut bob_rx = attach_socket(&state, bob.id).await;

        let pair = state.tokens.issue(alice.id, "alice").await.unwrap();

        // First device.
        let mut ws1 = attach_raw_socket(&state).await;
        let text = envelope("auth", serde_json::json!({"token": pair.access_token}));
        handle_text(&state, ws1.conn_id, &text).await;
        let frame = ws1.next_frame().await;
        assert_eq!(frame.kind, "auth:success");
        assert_eq!(frame.payload["userId"], serde_json::json!(alice.id));
        assert!(state.hub.is_user_online(alice.id).await);

        let presence = bob_rx.next_frame().await;
        assert_eq!(presence.kind, "presence:update");
        assert_eq!(presence.payload["status"], "online");

        // Second device: no second presence broadcast.
        let mut ws2 = attach_raw_socket(&state).await;
        handle_text(&state, ws2.conn_id, &text).await;
        assert_eq!(ws2.next_frame().await.kind, "auth:success");
        assert!(bob_rx.try_next_frame().is_none());
    }

    #[tokio::test]
    async fn invalid_token_closes_with_4001() {
        let state = test_state().await;
        let mut socket = attach_raw_socket(&state).await;

        let text = envelope("auth", serde_json::json!({"token": "garbage"}));
        handle_text(&state, socket.conn_id, &text).await;

        let frame = socket.next_frame().await;
        assert_eq!(frame.kind, "auth:error");
        match socket.next_message().await {
            WsMessage::Close(Some(close_frame)) => {
                assert_eq!(close_frame.code, close::AUTH_FAILURE)
            }
            other => panic!("expected close, got {other:?}"),
        }
        assert_eq!(state.hub.connection_count().await, 0);
    }
}
