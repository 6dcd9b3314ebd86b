//! Shared fixtures for the server tests: an in-memory app state, seeded
//! users/conversations, and fake hub sockets backed by plain channels.

use std::path::PathBuf;

use axum::extract::ws::Message as WsMessage;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use palaver_shared::Frame;
use palaver_store::{Database, User};

use crate::config::{Environment, ServerConfig};
use crate::state::AppState;

pub(crate) async fn test_state() -> AppState {
    let config = ServerConfig {
        port: 0,
        database_path: PathBuf::from(":memory:"),
        jwt_secret: "test-secret".to_string(),
        environment: Environment::Development,
    };
    let database = Database::open_in_memory().expect("in-memory database");
    AppState::new(config, database)
}

pub(crate) async fn seed_user(state: &AppState, username: &str) -> User {
    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password_hash: "$2b$12$abcdefghijklmnopqrstuv".to_string(),
        display_name: username.to_string(),
        avatar_url: None,
        bio: None,
        is_online: false,
        last_seen: None,
        created_at: Utc::now(),
    };
    state.db.lock().await.create_user(&user).unwrap();
    user
}

pub(crate) async fn seed_direct(state: &AppState, a: Uuid, b: Uuid) -> Uuid {
    state
        .db
        .lock()
        .await
        .create_direct(a, b, Utc::now())
        .unwrap()
        .id
}

pub(crate) async fn seed_message(
    state: &AppState,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: &str,
) -> Uuid {
    let message = palaver_store::Message {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id,
        content: content.to_string(),
        content_type: palaver_shared::ContentType::Text,
        reply_to_id: None,
        created_at: Utc::now(),
        edited_at: None,
        deleted_at: None,
    };
    state.db.lock().await.insert_message(&message).unwrap();
    message.id
}

/// A hub connection backed by a plain channel instead of a real socket.
pub(crate) struct TestSocket {
    pub conn_id: Uuid,
    rx: mpsc::UnboundedReceiver<WsMessage>,
}

impl TestSocket {
    pub async fn next_message(&mut self) -> WsMessage {
        self.rx.recv().await.expect("socket channel closed")
    }

    /// Await the next text frame, skipping protocol messages.
    pub async fn next_frame(&mut self) -> Frame {
        loop {
            if let WsMessage::Text(text) = self.next_message().await {
                return serde_json::from_str(text.as_str()).expect("valid frame");
            }
        }
    }

    /// Non-blocking: the next already-queued text frame, if any.
    pub fn try_next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.rx.try_recv() {
                Ok(WsMessage::Text(text)) => {
                    return Some(serde_json::from_str(text.as_str()).expect("valid frame"))
                }
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Register an unauthenticated hub connection.
pub(crate) async fn attach_raw_socket(state: &AppState) -> TestSocket {
    let conn_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    state.hub.add(conn_id, tx).await;
    TestSocket { conn_id, rx }
}

/// Register a hub connection already authenticated as `user_id`.
pub(crate) async fn attach_socket(state: &AppState, user_id: Uuid) -> TestSocket {
    let socket = attach_raw_socket(state).await;
    state.hub.authenticate(socket.conn_id, user_id).await;
    socket
}
