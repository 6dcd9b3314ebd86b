//! The JSON frame protocol spoken over the WebSocket.
//!
//! Every frame, in both directions, is an envelope
//! `{id, type, payload, timestamp}`; server-to-client frames may additionally
//! carry `replyTo` naming the client frame being answered. Payloads are typed
//! per frame kind and serialized as camelCase JSON objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Client-to-server frame kinds.
pub mod kind {
    pub const AUTH: &str = "auth";
    pub const CHAT_SEND: &str = "chat:send";
    pub const CHAT_READ: &str = "chat:read";
    pub const CHAT_TYPING: &str = "chat:typing";

    pub const AUTH_SUCCESS: &str = "auth:success";
    pub const AUTH_ERROR: &str = "auth:error";
    pub const CHAT_SENT: &str = "chat:sent";
    pub const CHAT_RECEIVE: &str = "chat:receive";
    pub const CHAT_DELIVERED: &str = "chat:delivered";
    pub const CHAT_EDITED: &str = "chat:edited";
    pub const CHAT_DELETED: &str = "chat:deleted";
    pub const PRESENCE_UPDATE: &str = "presence:update";
    pub const ERROR: &str = "error";
}

/// Error codes carried in `error` frames.
pub mod code {
    pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";
    pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";
    pub const NOT_AUTHENTICATED: &str = "NOT_AUTHENTICATED";
    pub const UNKNOWN_TYPE: &str = "UNKNOWN_TYPE";
    pub const SEND_FAILED: &str = "SEND_FAILED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
}

/// WebSocket application close codes.
pub mod close {
    /// Server is shutting down.
    pub const GOING_AWAY: u16 = 1001;
    /// Authentication timed out or the presented token was invalid.
    pub const AUTH_FAILURE: u16 = 4001;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(rename = "replyTo", skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl Frame {
    /// Build a server-originated frame with a fresh id and the current time.
    pub fn server<P: Serialize>(kind: &str, payload: &P) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
            timestamp: Utc::now().timestamp_millis(),
            reply_to: None,
        }
    }

    /// Like [`Frame::server`] but answering a specific client frame.
    pub fn reply<P: Serialize>(kind: &str, payload: &P, reply_to: &str) -> Self {
        let mut frame = Self::server(kind, payload);
        frame.reply_to = Some(reply_to.to_string());
        frame
    }

    pub fn error(code: &str, message: &str, reply_to: Option<&str>) -> Self {
        let mut frame = Self::server(
            kind::ERROR,
            &ErrorPayload {
                code: code.to_string(),
                message: message.to_string(),
            },
        );
        frame.reply_to = reply_to.map(str::to_string);
        frame
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

// ─── Client payloads ───

#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendPayload {
    pub conversation_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub reply_to_message_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReadPayload {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTypingPayload {
    pub conversation_id: Uuid,
    pub is_typing: bool,
}

// ─── Server payloads ───

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSuccessPayload {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthErrorPayload {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSentPayload {
    pub client_message_id: String,
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPreview {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReceivePayload {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub conversation_id: Uuid,
    pub content: String,
    pub content_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyPreview>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDeliveredPayload {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReadNoticePayload {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub read_by: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTypingNoticePayload {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub is_typing: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEditedPayload {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub new_content: String,
    pub edited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDeletedPayload {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdatePayload {
    pub user_id: Uuid,
    pub status: PresenceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trip() {
        let frame = Frame::reply(
            kind::CHAT_SENT,
            &ChatSentPayload {
                client_message_id: "m1".into(),
                message_id: Uuid::new_v4(),
                timestamp: Utc::now(),
            },
            "m1",
        );
        let json = frame.to_json();
        let parsed: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind, "chat:sent");
        assert_eq!(parsed.reply_to.as_deref(), Some("m1"));
        assert_eq!(parsed.payload["clientMessageId"], "m1");
    }

    #[test]
    fn client_send_payload_accepts_optional_fields() {
        let conv = Uuid::new_v4();
        let payload: ChatSendPayload = serde_json::from_value(serde_json::json!({
            "conversationId": conv,
            "content": "hi",
        }))
        .unwrap();
        assert_eq!(payload.conversation_id, conv);
        assert!(payload.content_type.is_none());
        assert!(payload.reply_to_message_id.is_none());
    }

    #[test]
    fn error_frame_carries_code_and_reply_to() {
        let frame = Frame::error(code::INVALID_PAYLOAD, "bad payload", Some("abc"));
        assert_eq!(frame.kind, "error");
        assert_eq!(frame.payload["code"], "INVALID_PAYLOAD");
        assert_eq!(frame.reply_to.as_deref(), Some("abc"));
    }

    #[test]
    fn presence_offline_includes_last_seen() {
        let frame = Frame::server(
            kind::PRESENCE_UPDATE,
            &PresenceUpdatePayload {
                user_id: Uuid::new_v4(),
                status: PresenceStatus::Offline,
                last_seen: Some(Utc::now()),
            },
        );
        assert_eq!(frame.payload["status"], "offline");
        assert!(frame.payload.get("lastSeen").is_some());
    }
}
