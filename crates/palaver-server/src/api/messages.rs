//! Message mutation endpoints (edit / delete-for-everyone / forward) plus
//! search and the unread summary. Mutations push real-time frames through the
//! hub after the store commits.

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use palaver_shared::frames::{kind, ChatDeletedPayload, ChatEditedPayload};
use palaver_shared::{ContentType, Frame};
use palaver_store::Message;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::gateway::chat::fanout_message;
use crate::state::AppState;
use crate::views::{MessageView, UnreadEntry, UnreadSummary};

const EDIT_WINDOW_MINUTES: i64 = 15;
const DELETE_WINDOW_MINUTES: i64 = 60;
const DELETED_PLACEHOLDER: &str = "This message was deleted";
const SEARCH_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardRequest {
    pub message_id: Uuid,
    pub conversation_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub q: String,
    pub conversation_id: Option<Uuid>,
}

/// Sender-only, TEXT-only, within 15 minutes of sending.
pub async fn edit(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<EditMessageRequest>,
) -> ApiResult<Json<MessageView>> {
    let content = body.content.trim();
    if content.is_empty() {
        return Err(ApiError::Validation("Content is required".to_string()));
    }

    let now = Utc::now();
    let (message, participants) = {
        let db = state.db.lock().await;
        let message = load_visible(&db, id)?;

        if message.sender_id != auth.user_id {
            return Err(ApiError::Forbidden(
                "You can only edit your own messages".to_string(),
            ));
        }
        if message.content_type != ContentType::Text {
            return Err(ApiError::Validation(
                "Only text messages can be edited".to_string(),
            ));
        }
        if now - message.created_at > Duration::minutes(EDIT_WINDOW_MINUTES) {
            return Err(ApiError::Validation(format!(
                "Messages can only be edited within {EDIT_WINDOW_MINUTES} minutes"
            )));
        }

        db.set_message_edited(id, content, now)?;
        let participants = db.participants_of(message.conversation_id)?;
        (message, participants)
    };

    let frame = Frame::server(
        kind::CHAT_EDITED,
        &ChatEditedPayload {
            message_id: message.id,
            conversation_id: message.conversation_id,
            new_content: content.to_string(),
            edited_at: now,
        },
    );
    for participant in participants {
        if participant.user_id != auth.user_id {
            state.hub.send_to_user(participant.user_id, &frame).await;
        }
    }

    let mut edited = message;
    edited.content = content.to_string();
    edited.edited_at = Some(now);
    Ok(Json(MessageView::from(&edited)))
}

/// Delete for everyone: sender-only, within 1 hour. The row becomes a
/// tombstone with a fixed placeholder, and every participant (sender
/// included) is told.
pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let now = Utc::now();
    let (message, participants) = {
        let db = state.db.lock().await;
        let message = load_visible(&db, id)?;

        if message.sender_id != auth.user_id {
            return Err(ApiError::Forbidden(
                "You can only delete your own messages".to_string(),
            ));
        }
        if now - message.created_at > Duration::minutes(DELETE_WINDOW_MINUTES) {
            return Err(ApiError::Validation(
                "Messages can only be deleted within 1 hour".to_string(),
            ));
        }

        db.tombstone_message(id, DELETED_PLACEHOLDER, now)?;
        let participants = db.participants_of(message.conversation_id)?;
        (message, participants)
    };

    let frame = Frame::server(
        kind::CHAT_DELETED,
        &ChatDeletedPayload {
            message_id: message.id,
            conversation_id: message.conversation_id,
        },
    );
    for participant in participants {
        state.hub.send_to_user(participant.user_id, &frame).await;
    }

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Copy a message into other conversations the caller participates in, with
/// the same fanout as a live send. Targets the caller cannot post to are
/// skipped.
pub async fn forward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<ForwardRequest>,
) -> ApiResult<Json<Vec<MessageView>>> {
    if body.conversation_ids.is_empty() {
        return Err(ApiError::Validation(
            "At least one target conversation is required".to_string(),
        ));
    }

    let (source, sender) = {
        let db = state.db.lock().await;
        let source = load_visible(&db, body.message_id)?;
        if !db.is_participant(source.conversation_id, auth.user_id)? {
            return Err(ApiError::Forbidden(
                "Not a participant of this conversation".to_string(),
            ));
        }
        let sender = db.get_user(auth.user_id)?;
        (source, sender)
    };

    let mut forwarded = Vec::new();
    for target in body.conversation_ids {
        let message = {
            let mut db = state.db.lock().await;
            if !db.is_participant(target, auth.user_id)? {
                continue;
            }
            let message = Message {
                id: Uuid::new_v4(),
                conversation_id: target,
                sender_id: auth.user_id,
                content: source.content.clone(),
                content_type: source.content_type,
                reply_to_id: None,
                created_at: Utc::now(),
                edited_at: None,
                deleted_at: None,
            };
            db.insert_message(&message)?;
            message
        };
        fanout_message(&state, &message, &sender, None).await;
        forwarded.push(MessageView::from(&message));
    }

    Ok(Json(forwarded))
}

pub async fn search(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<MessageView>>> {
    let needle = query.q.trim();
    if needle.is_empty() {
        return Err(ApiError::Validation("Search query is required".to_string()));
    }

    let db = state.db.lock().await;
    let hits = db.search_messages(auth.user_id, needle, query.conversation_id, SEARCH_LIMIT)?;
    Ok(Json(hits.iter().map(MessageView::from).collect()))
}

pub async fn unread_summary(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<UnreadSummary>> {
    let db = state.db.lock().await;
    let rows = db.unread_summary(auth.user_id)?;
    let conversations: Vec<UnreadEntry> = rows
        .into_iter()
        .map(|(conversation_id, unread_count)| UnreadEntry {
            conversation_id,
            unread_count,
        })
        .collect();
    let total = conversations.iter().map(|e| e.unread_count).sum();
    Ok(Json(UnreadSummary {
        conversations,
        total,
    }))
}

/// Fetch a message, treating tombstones as missing.
fn load_visible(db: &palaver_store::Database, id: Uuid) -> ApiResult<Message> {
    let message = db
        .get_message(id)
        .map_err(|_| ApiError::NotFound("Message not found".to_string()))?;
    if message.is_deleted() {
        return Err(ApiError::NotFound("Message not found".to_string()));
    }
    Ok(message)
}
