//! Conversation-level operations: direct get-or-create, listing with unread
//! accounting, and cursor-paginated history.

use uuid::Uuid;

use chrono::Utc;
use palaver_store::{Conversation, Database, Message};

use crate::error::{ApiError, ApiResult};
use crate::state::Db;
use crate::views::{ConversationView, MessagePage, MessageView, ParticipantView};

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Find the DIRECT conversation between two users or create it. Idempotent:
/// repeated calls (from either side) return the same conversation.
///
/// Returns the view plus whether a new conversation was created.
pub async fn get_or_create_direct(
    db: &Db,
    me: Uuid,
    other: Uuid,
) -> ApiResult<(ConversationView, bool)> {
    if me == other {
        return Err(ApiError::Validation(
            "Cannot start a conversation with yourself".to_string(),
        ));
    }

    let mut db = db.lock().await;

    if let Some(existing) = db.find_direct_between(me, other)? {
        let view = conversation_view(&db, &existing, me)?;
        return Ok((view, false));
    }

    // The other user must exist before we create anything.
    db.get_user(other)
        .map_err(|_| ApiError::NotFound("User not found".to_string()))?;

    if db.is_blocked_between(me, other)? {
        return Err(ApiError::Forbidden(
            "Cannot start a conversation with this user".to_string(),
        ));
    }

    let conversation = db.create_direct(me, other, Utc::now())?;
    let view = conversation_view(&db, &conversation, me)?;
    Ok((view, true))
}

/// All conversations of a user, most recently active first, each with its
/// participant list, last message, and the caller's unread count.
pub async fn list_for_user(db: &Db, me: Uuid) -> ApiResult<Vec<ConversationView>> {
    let db = db.lock().await;
    let conversations = db.list_user_conversations(me)?;
    let mut views = Vec::with_capacity(conversations.len());
    for conversation in &conversations {
        views.push(conversation_view(&db, conversation, me)?);
    }
    Ok(views)
}

/// A single conversation, participants-only.
pub async fn get_for_user(db: &Db, conversation_id: Uuid, me: Uuid) -> ApiResult<ConversationView> {
    let db = db.lock().await;
    let conversation = db
        .get_conversation(conversation_id)
        .map_err(|_| ApiError::NotFound("Conversation not found".to_string()))?;
    require_participant(&db, conversation_id, me)?;
    conversation_view(&db, &conversation, me)
}

/// Cursor-paginated history, oldest-first within the page.
///
/// Fetches `limit + 1` rows newest-first to learn whether an older page
/// exists without a second COUNT query, then returns the page in
/// chronological order. `next_cursor` is the id of the oldest returned
/// message when more history remains.
pub async fn get_messages(
    db: &Db,
    conversation_id: Uuid,
    me: Uuid,
    cursor: Option<Uuid>,
    limit: u32,
) -> ApiResult<MessagePage> {
    let limit = limit.clamp(1, MAX_PAGE_LIMIT);

    let db = db.lock().await;
    db.get_conversation(conversation_id)
        .map_err(|_| ApiError::NotFound("Conversation not found".to_string()))?;
    require_participant(&db, conversation_id, me)?;

    let cursor_row = match cursor {
        Some(cursor_id) => {
            let row = db
                .get_message(cursor_id)
                .map_err(|_| ApiError::Validation("Invalid cursor".to_string()))?;
            if row.conversation_id != conversation_id {
                return Err(ApiError::Validation("Invalid cursor".to_string()));
            }
            Some(row)
        }
        None => None,
    };

    let mut rows = db.messages_page(conversation_id, cursor_row.as_ref(), limit + 1)?;
    let has_more = rows.len() as u32 > limit;
    if has_more {
        rows.pop();
    }

    // Newest-first from the store; the client wants chronological.
    rows.reverse();
    let next_cursor = if has_more {
        rows.first().map(|m: &Message| m.id)
    } else {
        None
    };

    Ok(MessagePage {
        messages: rows.iter().map(MessageView::from).collect(),
        next_cursor,
        has_more,
    })
}

/// FORBIDDEN unless `user_id` participates in the conversation.
pub fn require_participant(db: &Database, conversation_id: Uuid, user_id: Uuid) -> ApiResult<()> {
    if db.is_participant(conversation_id, user_id)? {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Not a participant of this conversation".to_string(),
        ))
    }
}

pub(crate) fn conversation_view(
    db: &Database,
    conversation: &Conversation,
    me: Uuid,
) -> ApiResult<ConversationView> {
    let participants = db.participants_of(conversation.id)?;
    let mut participant_views = Vec::with_capacity(participants.len());
    for participant in &participants {
        let user = db.get_user(participant.user_id)?;
        participant_views.push(ParticipantView::new(participant, &user));
    }

    let last_message = db.last_message(conversation.id)?;
    let unread_count = db.unread_count(conversation.id, me)?;

    Ok(ConversationView {
        id: conversation.id,
        kind: conversation.kind,
        created_at: conversation.created_at,
        updated_at: conversation.updated_at,
        participants: participant_views,
        last_message: last_message.as_ref().map(MessageView::from),
        unread_count,
    })
}
