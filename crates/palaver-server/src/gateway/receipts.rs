//! Bulk read receipts: opening a conversation marks everything up to the
//! target message as READ and tells each original sender.

use chrono::Utc;
use uuid::Uuid;

use palaver_shared::frames::{kind, ChatReadNoticePayload, ChatReadPayload};
use palaver_shared::Frame;

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn handle_read(state: &AppState, reader_id: Uuid, payload: ChatReadPayload) {
    if let Err(e) = read_inner(state, reader_id, payload).await {
        // Read receipts are best-effort; nothing goes back to the client.
        tracing::warn!(error = %e, "chat:read failed");
    }
}

async fn read_inner(state: &AppState, reader_id: Uuid, payload: ChatReadPayload) -> ApiResult<()> {
    let now = Utc::now();
    let conversation_id = payload.conversation_id;

    let pending = {
        let db = state.db.lock().await;

        // Advance the read cursor first; a no-op for non-participants.
        db.set_last_read(conversation_id, reader_id, now)?;

        // Unknown target or one from another conversation: silently done.
        let target = match db.get_message(payload.message_id) {
            Ok(m) if m.conversation_id == conversation_id => m,
            _ => return Ok(()),
        };

        let pending = db.messages_pending_read(conversation_id, reader_id, target.created_at)?;
        for message in &pending {
            db.upsert_read_receipt(message.id, reader_id, now)?;
        }
        pending
    };

    // Notify each original sender, oldest message first.
    for message in pending {
        let frame = Frame::server(
            kind::CHAT_READ,
            &ChatReadNoticePayload {
                message_id: message.id,
                conversation_id,
                read_by: reader_id,
            },
        );
        state.hub.send_to_user(message.sender_id, &frame).await;
    }
    Ok(())
}
