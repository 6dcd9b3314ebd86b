//! The `chat:send` pipeline: persist, ACK the sender, fan out to recipients,
//! and record delivery receipts for everyone who was reachable.

use chrono::Utc;
use uuid::Uuid;

use palaver_shared::frames::{
    code, kind, ChatDeliveredPayload, ChatReceivePayload, ChatSendPayload, ChatSentPayload,
    ReplyPreview,
};
use palaver_shared::{ContentType, Frame};
use palaver_store::{Message, User};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn handle_send(
    state: &AppState,
    conn_id: Uuid,
    sender_id: Uuid,
    client_frame_id: &str,
    payload: ChatSendPayload,
) {
    if let Err(e) = send_inner(state, conn_id, sender_id, client_frame_id, payload).await {
        let ws_code = match &e {
            ApiError::NotFound(_) => code::NOT_FOUND,
            ApiError::Validation(_) => code::INVALID_PAYLOAD,
            _ => code::SEND_FAILED,
        };
        let frame = Frame::error(ws_code, &e.to_string(), Some(client_frame_id));
        state.hub.send_to_conn(conn_id, &frame).await;
    }
}

async fn send_inner(
    state: &AppState,
    conn_id: Uuid,
    sender_id: Uuid,
    client_frame_id: &str,
    payload: ChatSendPayload,
) -> ApiResult<()> {
    let conversation_id = payload.conversation_id;

    let content_type = match payload.content_type.as_deref() {
        None => ContentType::Text,
        Some(raw) => ContentType::parse_client(raw)
            .map_err(|_| ApiError::Validation(format!("Invalid content type: {raw}")))?,
    };

    // Persist first; fanout is best-effort afterwards.
    let (message, sender, reply_preview) = {
        let mut db = state.db.lock().await;

        if !db.is_participant(conversation_id, sender_id)? {
            return Err(ApiError::Forbidden(
                "Not a participant of this conversation".to_string(),
            ));
        }

        let reply_preview = match payload.reply_to_message_id {
            Some(reply_id) => {
                let target = db
                    .get_message(reply_id)
                    .map_err(|_| ApiError::NotFound("Reply target not found".to_string()))?;
                if target.conversation_id != conversation_id {
                    return Err(ApiError::NotFound("Reply target not found".to_string()));
                }
                Some(ReplyPreview {
                    message_id: target.id,
                    sender_id: target.sender_id,
                    content: target.content,
                })
            }
            None => None,
        };

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content: payload.content,
            content_type,
            reply_to_id: reply_preview.as_ref().map(|r| r.message_id),
            created_at: Utc::now(),
            edited_at: None,
            deleted_at: None,
        };
        db.insert_message(&message)?;
        let sender = db.get_user(sender_id)?;
        (message, sender, reply_preview)
    };

    // ACK so the client can reconcile its optimistic message.
    let ack = Frame::reply(
        kind::CHAT_SENT,
        &ChatSentPayload {
            client_message_id: client_frame_id.to_string(),
            message_id: message.id,
            timestamp: message.created_at,
        },
        client_frame_id,
    );
    state.hub.send_to_conn(conn_id, &ack).await;

    fanout_message(state, &message, &sender, reply_preview).await;
    Ok(())
}

/// Deliver a persisted message to every participant except the sender and
/// record DELIVERED receipts for those who were reachable. Per-recipient
/// failures never fail the send.
pub async fn fanout_message(
    state: &AppState,
    message: &Message,
    sender: &User,
    reply_preview: Option<ReplyPreview>,
) {
    let participants = {
        let db = state.db.lock().await;
        match db.participants_of(message.conversation_id) {
            Ok(participants) => participants,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load participants for fanout");
                return;
            }
        }
    };

    let receive = Frame::server(
        kind::CHAT_RECEIVE,
        &ChatReceivePayload {
            message_id: message.id,
            sender_id: sender.id,
            sender_name: sender.display_name.clone(),
            conversation_id: message.conversation_id,
            content: message.content.clone(),
            content_type: message.content_type.as_str().to_string(),
            timestamp: message.created_at,
            reply_to: reply_preview,
        },
    );

    for participant in participants {
        if participant.user_id == sender.id {
            continue;
        }
        let delivered = state.hub.send_to_user(participant.user_id, &receive).await;
        if !delivered {
            continue;
        }

        // Receipt upsert never downgrades a READ and never fails the send.
        {
            let db = state.db.lock().await;
            if let Err(e) =
                db.upsert_delivered_receipt(message.id, participant.user_id, Utc::now())
            {
                tracing::warn!(error = %e, "failed to record delivery receipt");
                continue;
            }
        }

        let delivered_frame = Frame::server(
            kind::CHAT_DELIVERED,
            &ChatDeliveredPayload {
                message_id: message.id,
                conversation_id: message.conversation_id,
            },
        );
        state.hub.send_to_user(sender.id, &delivered_frame).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{attach_socket, seed_direct, seed_user, test_state};
    use palaver_shared::ReceiptStatus;

    #[tokio::test]
    async fn send_acks_fans_out_and_records_delivery() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        let conv = seed_direct(&state, alice.id, bob.id).await;

        let mut alice_rx = attach_socket(&state, alice.id).await;
        let mut bob_rx = attach_socket(&state, bob.id).await;

        handle_send(
            &state,
            alice_rx.conn_id,
            alice.id,
            "m1",
            ChatSendPayload {
                conversation_id: conv,
                content: "hi".to_string(),
                content_type: None,
                reply_to_message_id: None,
            },
        )
        .await;

        let ack = alice_rx.next_frame().await;
        assert_eq!(ack.kind, "chat:sent");
        assert_eq!(ack.reply_to.as_deref(), Some("m1"));
        assert_eq!(ack.payload["clientMessageId"], "m1");
        let message_id: Uuid =
            serde_json::from_value(ack.payload["messageId"].clone()).unwrap();

        let received = bob_rx.next_frame().await;
        assert_eq!(received.kind, "chat:receive");
        assert_eq!(received.payload["content"], "hi");
        assert_eq!(received.payload["contentType"], "TEXT");
        assert_eq!(received.payload["senderName"], "alice");

        let delivered = alice_rx.next_frame().await;
        assert_eq!(delivered.kind, "chat:delivered");
        assert_eq!(
            delivered.payload["conversationId"],
            serde_json::json!(conv)
        );

        let db = state.db.lock().await;
        let receipt = db.get_receipt(message_id, bob.id).unwrap().unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Delivered);
    }

    #[tokio::test]
    async fn offline_recipient_means_no_receipt_and_no_delivered_frame() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        let conv = seed_direct(&state, alice.id, bob.id).await;

        let mut alice_rx = attach_socket(&state, alice.id).await;

        handle_send(
            &state,
            alice_rx.conn_id,
            alice.id,
            "m1",
            ChatSendPayload {
                conversation_id: conv,
                content: "anyone home?".to_string(),
                content_type: None,
                reply_to_message_id: None,
            },
        )
        .await;

        let ack = alice_rx.next_frame().await;
        assert_eq!(ack.kind, "chat:sent");
        assert!(alice_rx.try_next_frame().is_none());
    }

    #[tokio::test]
    async fn non_participant_send_is_rejected_with_typed_error() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        let mallory = seed_user(&state, "mallory").await;
        let conv = seed_direct(&state, alice.id, bob.id).await;

        let mut mallory_rx = attach_socket(&state, mallory.id).await;
        handle_send(
            &state,
            mallory_rx.conn_id,
            mallory.id,
            "m1",
            ChatSendPayload {
                conversation_id: conv,
                content: "let me in".to_string(),
                content_type: None,
                reply_to_message_id: None,
            },
        )
        .await;

        let error = mallory_rx.next_frame().await;
        assert_eq!(error.kind, "error");
        assert_eq!(error.payload["code"], "SEND_FAILED");
        assert_eq!(error.reply_to.as_deref(), Some("m1"));

        let db = state.db.lock().await;
        assert!(db.messages_page(conv, None, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn reply_must_reference_same_conversation() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        let carol = seed_user(&state, "carol").await;
        let conv_ab = seed_direct(&state, alice.id, bob.id).await;
        let conv_ac = seed_direct(&state, alice.id, carol.id).await;
        let foreign = crate::testutil::seed_message(&state, conv_ac, alice.id, "elsewhere").await;

        let mut alice_rx = attach_socket(&state, alice.id).await;
        handle_send(
            &state,
            alice_rx.conn_id,
            alice.id,
            "m1",
            ChatSendPayload {
                conversation_id: conv_ab,
                content: "re: that".to_string(),
                content_type: None,
                reply_to_message_id: Some(foreign),
            },
        )
        .await;

        let error = alice_rx.next_frame().await;
        assert_eq!(error.payload["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn content_type_is_uppercased_and_validated() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        let conv = seed_direct(&state, alice.id, bob.id).await;

        let mut alice_rx = attach_socket(&state, alice.id).await;
        handle_send(
            &state,
            alice_rx.conn_id,
            alice.id,
            "m1",
            ChatSendPayload {
                conversation_id: conv,
                content: "cat.png".to_string(),
                content_type: Some("image".to_string()),
                reply_to_message_id: None,
            },
        )
        .await;
        let ack = alice_rx.next_frame().await;
        assert_eq!(ack.kind, "chat:sent");

        let stored = {
            let db = state.db.lock().await;
            db.messages_page(conv, None, 10).unwrap().remove(0)
        };
        assert_eq!(stored.content_type, ContentType::Image);

        handle_send(
            &state,
            alice_rx.conn_id,
            alice.id,
            "m2",
            ChatSendPayload {
                conversation_id: conv,
                content: "x".to_string(),
                content_type: Some("sticker".to_string()),
                reply_to_message_id: None,
            },
        )
        .await;
        let error = alice_rx.next_frame().await;
        assert_eq!(error.kind, "error");
        assert_eq!(error.payload["code"], "INVALID_PAYLOAD");
    }
}
