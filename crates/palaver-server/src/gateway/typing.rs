//! Ephemeral typing indicators. Nothing here touches persistent storage:
//! the only state is a `(user, conversation) -> timer` map, and every armed
//! timer auto-clears the indicator after five seconds of silence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use palaver_shared::frames::{kind, ChatTypingNoticePayload};
use palaver_shared::Frame;

use crate::error::ApiResult;
use crate::gateway::hub::Hub;
use crate::state::Db;

pub const TYPING_TTL: Duration = Duration::from_secs(5);

pub struct TypingTracker {
    db: Db,
    hub: Arc<Hub>,
    timers: Mutex<HashMap<(Uuid, Uuid), JoinHandle<()>>>,
}

impl TypingTracker {
    pub fn new(db: Db, hub: Arc<Hub>) -> Self {
        Self {
            db,
            hub,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Rebroadcast a typing indicator and (re)arm the auto-clear timer.
    /// Indicators from non-participants are dropped.
    pub async fn handle(
        self: &Arc<Self>,
        user_id: Uuid,
        conversation_id: Uuid,
        is_typing: bool,
    ) -> ApiResult<()> {
        {
            let db = self.db.lock().await;
            if !db.is_participant(conversation_id, user_id)? {
                return Ok(());
            }
        }

        self.broadcast(user_id, conversation_id, is_typing).await?;

        let key = (user_id, conversation_id);
        let mut timers = self.timers.lock().await;
        if let Some(previous) = timers.remove(&key) {
            previous.abort();
        }
        if is_typing {
            let tracker = Arc::clone(self);
            timers.insert(
                key,
                tokio::spawn(async move {
                    tokio::time::sleep(TYPING_TTL).await;
                    tracker.expire(user_id, conversation_id).await;
                }),
            );
        }
        Ok(())
    }

    /// Timer fired: the user went quiet without sending `isTyping: false`.
    async fn expire(&self, user_id: Uuid, conversation_id: Uuid) {
        self.timers
            .lock()
            .await
            .remove(&(user_id, conversation_id));

        // The user may have disconnected while the timer was pending.
        if !self.hub.is_user_online(user_id).await {
            return;
        }
        if let Err(e) = self.broadcast(user_id, conversation_id, false).await {
            tracing::warn!(error = %e, "failed to broadcast typing expiry");
        }
    }

    async fn broadcast(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        is_typing: bool,
    ) -> ApiResult<()> {
        let participants = {
            let db = self.db.lock().await;
            db.participants_of(conversation_id)?
        };

        let frame = Frame::server(
            kind::CHAT_TYPING,
            &ChatTypingNoticePayload {
                conversation_id,
                user_id,
                is_typing,
            },
        );
        for participant in participants {
            if participant.user_id != user_id {
                self.hub.send_to_user(participant.user_id, &frame).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{attach_socket, seed_direct, seed_user, test_state};

    #[tokio::test(start_paused = true)]
    async fn typing_auto_clears_after_ttl() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        let conv = seed_direct(&state, alice.id, bob.id).await;

        let _alice_rx = attach_socket(&state, alice.id).await;
        let mut bob_rx = attach_socket(&state, bob.id).await;

        state.typing.handle(alice.id, conv, true).await.unwrap();
        let frame = bob_rx.next_frame().await;
        assert_eq!(frame.kind, "chat:typing");
        assert_eq!(frame.payload["isTyping"], true);

        // No further input from Alice: the timer fires and clears the flag.
        tokio::time::sleep(TYPING_TTL + Duration::from_secs(1)).await;
        let frame = bob_rx.next_frame().await;
        assert_eq!(frame.payload["isTyping"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_stop_cancels_the_timer() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        let conv = seed_direct(&state, alice.id, bob.id).await;

        let _alice_rx = attach_socket(&state, alice.id).await;
        let mut bob_rx = attach_socket(&state, bob.id).await;

        state.typing.handle(alice.id, conv, true).await.unwrap();
        assert_eq!(bob_rx.next_frame().await.payload["isTyping"], true);

        state.typing.handle(alice.id, conv, false).await.unwrap();
        assert_eq!(bob_rx.next_frame().await.payload["isTyping"], false);

        // The cancelled timer must not fire a second `false`.
        tokio::time::sleep(TYPING_TTL + Duration::from_secs(1)).await;
        assert!(bob_rx.try_next_frame().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_suppressed_when_user_disconnected() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        let conv = seed_direct(&state, alice.id, bob.id).await;

        let alice_rx = attach_socket(&state, alice.id).await;
        let mut bob_rx = attach_socket(&state, bob.id).await;

        state.typing.handle(alice.id, conv, true).await.unwrap();
        assert_eq!(bob_rx.next_frame().await.payload["isTyping"], true);

        // Alice disconnects before the timer fires.
        state.hub.remove(alice_rx.conn_id).await;
        tokio::time::sleep(TYPING_TTL + Duration::from_secs(1)).await;
        assert!(bob_rx.try_next_frame().is_none());
    }

    #[tokio::test]
    async fn non_participants_are_ignored() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        let mallory = seed_user(&state, "mallory").await;
        let conv = seed_direct(&state, alice.id, bob.id).await;

        let mut bob_rx = attach_socket(&state, bob.id).await;
        state.typing.handle(mallory.id, conv, true).await.unwrap();
        assert!(bob_rx.try_next_frame().is_none());
    }
}
