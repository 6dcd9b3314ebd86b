//! Online/offline propagation.
//!
//! Presence goes to conversation-neighbors only: users who share at least one
//! conversation with the subject, deduplicated, never the subject itself.

use chrono::Utc;
use uuid::Uuid;

use palaver_shared::frames::{kind, PresenceStatus, PresenceUpdatePayload};
use palaver_shared::Frame;

use crate::error::ApiResult;
use crate::gateway::hub::Hub;
use crate::state::Db;

/// Mark a user online and tell their conversation-neighbors. Called on the
/// first authenticated connection of a user.
pub async fn broadcast_online(db: &Db, hub: &Hub, user_id: Uuid) -> ApiResult<()> {
    let neighbors = {
        let db = db.lock().await;
        db.set_presence(user_id, true, None)?;
        db.neighbor_user_ids(user_id)?
    };

    let frame = Frame::server(
        kind::PRESENCE_UPDATE,
        &PresenceUpdatePayload {
            user_id,
            status: PresenceStatus::Online,
            last_seen: None,
        },
    );
    for neighbor in neighbors {
        hub.send_to_user(neighbor, &frame).await;
    }
    Ok(())
}

/// Mark a user offline with a fresh `lastSeen` and tell their neighbors.
/// Called when the user's last connection goes away.
pub async fn broadcast_offline(db: &Db, hub: &Hub, user_id: Uuid) -> ApiResult<()> {
    let now = Utc::now();
    let neighbors = {
        let db = db.lock().await;
        db.set_presence(user_id, false, Some(now))?;
        db.neighbor_user_ids(user_id)?
    };

    let frame = Frame::server(
        kind::PRESENCE_UPDATE,
        &PresenceUpdatePayload {
            user_id,
            status: PresenceStatus::Offline,
            last_seen: Some(now),
        },
    );
    for neighbor in neighbors {
        hub.send_to_user(neighbor, &frame).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{attach_socket, seed_direct, seed_user, test_state};

    #[tokio::test]
    async fn offline_broadcast_reaches_neighbors_only() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        let stranger = seed_user(&state, "stranger").await;
        seed_direct(&state, alice.id, bob.id).await;

        let mut bob_rx = attach_socket(&state, bob.id).await;
        let mut stranger_rx = attach_socket(&state, stranger.id).await;

        broadcast_offline(&state.db, &state.hub, alice.id)
            .await
            .unwrap();

        let frame = bob_rx.next_frame().await;
        assert_eq!(frame.kind, "presence:update");
        assert_eq!(frame.payload["status"], "offline");
        assert!(frame.payload.get("lastSeen").is_some());
        assert!(stranger_rx.try_next_frame().is_none());

        let stored = state.db.lock().await.get_user(alice.id).unwrap();
        assert!(!stored.is_online);
        assert!(stored.last_seen.is_some());
    }

    #[tokio::test]
    async fn online_broadcast_updates_store() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        seed_direct(&state, alice.id, bob.id).await;

        let mut bob_rx = attach_socket(&state, bob.id).await;
        broadcast_online(&state.db, &state.hub, alice.id)
            .await
            .unwrap();

        let frame = bob_rx.next_frame().await;
        assert_eq!(frame.payload["status"], "online");
        assert!(frame.payload.get("lastSeen").is_none());
        assert!(state.db.lock().await.get_user(alice.id).unwrap().is_online);
    }
}
