//! Group lifecycle: creation, membership, roles, and the SYSTEM messages
//! that record those events inside the conversation.

use chrono::Utc;
use uuid::Uuid;

use palaver_shared::{ContentType, ConversationType, ParticipantRole};
use palaver_store::{Conversation, Database, Group, Message, Participant};

use crate::error::{ApiError, ApiResult};
use crate::state::Db;
use crate::views::{GroupDetailView, GroupView, ParticipantView};

const MAX_GROUP_NAME_LEN: usize = 100;

/// Create a group conversation with the creator as ADMIN. The conversation,
/// the participant rows, the group row, and the initial SYSTEM message all
/// land in one transaction.
pub async fn create(
    db: &Db,
    creator: Uuid,
    name: &str,
    description: Option<&str>,
    member_ids: &[Uuid],
) -> ApiResult<GroupDetailView> {
    let name = name.trim();
    if name.is_empty() || name.len() > MAX_GROUP_NAME_LEN {
        return Err(ApiError::Validation("Group name is required".to_string()));
    }

    // Dedupe and make sure the creator is part of the group.
    let mut members = vec![creator];
    for id in member_ids {
        if !members.contains(id) {
            members.push(*id);
        }
    }

    let mut db = db.lock().await;
    let missing = db.missing_user_ids(&members)?;
    if !missing.is_empty() {
        return Err(ApiError::Validation(
            "One or more members do not exist".to_string(),
        ));
    }

    let now = Utc::now();
    let conversation = Conversation {
        id: Uuid::new_v4(),
        kind: ConversationType::Group,
        created_at: now,
        updated_at: now,
    };
    let participants: Vec<Participant> = members
        .iter()
        .map(|user_id| Participant {
            conversation_id: conversation.id,
            user_id: *user_id,
            role: if *user_id == creator {
                ParticipantRole::Admin
            } else {
                ParticipantRole::Member
            },
            joined_at: now,
            last_read_at: None,
        })
        .collect();
    let group = Group {
        id: Uuid::new_v4(),
        conversation_id: conversation.id,
        name: name.to_string(),
        description: description.map(str::to_string),
        icon_url: None,
        created_by: creator,
        created_at: now,
    };
    let announcement = system_message(
        conversation.id,
        creator,
        format!("created the group \"{name}\""),
    );

    db.create_group(&conversation, &participants, &group, &announcement)?;
    tracing::info!(group_id = %group.id, members = participants.len(), "group created");

    detail(&db, &group)
}

pub async fn get_detail(db: &Db, group_id: Uuid, me: Uuid) -> ApiResult<GroupDetailView> {
    let db = db.lock().await;
    let group = db
        .get_group(group_id)
        .map_err(|_| ApiError::NotFound("Group not found".to_string()))?;
    require_member(&db, group.conversation_id, me)?;
    detail(&db, &group)
}

/// Admin-only metadata update. A rename is recorded as a SYSTEM message.
pub async fn update_meta(
    db: &Db,
    group_id: Uuid,
    actor: Uuid,
    name: Option<&str>,
    description: Option<&str>,
    icon_url: Option<&str>,
) -> ApiResult<GroupDetailView> {
    if let Some(name) = name {
        if name.trim().is_empty() || name.len() > MAX_GROUP_NAME_LEN {
            return Err(ApiError::Validation("Group name is required".to_string()));
        }
    }

    let mut db = db.lock().await;
    let group = db
        .get_group(group_id)
        .map_err(|_| ApiError::NotFound("Group not found".to_string()))?;
    require_admin(&db, group.conversation_id, actor)?;

    let renamed = matches!(name, Some(n) if n.trim() != group.name);
    let updated = db.update_group(group_id, name.map(str::trim), description, icon_url)?;

    if renamed {
        db.insert_message(&system_message(
            updated.conversation_id,
            actor,
            format!("renamed the group to \"{}\"", updated.name),
        ))?;
    }

    detail(&db, &updated)
}

/// Admin-only. Already-present users are skipped; adding nobody new is an
/// error. The SYSTEM message lists the new members by display name.
pub async fn add_members(
    db: &Db,
    group_id: Uuid,
    actor: Uuid,
    member_ids: &[Uuid],
) -> ApiResult<GroupDetailView> {
    let mut db = db.lock().await;
    let group = db
        .get_group(group_id)
        .map_err(|_| ApiError::NotFound("Group not found".to_string()))?;
    require_admin(&db, group.conversation_id, actor)?;

    let mut to_add = Vec::new();
    for id in member_ids {
        if !to_add.contains(id) && db.get_participant(group.conversation_id, *id)?.is_none() {
            to_add.push(*id);
        }
    }
    if to_add.is_empty() {
        return Err(ApiError::Validation("No new members to add".to_string()));
    }
    if !db.missing_user_ids(&to_add)?.is_empty() {
        return Err(ApiError::Validation(
            "One or more members do not exist".to_string(),
        ));
    }

    let now = Utc::now();
    let rows: Vec<(Uuid, ParticipantRole)> = to_add
        .iter()
        .map(|id| (*id, ParticipantRole::Member))
        .collect();
    db.add_participants(group.conversation_id, &rows, now)?;

    let mut names = Vec::with_capacity(to_add.len());
    for id in &to_add {
        names.push(db.get_user(*id)?.display_name);
    }
    db.insert_message(&system_message(
        group.conversation_id,
        actor,
        format!("added {}", names.join(", ")),
    ))?;

    detail(&db, &group)
}

/// Remove a member, or leave when `actor == target`. Admins may remove
/// anyone; members only themselves. Removing an ADMIN promotes the
/// longest-standing remaining participant.
pub async fn remove_member(db: &Db, group_id: Uuid, actor: Uuid, target: Uuid) -> ApiResult<()> {
    let mut db = db.lock().await;
    let group = db
        .get_group(group_id)
        .map_err(|_| ApiError::NotFound("Group not found".to_string()))?;

    if actor == target {
        // Leaving only requires membership.
        if db.get_participant(group.conversation_id, actor)?.is_none() {
            return Err(ApiError::Forbidden("Not a member of this group".to_string()));
        }
    } else {
        require_admin(&db, group.conversation_id, actor)?;
    }

    let removed = db
        .get_participant(group.conversation_id, target)?
        .ok_or_else(|| ApiError::NotFound("User is not a member of this group".to_string()))?;
    db.remove_participant(group.conversation_id, target)?;

    if removed.role == ParticipantRole::Admin {
        if let Some(oldest) = db.oldest_participant(group.conversation_id)? {
            if oldest.role != ParticipantRole::Admin {
                db.update_participant_role(
                    group.conversation_id,
                    oldest.user_id,
                    ParticipantRole::Admin,
                )?;
                tracing::info!(
                    group_id = %group_id,
                    user_id = %oldest.user_id,
                    "auto-promoted longest-standing member to admin"
                );
            }
        }
    }

    let target_name = db.get_user(target)?.display_name;
    let content = if actor == target {
        format!("{target_name} left the group")
    } else {
        format!("removed {target_name}")
    };
    db.insert_message(&system_message(group.conversation_id, actor, content))?;

    Ok(())
}

/// Admin-only ADMIN <-> MEMBER transition.
pub async fn update_role(
    db: &Db,
    group_id: Uuid,
    actor: Uuid,
    target: Uuid,
    role: ParticipantRole,
) -> ApiResult<()> {
    let db = db.lock().await;
    let group = db
        .get_group(group_id)
        .map_err(|_| ApiError::NotFound("Group not found".to_string()))?;
    require_admin(&db, group.conversation_id, actor)?;

    let participant = db
        .get_participant(group.conversation_id, target)?
        .ok_or_else(|| ApiError::NotFound("User is not a member of this group".to_string()))?;

    // A group with participants must keep at least one admin.
    if participant.role == ParticipantRole::Admin && role == ParticipantRole::Member {
        let admins = db
            .participants_of(group.conversation_id)?
            .iter()
            .filter(|p| p.role == ParticipantRole::Admin)
            .count();
        if admins <= 1 {
            return Err(ApiError::Validation(
                "Cannot demote the only admin".to_string(),
            ));
        }
    }

    db.update_participant_role(group.conversation_id, target, role)?;
    Ok(())
}

fn require_member(db: &Database, conversation_id: Uuid, user_id: Uuid) -> ApiResult<()> {
    if db.get_participant(conversation_id, user_id)?.is_some() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Not a member of this group".to_string()))
    }
}

fn require_admin(db: &Database, conversation_id: Uuid, user_id: Uuid) -> ApiResult<()> {
    match db.get_participant(conversation_id, user_id)? {
        None => Err(ApiError::Forbidden("Not a member of this group".to_string())),
        Some(p) if p.role != ParticipantRole::Admin => Err(ApiError::Forbidden(
            "Admin privileges required".to_string(),
        )),
        Some(_) => Ok(()),
    }
}

fn system_message(conversation_id: Uuid, sender_id: Uuid, content: String) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id,
        content,
        content_type: ContentType::System,
        reply_to_id: None,
        created_at: Utc::now(),
        edited_at: None,
        deleted_at: None,
    }
}

fn detail(db: &Database, group: &Group) -> ApiResult<GroupDetailView> {
    let participants = db.participants_of(group.conversation_id)?;
    let mut views = Vec::with_capacity(participants.len());
    for participant in &participants {
        let user = db.get_user(participant.user_id)?;
        views.push(ParticipantView::new(participant, &user));
    }
    Ok(GroupDetailView {
        group: GroupView::from(group),
        participants: views,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_user, test_state};

    #[tokio::test]
    async fn create_includes_creator_as_admin_and_announces() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;

        let detail = create(&state.db, alice.id, "trip", None, &[bob.id, bob.id])
            .await
            .unwrap();
        assert_eq!(detail.participants.len(), 2);
        let creator = detail
            .participants
            .iter()
            .find(|p| p.user.id == alice.id)
            .unwrap();
        assert_eq!(creator.role, ParticipantRole::Admin);

        let db = state.db.lock().await;
        let messages = db
            .messages_page(detail.group.conversation_id, None, 10)
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "created the group \"trip\"");
        assert_eq!(messages[0].content_type, ContentType::System);
        assert_eq!(messages[0].sender_id, alice.id);
    }

    #[tokio::test]
    async fn create_with_unknown_member_fails_validation() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let err = create(&state.db, alice.id, "trip", None, &[Uuid::new_v4()])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn member_cannot_add_but_admin_can() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        let carol = seed_user(&state, "carol").await;
        let detail = create(&state.db, alice.id, "trip", None, &[bob.id])
            .await
            .unwrap();

        let err = add_members(&state.db, detail.group.id, bob.id, &[carol.id])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Admin privileges required");

        let err = add_members(&state.db, detail.group.id, carol.id, &[carol.id])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Not a member of this group");

        let updated = add_members(&state.db, detail.group.id, alice.id, &[carol.id])
            .await
            .unwrap();
        assert_eq!(updated.participants.len(), 3);

        // Adding only already-present users is a validation error.
        let err = add_members(&state.db, detail.group.id, alice.id, &[carol.id])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn admin_departure_promotes_oldest_member() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        let detail = create(&state.db, alice.id, "trip", None, &[bob.id])
            .await
            .unwrap();
        let carol = seed_user(&state, "carol").await;
        add_members(&state.db, detail.group.id, alice.id, &[carol.id])
            .await
            .unwrap();

        // Alice (admin) leaves; Bob joined before Carol, so Bob is promoted.
        remove_member(&state.db, detail.group.id, alice.id, alice.id)
            .await
            .unwrap();

        let db = state.db.lock().await;
        let bob_row = db
            .get_participant(detail.group.conversation_id, bob.id)
            .unwrap()
            .unwrap();
        assert_eq!(bob_row.role, ParticipantRole::Admin);
        assert!(db
            .get_participant(detail.group.conversation_id, alice.id)
            .unwrap()
            .is_none());

        let messages = db
            .messages_page(detail.group.conversation_id, None, 10)
            .unwrap();
        let last = messages.last().unwrap();
        assert_eq!(last.content, "alice left the group");
    }

    #[tokio::test]
    async fn member_can_remove_only_themselves() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        let carol = seed_user(&state, "carol").await;
        let detail = create(&state.db, alice.id, "trip", None, &[bob.id, carol.id])
            .await
            .unwrap();

        let err = remove_member(&state.db, detail.group.id, bob.id, carol.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");

        remove_member(&state.db, detail.group.id, bob.id, bob.id)
            .await
            .unwrap();
        let db = state.db.lock().await;
        let messages = db
            .messages_page(detail.group.conversation_id, None, 10)
            .unwrap();
        assert_eq!(messages.last().unwrap().content, "bob left the group");
    }

    #[tokio::test]
    async fn only_admin_cannot_be_demoted() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let bob = seed_user(&state, "bob").await;
        let detail = create(&state.db, alice.id, "trip", None, &[bob.id])
            .await
            .unwrap();

        let err = update_role(
            &state.db,
            detail.group.id,
            alice.id,
            alice.id,
            ParticipantRole::Member,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        // Promote Bob first, then the demotion goes through.
        update_role(
            &state.db,
            detail.group.id,
            alice.id,
            bob.id,
            ParticipantRole::Admin,
        )
        .await
        .unwrap();
        update_role(
            &state.db,
            detail.group.id,
            alice.id,
            alice.id,
            ParticipantRole::Member,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn rename_is_announced() {
        let state = test_state().await;
        let alice = seed_user(&state, "alice").await;
        let detail = create(&state.db, alice.id, "trip", None, &[])
            .await
            .unwrap();

        let updated = update_meta(
            &state.db,
            detail.group.id,
            alice.id,
            Some("holiday"),
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(updated.group.name, "holiday");

        let db = state.db.lock().await;
        let messages = db
            .messages_page(detail.group.conversation_id, None, 10)
            .unwrap();
        assert_eq!(
            messages.last().unwrap().content,
            "renamed the group to \"holiday\""
        );
    }
}
