//! Fixtures shared by the store tests.

use chrono::Utc;
use uuid::Uuid;

use palaver_shared::ContentType;

use crate::{Database, Message, User};

pub(crate) fn sample_user(username: &str) -> User {
    User {
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
    }
}

pub(crate) fn text_message(conversation_id: Uuid, sender_id: Uuid, content: &str) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id,
        content: content.to_string(),
        content_type: ContentType::Text,
        reply_to_id: None,
        created_at: Utc::now(),
        edited_at: None,
        deleted_at: None,
    }
}

/// A database with two users and a direct conversation between them.
pub(crate) fn direct_fixture() -> (Database, User, User, Uuid) {
    let mut db = Database::open_in_memory().unwrap();
    let alice = sample_user("alice");
    let bob = sample_user("bob");
    db.create_user(&alice).unwrap();
    db.create_user(&bob).unwrap();
    let conv = db.create_direct(alice.id, bob.id, Utc::now()).unwrap();
    (db, alice, bob, conv.id)
}
