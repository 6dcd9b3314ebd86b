//! Response shapes shared by the HTTP handlers and services.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use palaver_shared::{ContentType, ConversationType, ParticipantRole};
use palaver_store::{Group, Message, Participant, User};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserView {
    /// Public profile: what other users may see. No email.
    pub fn public(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            email: None,
            avatar_url: user.avatar_url.clone(),
            bio: user.bio.clone(),
            is_online: user.is_online,
            last_seen: user.last_seen,
            created_at: user.created_at,
        }
    }

    /// The caller's own profile, email included.
    pub fn private(user: &User) -> Self {
        Self {
            email: Some(user.email.clone()),
            ..Self::public(user)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub content_type: ContentType,
    pub reply_to_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            content_type: message.content_type,
            reply_to_id: message.reply_to_id,
            created_at: message.created_at,
            edited_at: message.edited_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
    pub last_read_at: Option<DateTime<Utc>>,
    pub user: UserView,
}

impl ParticipantView {
    pub fn new(participant: &Participant, user: &User) -> Self {
        Self {
            role: participant.role,
            joined_at: participant.joined_at,
            last_read_at: participant.last_read_at,
            user: UserView::public(user),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ConversationType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub participants: Vec<ParticipantView>,
    pub last_message: Option<MessageView>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<MessageView>,
    pub next_cursor: Option<Uuid>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<&Group> for GroupView {
    fn from(group: &Group) -> Self {
        Self {
            id: group.id,
            conversation_id: group.conversation_id,
            name: group.name.clone(),
            description: group.description.clone(),
            icon_url: group.icon_url.clone(),
            created_by: group.created_by,
            created_at: group.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDetailView {
    #[serde(flatten)]
    pub group: GroupView,
    pub participants: Vec<ParticipantView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadEntry {
    pub conversation_id: Uuid,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadSummary {
    pub conversations: Vec<UnreadEntry>,
    pub total: i64,
}
