use rusqlite::{params, Row};
use uuid::Uuid;

use crate::database::Database;
use crate::rows::{ts_col, uuid_col};
use crate::users::not_found;
use crate::{Conversation, Group, Message, Participant, Result};

const GROUP_COLUMNS: &str =
    "id, conversation_id, name, description, icon_url, created_by, created_at";

impl Database {
    /// Create a group: the GROUP conversation, every participant row, the
    /// group row, and the initial SYSTEM message, all in one transaction.
    pub fn create_group(
        &mut self,
        conversation: &Conversation,
        participants: &[Participant],
        group: &Group,
        system_message: &Message,
    ) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO conversations (id, kind, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                conversation.id.to_string(),
                conversation.kind.as_str(),
                conversation.created_at.to_rfc3339(),
                conversation.updated_at.to_rfc3339(),
            ],
        )?;
        for participant in participants {
            tx.execute(
                "INSERT INTO participants (conversation_id, user_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    participant.conversation_id.to_string(),
                    participant.user_id.to_string(),
                    participant.role.as_str(),
                    participant.joined_at.to_rfc3339(),
                ],
            )?;
        }
        tx.execute(
            "INSERT INTO groups (id, conversation_id, name, description, icon_url,
                                 created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                group.id.to_string(),
                group.conversation_id.to_string(),
                group.name,
                group.description,
                group.icon_url,
                group.created_by.to_string(),
                group.created_at.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "INSERT INTO messages (id, conversation_id, sender_id, content, content_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                system_message.id.to_string(),
                system_message.conversation_id.to_string(),
                system_message.sender_id.to_string(),
                system_message.content,
                system_message.content_type.as_str(),
                system_message.created_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_group(&self, id: Uuid) -> Result<Group> {
        self.conn()
            .query_row(
                &format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = ?1"),
                params![id.to_string()],
                row_to_group,
            )
            .map_err(not_found)
    }

    pub fn get_group_by_conversation(&self, conversation_id: Uuid) -> Result<Group> {
        self.conn()
            .query_row(
                &format!("SELECT {GROUP_COLUMNS} FROM groups WHERE conversation_id = ?1"),
                params![conversation_id.to_string()],
                row_to_group,
            )
            .map_err(not_found)
    }

    /// Partial metadata update: only the provided fields change.
    pub fn update_group(
        &self,
        id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
        icon_url: Option<&str>,
    ) -> Result<Group> {
        self.conn().execute(
            "UPDATE groups SET
                 name        = COALESCE(?1, name),
                 description = COALESCE(?2, description),
                 icon_url    = COALESCE(?3, icon_url)
             WHERE id = ?4",
            params![name, description, icon_url, id.to_string()],
        )?;
        self.get_group(id)
    }
}

fn row_to_group(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: uuid_col(row, 0)?,
        conversation_id: uuid_col(row, 1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        icon_url: row.get(4)?,
        created_by: uuid_col(row, 5)?,
        created_at: ts_col(row, 6)?,
    })
}
