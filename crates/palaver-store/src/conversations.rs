use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use palaver_shared::{ConversationType, ParticipantRole};

use crate::database::Database;
use crate::rows::{opt_ts_col, ts_col, uuid_col};
use crate::users::not_found;
use crate::{Conversation, Participant, Result, StoreError};

const CONVERSATION_COLUMNS: &str = "id, kind, created_at, updated_at";
const PARTICIPANT_COLUMNS: &str = "conversation_id, user_id, role, joined_at, last_read_at";

impl Database {
    /// Insert a DIRECT conversation plus both participant rows in one
    /// transaction.
    pub fn create_direct(
        &mut self,
        user_a: Uuid,
        user_b: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Conversation> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            kind: ConversationType::Direct,
            created_at: now,
            updated_at: now,
        };

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO conversations (id, kind, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                conversation.id.to_string(),
                conversation.kind.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        for user_id in [user_a, user_b] {
            tx.execute(
                "INSERT INTO participants (conversation_id, user_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    conversation.id.to_string(),
                    user_id.to_string(),
                    ParticipantRole::Member.as_str(),
                    now.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;

        Ok(conversation)
    }

    /// The DIRECT conversation whose participant set contains both users,
    /// if one exists. Both ids must appear as participant rows on the same
    /// conversation.
    pub fn find_direct_between(&self, user_a: Uuid, user_b: Uuid) -> Result<Option<Conversation>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT c.id, c.kind, c.created_at, c.updated_at
                 FROM conversations c
                 JOIN participants pa ON pa.conversation_id = c.id AND pa.user_id = ?1
                 JOIN participants pb ON pb.conversation_id = c.id AND pb.user_id = ?2
                 WHERE c.kind = 'DIRECT'
                 LIMIT 1",
                params![user_a.to_string(), user_b.to_string()],
                row_to_conversation,
            )
            .optional()?)
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Conversation> {
        self.conn()
            .query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id.to_string()],
                row_to_conversation,
            )
            .map_err(not_found)
    }

    /// All conversations containing `user_id`, most recently updated first.
    pub fn list_user_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.kind, c.created_at, c.updated_at
             FROM conversations c
             JOIN participants p ON p.conversation_id = c.id
             WHERE p.user_id = ?1
             ORDER BY c.updated_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], row_to_conversation)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn participants_of(&self, conversation_id: Uuid) -> Result<Vec<Participant>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants
             WHERE conversation_id = ?1
             ORDER BY joined_at ASC"
        ))?;
        let rows = stmt.query_map(params![conversation_id.to_string()], row_to_participant)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn get_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Participant>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {PARTICIPANT_COLUMNS} FROM participants
                     WHERE conversation_id = ?1 AND user_id = ?2"
                ),
                params![conversation_id.to_string(), user_id.to_string()],
                row_to_participant,
            )
            .optional()?)
    }

    pub fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self.get_participant(conversation_id, user_id)?.is_some())
    }

    pub fn add_participants(
        &mut self,
        conversation_id: Uuid,
        members: &[(Uuid, ParticipantRole)],
        joined_at: DateTime<Utc>,
    ) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        for (user_id, role) in members {
            tx.execute(
                "INSERT INTO participants (conversation_id, user_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    conversation_id.to_string(),
                    user_id.to_string(),
                    role.as_str(),
                    joined_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn remove_participant(&self, conversation_id: Uuid, user_id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM participants WHERE conversation_id = ?1 AND user_id = ?2",
            params![conversation_id.to_string(), user_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    pub fn update_participant_role(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        role: ParticipantRole,
    ) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE participants SET role = ?1 WHERE conversation_id = ?2 AND user_id = ?3",
            params![
                role.as_str(),
                conversation_id.to_string(),
                user_id.to_string()
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn set_last_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE participants SET last_read_at = ?1
             WHERE conversation_id = ?2 AND user_id = ?3",
            params![
                at.to_rfc3339(),
                conversation_id.to_string(),
                user_id.to_string()
            ],
        )?;
        Ok(())
    }

    /// The remaining participant with the earliest `joined_at`, if any.
    pub fn oldest_participant(&self, conversation_id: Uuid) -> Result<Option<Participant>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {PARTICIPANT_COLUMNS} FROM participants
                     WHERE conversation_id = ?1
                     ORDER BY joined_at ASC
                     LIMIT 1"
                ),
                params![conversation_id.to_string()],
                row_to_participant,
            )
            .optional()?)
    }

    /// Messages from other users newer than the requester's read cursor.
    /// Tombstoned messages do not count.
    pub fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> Result<i64> {
        Ok(self.conn().query_row(
            "SELECT COUNT(*) FROM messages m
             JOIN participants p ON p.conversation_id = m.conversation_id AND p.user_id = ?2
             WHERE m.conversation_id = ?1
               AND m.sender_id != ?2
               AND m.deleted_at IS NULL
               AND (p.last_read_at IS NULL OR m.created_at > p.last_read_at)",
            params![conversation_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?)
    }

    /// Per-conversation unread counts for every conversation of `user_id`.
    pub fn unread_summary(&self, user_id: Uuid) -> Result<Vec<(Uuid, i64)>> {
        let mut stmt = self.conn().prepare(
            "SELECT p.conversation_id, COUNT(m.id)
             FROM participants p
             LEFT JOIN messages m ON m.conversation_id = p.conversation_id
               AND m.sender_id != p.user_id
               AND m.deleted_at IS NULL
               AND (p.last_read_at IS NULL OR m.created_at > p.last_read_at)
             WHERE p.user_id = ?1
             GROUP BY p.conversation_id",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], |row| {
            Ok((uuid_col(row, 0)?, row.get::<_, i64>(1)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Every user sharing at least one conversation with `user_id`,
    /// deduplicated, excluding `user_id` itself.
    pub fn neighbor_user_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn().prepare(
            "SELECT DISTINCT p2.user_id
             FROM participants p1
             JOIN participants p2 ON p2.conversation_id = p1.conversation_id
             WHERE p1.user_id = ?1 AND p2.user_id != ?1",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], |row| uuid_col(row, 0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

pub(crate) fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let kind_str: String = row.get(1)?;
    let kind = ConversationType::parse(&kind_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Conversation {
        id: uuid_col(row, 0)?,
        kind,
        created_at: ts_col(row, 2)?,
        updated_at: ts_col(row, 3)?,
    })
}

pub(crate) fn row_to_participant(row: &Row<'_>) -> rusqlite::Result<Participant> {
    let role_str: String = row.get(2)?;
    let role = ParticipantRole::parse(&role_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Participant {
        conversation_id: uuid_col(row, 0)?,
        user_id: uuid_col(row, 1)?,
        role,
        joined_at: ts_col(row, 3)?,
        last_read_at: opt_ts_col(row, 4)?,
    })
}
