use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use palaver_shared::ContentType;

use crate::database::Database;
use crate::rows::{opt_ts_col, opt_uuid_col, ts_col, uuid_col};
use crate::users::{escape_like, not_found};
use crate::{Message, Result, StoreError};

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, content_type, \
     reply_to_id, created_at, edited_at, deleted_at";

impl Database {
    /// Persist a message and advance the conversation's `updated_at` to the
    /// message timestamp, atomically.
    pub fn insert_message(&mut self, message: &Message) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO messages (id, conversation_id, sender_id, content, content_type,
                                   reply_to_id, created_at, edited_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                message.id.to_string(),
                message.conversation_id.to_string(),
                message.sender_id.to_string(),
                message.content,
                message.content_type.as_str(),
                message.reply_to_id.map(|id| id.to_string()),
                message.created_at.to_rfc3339(),
                message.edited_at.map(|t| t.to_rfc3339()),
                message.deleted_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        tx.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![
                message.created_at.to_rfc3339(),
                message.conversation_id.to_string()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_message(&self, id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(not_found)
    }

    /// Fetch up to `fetch` non-tombstoned messages, newest first, with the
    /// message id as a tiebreak so the order is total. With a cursor row,
    /// seek strictly older than it.
    pub fn messages_page(
        &self,
        conversation_id: Uuid,
        cursor: Option<&Message>,
        fetch: u32,
    ) -> Result<Vec<Message>> {
        let rows = match cursor {
            Some(cursor) => {
                let mut stmt = self.conn().prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1
                       AND deleted_at IS NULL
                       AND (created_at < ?2 OR (created_at = ?2 AND id < ?3))
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?4"
                ))?;
                let rows = stmt.query_map(
                    params![
                        conversation_id.to_string(),
                        cursor.created_at.to_rfc3339(),
                        cursor.id.to_string(),
                        fetch,
                    ],
                    row_to_message,
                )?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
            }
            None => {
                let mut stmt = self.conn().prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1
                       AND deleted_at IS NULL
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2"
                ))?;
                let rows =
                    stmt.query_map(params![conversation_id.to_string(), fetch], row_to_message)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
            }
        };
        rows.map_err(StoreError::Sqlite)
    }

    /// The newest non-tombstoned message of a conversation, if any.
    pub fn last_message(&self, conversation_id: Uuid) -> Result<Option<Message>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1 AND deleted_at IS NULL
                     ORDER BY created_at DESC, id DESC
                     LIMIT 1"
                ),
                params![conversation_id.to_string()],
                row_to_message,
            )
            .optional()?)
    }

    pub fn set_message_edited(
        &self,
        id: Uuid,
        new_content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE messages SET content = ?1, edited_at = ?2 WHERE id = ?3",
            params![new_content, edited_at.to_rfc3339(), id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Tombstone: hide from history and overwrite the content with a fixed
    /// placeholder.
    pub fn tombstone_message(
        &self,
        id: Uuid,
        placeholder: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE messages SET content = ?1, deleted_at = ?2 WHERE id = ?3",
            params![placeholder, deleted_at.to_rfc3339(), id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Case-insensitive substring search over the caller's conversations,
    /// excluding tombstones, newest first.
    pub fn search_messages(
        &self,
        user_id: Uuid,
        query: &str,
        conversation_id: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        let mut stmt = self.conn().prepare(
            "SELECT m.id, m.conversation_id, m.sender_id, m.content, m.content_type,
                    m.reply_to_id, m.created_at, m.edited_at, m.deleted_at
             FROM messages m
             JOIN participants p ON p.conversation_id = m.conversation_id AND p.user_id = ?1
             WHERE m.deleted_at IS NULL
               AND lower(m.content) LIKE ?2 ESCAPE '\\'
               AND (?3 IS NULL OR m.conversation_id = ?3)
             ORDER BY m.created_at DESC, m.id DESC
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![
                user_id.to_string(),
                pattern,
                conversation_id.map(|id| id.to_string()),
                limit,
            ],
            row_to_message,
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Messages the reader still has to acknowledge: everything in the
    /// conversation at or before `up_to`, authored by someone else, without a
    /// READ receipt from the reader yet. Ordered oldest first.
    pub fn messages_pending_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        up_to: DateTime<Utc>,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation_id = ?1
               AND sender_id != ?2
               AND deleted_at IS NULL
               AND created_at <= ?3
               AND NOT EXISTS (
                   SELECT 1 FROM message_receipts r
                   WHERE r.message_id = messages.id
                     AND r.user_id = ?2
                     AND r.status = 'READ'
               )
             ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(
            params![
                conversation_id.to_string(),
                reader_id.to_string(),
                up_to.to_rfc3339(),
            ],
            row_to_message,
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

pub(crate) fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let content_type_str: String = row.get(4)?;
    let content_type = ContentType::parse(&content_type_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Message {
        id: uuid_col(row, 0)?,
        conversation_id: uuid_col(row, 1)?,
        sender_id: uuid_col(row, 2)?,
        content: row.get(3)?,
        content_type,
        reply_to_id: opt_uuid_col(row, 5)?,
        created_at: ts_col(row, 6)?,
        edited_at: opt_ts_col(row, 7)?,
        deleted_at: opt_ts_col(row, 8)?,
    })
}
