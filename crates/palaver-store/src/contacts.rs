use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::database::Database;
use crate::rows::{ts_col, uuid_col};
use crate::{Block, Contact, Result, StoreError, User};

impl Database {
    pub fn add_contact(
        &self,
        owner: Uuid,
        contact: Uuid,
        nickname: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Contact> {
        self.conn().execute(
            "INSERT INTO contacts (owner_user_id, contact_user_id, nickname, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(owner_user_id, contact_user_id)
             DO UPDATE SET nickname = excluded.nickname",
            params![
                owner.to_string(),
                contact.to_string(),
                nickname,
                at.to_rfc3339()
            ],
        )?;
        self.conn()
            .query_row(
                "SELECT owner_user_id, contact_user_id, nickname, created_at
                 FROM contacts WHERE owner_user_id = ?1 AND contact_user_id = ?2",
                params![owner.to_string(), contact.to_string()],
                row_to_contact,
            )
            .map_err(StoreError::Sqlite)
    }

    pub fn remove_contact(&self, owner: Uuid, contact: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM contacts WHERE owner_user_id = ?1 AND contact_user_id = ?2",
            params![owner.to_string(), contact.to_string()],
        )?;
        Ok(affected > 0)
    }

    pub fn list_contacts(&self, owner: Uuid) -> Result<Vec<(Contact, User)>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.owner_user_id, c.contact_user_id, c.nickname, c.created_at,
                    u.id, u.username, u.email, u.password_hash, u.display_name,
                    u.avatar_url, u.bio, u.is_online, u.last_seen, u.created_at
             FROM contacts c
             JOIN users u ON u.id = c.contact_user_id
             WHERE c.owner_user_id = ?1
             ORDER BY c.created_at ASC",
        )?;
        let rows = stmt.query_map(params![owner.to_string()], |row| {
            let contact = row_to_contact(row)?;
            let user = user_from_offset(row, 4)?;
            Ok((contact, user))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn add_block(&self, blocker: Uuid, blocked: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO blocks (blocker_user_id, blocked_user_id, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(blocker_user_id, blocked_user_id) DO NOTHING",
            params![blocker.to_string(), blocked.to_string(), at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn remove_block(&self, blocker: Uuid, blocked: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM blocks WHERE blocker_user_id = ?1 AND blocked_user_id = ?2",
            params![blocker.to_string(), blocked.to_string()],
        )?;
        Ok(affected > 0)
    }

    pub fn list_blocks(&self, blocker: Uuid) -> Result<Vec<(Block, User)>> {
        let mut stmt = self.conn().prepare(
            "SELECT b.blocker_user_id, b.blocked_user_id, b.created_at,
                    u.id, u.username, u.email, u.password_hash, u.display_name,
                    u.avatar_url, u.bio, u.is_online, u.last_seen, u.created_at
             FROM blocks b
             JOIN users u ON u.id = b.blocked_user_id
             WHERE b.blocker_user_id = ?1
             ORDER BY b.created_at ASC",
        )?;
        let rows = stmt.query_map(params![blocker.to_string()], |row| {
            let block = Block {
                blocker_user_id: uuid_col(row, 0)?,
                blocked_user_id: uuid_col(row, 1)?,
                created_at: ts_col(row, 2)?,
            };
            let user = user_from_offset(row, 3)?;
            Ok((block, user))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Whether a block exists in either direction between the two users.
    pub fn is_blocked_between(&self, a: Uuid, b: Uuid) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM blocks
             WHERE (blocker_user_id = ?1 AND blocked_user_id = ?2)
                OR (blocker_user_id = ?2 AND blocked_user_id = ?1)",
            params![a.to_string(), b.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn row_to_contact(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        owner_user_id: uuid_col(row, 0)?,
        contact_user_id: uuid_col(row, 1)?,
        nickname: row.get(2)?,
        created_at: ts_col(row, 3)?,
    })
}

/// Read a full user record starting at column `offset` of a joined row.
fn user_from_offset(row: &Row<'_>, offset: usize) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_col(row, offset)?,
        username: row.get(offset + 1)?,
        email: row.get(offset + 2)?,
        password_hash: row.get(offset + 3)?,
        display_name: row.get(offset + 4)?,
        avatar_url: row.get(offset + 5)?,
        bio: row.get(offset + 6)?,
        is_online: row.get(offset + 7)?,
        last_seen: crate::rows::opt_ts_col(row, offset + 8)?,
        created_at: ts_col(row, offset + 9)?,
    })
}
