use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::database::Database;
use crate::rows::{opt_ts_col, ts_col, uuid_col};
use crate::{Result, StoreError, User};

const USER_COLUMNS: &str = "id, username, email, password_hash, display_name, \
     avatar_url, bio, is_online, last_seen, created_at";

impl Database {
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, username, email, password_hash, display_name,
                                avatar_url, bio, is_online, last_seen, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                user.id.to_string(),
                user.username,
                user.email,
                user.password_hash,
                user.display_name,
                user.avatar_url,
                user.bio,
                user.is_online,
                user.last_seen.map(|t| t.to_rfc3339()),
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: Uuid) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .map_err(not_found)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                row_to_user,
            )
            .optional()?)
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                row_to_user,
            )
            .optional()?)
    }

    /// Partial profile update: only the provided fields change.
    pub fn update_profile(
        &self,
        id: Uuid,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
        bio: Option<&str>,
    ) -> Result<User> {
        self.conn().execute(
            "UPDATE users SET
                 display_name = COALESCE(?1, display_name),
                 avatar_url   = COALESCE(?2, avatar_url),
                 bio          = COALESCE(?3, bio)
             WHERE id = ?4",
            params![display_name, avatar_url, bio, id.to_string()],
        )?;
        self.get_user(id)
    }

    pub fn set_presence(
        &self,
        id: Uuid,
        is_online: bool,
        last_seen: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE users SET is_online = ?1, last_seen = COALESCE(?2, last_seen) WHERE id = ?3",
            params![is_online, last_seen.map(|t| t.to_rfc3339()), id.to_string()],
        )?;
        Ok(())
    }

    /// Case-insensitive username/display-name search, excluding the caller.
    pub fn search_users(&self, query: &str, exclude: Uuid, limit: u32) -> Result<Vec<User>> {
        let pattern = format!("%{}%", escape_like(query));
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE id != ?1
               AND (username LIKE ?2 ESCAPE '\\' OR display_name LIKE ?2 ESCAPE '\\')
             ORDER BY username ASC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(params![exclude.to_string(), pattern, limit], row_to_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Subset of `ids` that does not exist in the users table.
    pub fn missing_user_ids(&self, ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let mut missing = Vec::new();
        let mut stmt = self
            .conn()
            .prepare("SELECT 1 FROM users WHERE id = ?1")?;
        for id in ids {
            let exists = stmt
                .query_row(params![id.to_string()], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                missing.push(*id);
            }
        }
        Ok(missing)
    }
}

pub(crate) fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_col(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        display_name: row.get(4)?,
        avatar_url: row.get(5)?,
        bio: row.get(6)?,
        is_online: row.get(7)?,
        last_seen: opt_ts_col(row, 8)?,
        created_at: ts_col(row, 9)?,
    })
}

pub(crate) fn not_found(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}

/// Escape `%` and `_` so user input matches literally inside LIKE patterns.
pub(crate) fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::sample_user;

    #[test]
    fn create_and_fetch_user() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user("alice");
        db.create_user(&user).unwrap();

        let fetched = db.get_user(user.id).unwrap();
        assert_eq!(fetched.username, "alice");
        assert_eq!(fetched, user);
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&sample_user("alice")).unwrap();

        let mut dup = sample_user("alice");
        dup.email = "other@example.com".to_string();
        assert!(db.create_user(&dup).is_err());
    }

    #[test]
    fn search_excludes_caller_and_matches_case_insensitively() {
        let db = Database::open_in_memory().unwrap();
        let alice = sample_user("alice");
        let alina = sample_user("alina");
        let bob = sample_user("bob");
        for u in [&alice, &alina, &bob] {
            db.create_user(u).unwrap();
        }

        let hits = db.search_users("ALI", alice.id, 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].username, "alina");
    }

    #[test]
    fn like_wildcards_are_literal() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user("percent_sign");
        db.create_user(&user).unwrap();

        let hits = db.search_users("%", Uuid::new_v4(), 20).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn missing_user_ids_reports_unknowns() {
        let db = Database::open_in_memory().unwrap();
        let alice = sample_user("alice");
        db.create_user(&alice).unwrap();

        let ghost = Uuid::new_v4();
        let missing = db.missing_user_ids(&[alice.id, ghost]).unwrap();
        assert_eq!(missing, vec![ghost]);
    }

    #[test]
    fn presence_update_sets_last_seen() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user("alice");
        db.create_user(&user).unwrap();

        let now = Utc::now();
        db.set_presence(user.id, true, None).unwrap();
        assert!(db.get_user(user.id).unwrap().is_online);

        db.set_presence(user.id, false, Some(now)).unwrap();
        let fetched = db.get_user(user.id).unwrap();
        assert!(!fetched.is_online);
        assert_eq!(
            fetched.last_seen.unwrap().timestamp_millis(),
            now.timestamp_millis()
        );
    }
}
