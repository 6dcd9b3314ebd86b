use rusqlite::{params, OptionalExtension, Row};

use crate::database::Database;
use crate::rows::{ts_col, uuid_col};
use crate::{RefreshToken, Result};

impl Database {
    pub fn insert_refresh_token(&self, token: &RefreshToken) -> Result<()> {
        self.conn().execute(
            "INSERT INTO refresh_tokens (token, user_id, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                token.token,
                token.user_id.to_string(),
                token.expires_at.to_rfc3339(),
                token.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT token, user_id, expires_at, created_at
                 FROM refresh_tokens WHERE token = ?1",
                params![token],
                row_to_refresh_token,
            )
            .optional()?)
    }

    /// Returns whether a row was actually deleted; rotation relies on this to
    /// detect replays.
    pub fn delete_refresh_token(&self, token: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM refresh_tokens WHERE token = ?1", params![token])?;
        Ok(affected > 0)
    }
}

fn row_to_refresh_token(row: &Row<'_>) -> rusqlite::Result<RefreshToken> {
    Ok(RefreshToken {
        token: row.get(0)?,
        user_id: uuid_col(row, 1)?,
        expires_at: ts_col(row, 2)?,
        created_at: ts_col(row, 3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::sample_user;
    use chrono::{Duration, Utc};

    #[test]
    fn token_round_trip_and_single_delete() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user("alice");
        db.create_user(&user).unwrap();

        let now = Utc::now();
        let token = RefreshToken {
            token: "opaque-token".to_string(),
            user_id: user.id,
            expires_at: now + Duration::days(7),
            created_at: now,
        };
        db.insert_refresh_token(&token).unwrap();

        let fetched = db.get_refresh_token("opaque-token").unwrap().unwrap();
        assert_eq!(fetched.user_id, user.id);
        assert!(!fetched.is_expired(now));

        assert!(db.delete_refresh_token("opaque-token").unwrap());
        assert!(!db.delete_refresh_token("opaque-token").unwrap());
        assert!(db.get_refresh_token("opaque-token").unwrap().is_none());
    }
}
