use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use palaver_shared::ReceiptStatus;

use crate::database::Database;
use crate::rows::{ts_col, uuid_col};
use crate::{MessageReceipt, Result};

impl Database {
    /// Record a DELIVERED receipt. A no-op when a row already exists, so an
    /// earlier READ is never downgraded.
    pub fn upsert_delivered_receipt(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO message_receipts (message_id, user_id, status, timestamp)
             VALUES (?1, ?2, 'DELIVERED', ?3)
             ON CONFLICT(message_id, user_id) DO NOTHING",
            params![message_id.to_string(), user_id.to_string(), at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Record a READ receipt, overwriting DELIVERED if present.
    pub fn upsert_read_receipt(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO message_receipts (message_id, user_id, status, timestamp)
             VALUES (?1, ?2, 'READ', ?3)
             ON CONFLICT(message_id, user_id)
             DO UPDATE SET status = 'READ', timestamp = excluded.timestamp",
            params![message_id.to_string(), user_id.to_string(), at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_receipt(&self, message_id: Uuid, user_id: Uuid) -> Result<Option<MessageReceipt>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT message_id, user_id, status, timestamp
                 FROM message_receipts
                 WHERE message_id = ?1 AND user_id = ?2",
                params![message_id.to_string(), user_id.to_string()],
                row_to_receipt,
            )
            .optional()?)
    }
}

fn row_to_receipt(row: &Row<'_>) -> rusqlite::Result<MessageReceipt> {
    let status_str: String = row.get(2)?;
    let status = ReceiptStatus::parse(&status_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(MessageReceipt {
        message_id: uuid_col(row, 0)?,
        user_id: uuid_col(row, 1)?,
        status,
        timestamp: ts_col(row, 3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{direct_fixture, text_message};

    #[test]
    fn delivered_never_downgrades_read() {
        let (mut db, alice, bob, conv_id) = direct_fixture();
        let message = text_message(conv_id, alice.id, "hi");
        db.insert_message(&message).unwrap();

        db.upsert_read_receipt(message.id, bob.id, Utc::now()).unwrap();
        db.upsert_delivered_receipt(message.id, bob.id, Utc::now())
            .unwrap();

        let receipt = db.get_receipt(message.id, bob.id).unwrap().unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Read);
    }

    #[test]
    fn read_overwrites_delivered() {
        let (mut db, alice, bob, conv_id) = direct_fixture();
        let message = text_message(conv_id, alice.id, "hi");
        db.insert_message(&message).unwrap();

        db.upsert_delivered_receipt(message.id, bob.id, Utc::now())
            .unwrap();
        db.upsert_read_receipt(message.id, bob.id, Utc::now()).unwrap();

        let receipt = db.get_receipt(message.id, bob.id).unwrap().unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Read);
    }

    #[test]
    fn delivered_is_idempotent() {
        let (mut db, alice, bob, conv_id) = direct_fixture();
        let message = text_message(conv_id, alice.id, "hi");
        db.insert_message(&message).unwrap();

        db.upsert_delivered_receipt(message.id, bob.id, Utc::now())
            .unwrap();
        db.upsert_delivered_receipt(message.id, bob.id, Utc::now())
            .unwrap();

        let receipt = db.get_receipt(message.id, bob.id).unwrap().unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Delivered);
    }
}
