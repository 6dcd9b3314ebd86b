//! v001 -- Initial schema creation.
//!
//! Creates the core tables: `users`, `conversations`, `participants`,
//! `messages`, `message_receipts`, `groups`, `refresh_tokens`, `contacts`,
//! and `blocks`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    username      TEXT NOT NULL UNIQUE,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    display_name  TEXT NOT NULL,
    avatar_url    TEXT,
    bio           TEXT,
    is_online     INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    last_seen     TEXT,                       -- ISO-8601 / RFC-3339
    created_at    TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Conversations (direct or group)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    kind       TEXT NOT NULL,                 -- DIRECT | GROUP
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL                  -- bumped on every message persist
);

-- ----------------------------------------------------------------
-- Participants (join rows; role + read cursor)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS participants (
    conversation_id TEXT NOT NULL,
    user_id         TEXT NOT NULL,
    role            TEXT NOT NULL DEFAULT 'MEMBER',  -- ADMIN | MEMBER
    joined_at       TEXT NOT NULL,
    last_read_at    TEXT,

    PRIMARY KEY (conversation_id, user_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_participants_user ON participants(user_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL, -- UUID v4
    conversation_id TEXT NOT NULL,
    sender_id       TEXT NOT NULL,
    content         TEXT NOT NULL,
    content_type    TEXT NOT NULL DEFAULT 'TEXT',
    reply_to_id     TEXT,                      -- FK -> messages(id), same conversation
    created_at      TEXT NOT NULL,
    edited_at       TEXT,
    deleted_at      TEXT,                      -- tombstone marker

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY (sender_id) REFERENCES users(id),
    FOREIGN KEY (reply_to_id) REFERENCES messages(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_conv_created
    ON messages(conversation_id, created_at DESC);

-- ----------------------------------------------------------------
-- Message receipts (DELIVERED / READ, one row per message+user)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS message_receipts (
    message_id TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    status     TEXT NOT NULL,                  -- DELIVERED | READ
    timestamp  TEXT NOT NULL,

    PRIMARY KEY (message_id, user_id),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

-- ----------------------------------------------------------------
-- Groups (1:1 with a GROUP conversation)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS groups (
    id              TEXT PRIMARY KEY NOT NULL, -- UUID v4
    conversation_id TEXT NOT NULL UNIQUE,
    name            TEXT NOT NULL,
    description     TEXT,
    icon_url        TEXT,
    created_by      TEXT NOT NULL,
    created_at      TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY (created_by) REFERENCES users(id)
);

-- ----------------------------------------------------------------
-- Refresh tokens (opaque, single-use, 7-day expiry)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS refresh_tokens (
    token      TEXT PRIMARY KEY NOT NULL,
    user_id    TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Contacts (directional)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    owner_user_id   TEXT NOT NULL,
    contact_user_id TEXT NOT NULL,
    nickname        TEXT,
    created_at      TEXT NOT NULL,

    PRIMARY KEY (owner_user_id, contact_user_id),
    FOREIGN KEY (owner_user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (contact_user_id) REFERENCES users(id)
);

-- ----------------------------------------------------------------
-- Blocks (directional rows; the "is blocked" query is symmetric)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS blocks (
    blocker_user_id TEXT NOT NULL,
    blocked_user_id TEXT NOT NULL,
    created_at      TEXT NOT NULL,

    PRIMARY KEY (blocker_user_id, blocked_user_id),
    FOREIGN KEY (blocker_user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (blocked_user_id) REFERENCES users(id)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
