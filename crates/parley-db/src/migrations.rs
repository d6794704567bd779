use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                profile_pic TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE chats (
                id                  TEXT PRIMARY KEY,
                is_group_chat       INTEGER NOT NULL DEFAULT 0,
                chat_name           TEXT,
                group_admin_id      TEXT REFERENCES users(id) ON DELETE SET NULL,
                latest_message_id   TEXT REFERENCES messages(id) ON DELETE SET NULL,
                created_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE chat_users (
                chat_id     TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (chat_id, user_id)
            );

            CREATE INDEX idx_chat_users_user ON chat_users(user_id);

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                chat_id     TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                sender_id   TEXT NOT NULL REFERENCES users(id),
                content     TEXT NOT NULL,
                reply_to_id TEXT REFERENCES messages(id) ON DELETE SET NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_messages_chat ON messages(chat_id, created_at);

            -- One reaction per user per message. Switching emoji updates the
            -- row in place so its position (seq) is kept.
            CREATE TABLE reactions (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                emoji       TEXT NOT NULL,
                UNIQUE(message_id, user_id)
            );

            CREATE TABLE stars (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                UNIQUE(message_id, user_id)
            );

            CREATE TABLE chat_pins (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id     TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                UNIQUE(chat_id, message_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
