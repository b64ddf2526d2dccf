use rusqlite::{Connection, Result};

/// Initialise the conversations table. Safe to call on every startup
/// (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            session_key TEXT NOT NULL,
            transport   TEXT NOT NULL,
            role        TEXT NOT NULL,
            content     TEXT NOT NULL,
            tool_trace  TEXT NOT NULL DEFAULT '[]',
            model_used  TEXT,
            tokens_in   INTEGER NOT NULL DEFAULT 0,
            tokens_out  INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conv_session
            ON conversations(session_key, created_at);",
    )
}
