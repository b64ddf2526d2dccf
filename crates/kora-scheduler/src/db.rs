use rusqlite::{Connection, Result};

/// Initialise the cron table. Safe to call on every startup (idempotent).
///
/// The `(next_run)` index backs the hot polling query, which runs every
/// tick against mostly-idle rows.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS crons (
            id           TEXT PRIMARY KEY,
            keyword      TEXT NOT NULL,
            schedule     TEXT NOT NULL,
            chat_id      INTEGER NOT NULL,
            next_run     TEXT,
            paused_until TEXT,
            expires_at   TEXT,
            one_time     INTEGER NOT NULL DEFAULT 0,
            last_fire    TEXT,
            created_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_crons_next_run ON crons(next_run);",
    )
}
