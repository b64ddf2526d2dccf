//! Schema, migrations, and seed data for the store.
//!
//! One SQLite file holds every table; WAL keeps readers concurrent with the
//! single writer. Migrations are versioned through `PRAGMA user_version` and
//! each step is idempotent, so opening an already-migrated store is a no-op.

use std::path::Path;

use rusqlite::Connection;
use tracing::info;

use crate::domain::ALL_DOMAINS;
use crate::error::{MemoryError, Result};

/// Name of the singular agent entity, seeded with the domains.
pub const AGENT_NAME: &str = "Kora";

const SCHEMA_VERSION: i64 = 1;

/// Open the store file with WAL journaling and a busy timeout, then run
/// migrations, seed reference data, and bind the embedder dimension.
pub fn open(path: &Path, embedder_dim: usize) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    configure(&conn)?;
    migrate(&mut conn)?;
    seed(&mut conn)?;
    bind_dimension(&conn, embedder_dim)?;
    Ok(conn)
}

/// In-memory variant for tests.
pub fn open_in_memory(embedder_dim: usize) -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrate(&mut conn)?;
    seed(&mut conn)?;
    bind_dimension(&conn, embedder_dim)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    // journal_mode returns the resulting mode as a row, so it can't go
    // through execute_batch.
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_row| Ok(()))?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.pragma_update(None, "foreign_keys", 1)?;
    Ok(())
}

/// Migration steps, index 0 = version 1. Append only; never edit a shipped
/// step.
const MIGRATIONS: &[&str] = &[
    // v1: full initial schema.
    "CREATE TABLE IF NOT EXISTS domains (
        id   INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS entities (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        name       TEXT NOT NULL,
        kind       TEXT NOT NULL,
        domain_id  INTEGER NOT NULL REFERENCES domains(id),
        metadata   TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name COLLATE NOCASE);
    CREATE INDEX IF NOT EXISTS idx_entities_kind ON entities(kind);
    CREATE TABLE IF NOT EXISTS facts (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_id     INTEGER REFERENCES entities(id),
        domain_id     INTEGER NOT NULL REFERENCES domains(id),
        field         TEXT NOT NULL,
        value         TEXT NOT NULL,
        confidence    REAL NOT NULL DEFAULT 0.8,
        access_count  INTEGER NOT NULL DEFAULT 0,
        last_accessed TEXT,
        supersedes    INTEGER REFERENCES facts(id),
        active        INTEGER NOT NULL DEFAULT 1,
        score         REAL NOT NULL DEFAULT 0,
        created_at    TEXT NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_facts_active_key
        ON facts(COALESCE(entity_id, 0), domain_id, field) WHERE active = 1;
    CREATE INDEX IF NOT EXISTS idx_facts_domain ON facts(domain_id, active);
    CREATE TABLE IF NOT EXISTS edges (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        source_id  INTEGER NOT NULL REFERENCES entities(id),
        target_id  INTEGER NOT NULL REFERENCES entities(id),
        relation   TEXT NOT NULL,
        strength   REAL NOT NULL DEFAULT 0.8,
        metadata   TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        UNIQUE(source_id, target_id, relation)
    );
    CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
    CREATE TABLE IF NOT EXISTS notes (
        key        TEXT PRIMARY KEY,
        content    TEXT NOT NULL,
        tier       TEXT NOT NULL DEFAULT 'working',
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS vectors (
        kind      TEXT NOT NULL,
        ref_id    INTEGER NOT NULL,
        domain_id INTEGER NOT NULL,
        active    INTEGER NOT NULL DEFAULT 1,
        embedding BLOB NOT NULL,
        PRIMARY KEY (kind, ref_id)
    );
    CREATE INDEX IF NOT EXISTS idx_vectors_domain ON vectors(kind, domain_id, active);
    CREATE TABLE IF NOT EXISTS store_meta (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );",
];

fn migrate(conn: &mut Connection) -> Result<()> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current >= SCHEMA_VERSION {
        return Ok(());
    }
    for (i, step) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i64;
        if version <= current {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(step)?;
        tx.execute_batch(&format!("PRAGMA user_version = {version}"))?;
        tx.commit()?;
        info!(version, "store migrated");
    }
    Ok(())
}

/// Seed the 14 domains and the singular agent entity in one transaction.
/// Idempotent: reruns insert nothing.
fn seed(conn: &mut Connection) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let tx = conn.transaction()?;
    for d in ALL_DOMAINS {
        tx.execute(
            "INSERT OR IGNORE INTO domains (id, name) VALUES (?1, ?2)",
            rusqlite::params![d.id(), d.name()],
        )?;
    }
    tx.execute(
        "INSERT INTO entities (name, kind, domain_id, metadata, created_at, updated_at)
         SELECT ?1, 'agent', 1, '{}', ?2, ?2
         WHERE NOT EXISTS (SELECT 1 FROM entities WHERE kind = 'agent')",
        rusqlite::params![AGENT_NAME, now],
    )?;
    tx.commit()?;
    Ok(())
}

/// Record the embedder dimension on first init; refuse to open when a later
/// configuration disagrees (changing D means re-embedding every fact).
fn bind_dimension(conn: &Connection, dim: usize) -> Result<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = 'embedder_dim'",
            [],
            |row| row.get(0),
        )
        .ok();
    match stored {
        None => {
            conn.execute(
                "INSERT INTO store_meta (key, value) VALUES ('embedder_dim', ?1)",
                [dim.to_string()],
            )?;
            Ok(())
        }
        Some(v) => {
            let stored_dim: usize = v.parse().unwrap_or(0);
            if stored_dim == dim {
                Ok(())
            } else {
                Err(MemoryError::DimensionMismatch {
                    stored: stored_dim,
                    configured: dim,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_is_a_fixed_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kora.db");
        {
            let conn = open(&path, 8).unwrap();
            let v: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
            assert_eq!(v, SCHEMA_VERSION);
        }
        // Reopen: same version, no schema churn, seed unchanged.
        let conn = open(&path, 8).unwrap();
        let v: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(v, SCHEMA_VERSION);
        let domains: i64 = conn
            .query_row("SELECT COUNT(*) FROM domains", [], |r| r.get(0))
            .unwrap();
        assert_eq!(domains, 14);
        let agents: i64 = conn
            .query_row("SELECT COUNT(*) FROM entities WHERE kind = 'agent'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(agents, 1);
    }

    #[test]
    fn agent_entity_is_seeded_once() {
        let conn = open_in_memory(8).unwrap();
        let name: String = conn
            .query_row("SELECT name FROM entities WHERE kind = 'agent'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, AGENT_NAME);
    }

    #[test]
    fn dimension_mismatch_refuses_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kora.db");
        open(&path, 768).unwrap();
        let err = open(&path, 1024).unwrap_err();
        assert!(matches!(
            err,
            MemoryError::DimensionMismatch { stored: 768, configured: 1024 }
        ));
    }
}
