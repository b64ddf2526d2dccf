//! Low-level store operations over the single SQLite handle.
//!
//! Thread-safe: one `Mutex<Connection>` serialises writers; WAL keeps other
//! subsystems' read connections unblocked. Contradiction detection is a
//! read-modify-write of the existing active row and therefore always runs
//! inside one transaction; the unique partial index on
//! `(COALESCE(entity_id,0), domain_id, field) WHERE active=1` backs the
//! invariant even under racing writers.

use std::collections::HashSet;
use std::sync::Mutex;

use kora_core::DomainId;
use rusqlite::Connection;
use tracing::debug;

use crate::embed::{decode_embedding, encode_embedding};
use crate::error::{MemoryError, Result};
use crate::types::*;

/// Outcome of a fact upsert.
#[derive(Debug, Clone)]
pub enum FactUpsert {
    /// No active fact existed for the key; a new row was inserted.
    Inserted(Fact),
    /// Same value already active; access count bumped instead.
    Reinforced(Fact),
    /// Different value: new row supersedes the old one.
    Superseded { old: Fact, new: Fact },
}

impl FactUpsert {
    pub fn fact(&self) -> &Fact {
        match self {
            FactUpsert::Inserted(f) | FactUpsert::Reinforced(f) => f,
            FactUpsert::Superseded { new, .. } => new,
        }
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an already-opened (and migrated) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    // --- entities ----------------------------------------------------------

    /// Create an entity, or return the existing one on a case-insensitive
    /// (name, kind) match. Never duplicates.
    pub fn create_entity(
        &self,
        name: &str,
        kind: EntityKind,
        domain_id: DomainId,
        metadata: serde_json::Value,
    ) -> Result<Entity> {
        let conn = self.conn.lock().unwrap();
        if let Some(existing) = find_by_name_kind(&conn, name, kind)? {
            return Ok(existing);
        }
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO entities (name, kind, domain_id, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![name, kind.to_string(), domain_id, metadata.to_string(), now],
        )?;
        let id = conn.last_insert_rowid();
        debug!(entity_id = id, name, "entity created");
        get_entity_inner(&conn, id)?
            .ok_or_else(|| MemoryError::NotFound(format!("entity {id}")))
    }

    pub fn get_entity(&self, id: i64) -> Result<Option<Entity>> {
        let conn = self.conn.lock().unwrap();
        get_entity_inner(&conn, id)
    }

    /// Filtered entity lookup; every filter is optional and ANDed.
    pub fn find_entities(
        &self,
        name: Option<&str>,
        kind: Option<EntityKind>,
        domain_id: Option<DomainId>,
    ) -> Result<Vec<Entity>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = String::from(
            "SELECT id, name, kind, domain_id, metadata, created_at, updated_at
             FROM entities WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(n) = name {
            sql.push_str(" AND name LIKE ?");
            params.push(Box::new(format!("%{n}%")));
        }
        if let Some(k) = kind {
            sql.push_str(" AND kind = ?");
            params.push(Box::new(k.to_string()));
        }
        if let Some(d) = domain_id {
            sql.push_str(" AND domain_id = ?");
            params.push(Box::new(d));
        }
        sql.push_str(" ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(refs.as_slice(), row_to_entity)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// The singular agent entity. Its absence means the seed never ran:
    /// a corrupted store.
    pub fn agent_entity(&self) -> Result<Entity> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, kind, domain_id, metadata, created_at, updated_at
             FROM entities WHERE kind = 'agent' LIMIT 1",
        )?;
        let mut rows = stmt.query_map([], row_to_entity)?;
        rows.next()
            .and_then(|r| r.ok())
            .ok_or_else(|| MemoryError::NotFound("agent entity".to_string()))
    }

    /// Resolve an extracted entity name to an id: exact case-insensitive
    /// match within the kind first, then fuzzy (normalized Levenshtein ≥
    /// 0.85), else create. Returns (entity, created).
    pub fn resolve_entity(
        &self,
        name: &str,
        kind: EntityKind,
        domain_id: DomainId,
    ) -> Result<(Entity, bool)> {
        {
            let conn = self.conn.lock().unwrap();
            if let Some(e) = find_by_name_kind(&conn, name, kind)? {
                return Ok((e, false));
            }
            let mut stmt = conn.prepare(
                "SELECT id, name, kind, domain_id, metadata, created_at, updated_at
                 FROM entities WHERE kind = ?1",
            )?;
            let candidates: Vec<Entity> = stmt
                .query_map([kind.to_string()], row_to_entity)?
                .filter_map(|r| r.ok())
                .collect();
            let lowered = name.to_lowercase();
            let mut best: Option<(f64, Entity)> = None;
            for c in candidates {
                let sim = name_similarity(&lowered, &c.name.to_lowercase());
                if sim >= 0.85 && best.as_ref().map_or(true, |(s, _)| sim > *s) {
                    best = Some((sim, c));
                }
            }
            if let Some((sim, e)) = best {
                debug!(name, matched = %e.name, sim, "fuzzy entity match");
                return Ok((e, false));
            }
        }
        let created = self.create_entity(name, kind, domain_id, serde_json::json!({}))?;
        Ok((created, true))
    }

    // --- facts -------------------------------------------------------------

    /// Insert a fact with contradiction detection, all inside one
    /// transaction:
    /// - no active row for the key → plain insert
    /// - active row with the same value → access bump
    /// - active row with a different value → supersede (old goes inactive,
    ///   its vector entry is deactivated)
    pub fn upsert_fact(
        &self,
        entity_id: Option<i64>,
        domain_id: DomainId,
        field: &str,
        value: &str,
        confidence: f64,
    ) -> Result<FactUpsert> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(MemoryError::Validation(format!(
                "confidence {confidence} outside [0,1]"
            )));
        }
        let mut conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let tx = conn.transaction()?;

        let existing: Option<Fact> = {
            let mut stmt = tx.prepare(
                "SELECT id, entity_id, domain_id, field, value, confidence, access_count,
                        last_accessed, supersedes, active, score, created_at
                 FROM facts
                 WHERE COALESCE(entity_id, 0) = COALESCE(?1, 0)
                   AND domain_id = ?2 AND field = ?3 AND active = 1",
            )?;
            let mut rows = stmt.query_map(rusqlite::params![entity_id, domain_id, field], row_to_fact)?;
            rows.next().transpose()?
        };

        let result = match existing {
            None => {
                tx.execute(
                    "INSERT INTO facts (entity_id, domain_id, field, value, confidence, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![entity_id, domain_id, field, value, confidence, now],
                )?;
                let id = tx.last_insert_rowid();
                let fact = get_fact_tx(&tx, id)?;
                FactUpsert::Inserted(fact)
            }
            Some(old) if old.value == value => {
                tx.execute(
                    "UPDATE facts SET access_count = access_count + 1, last_accessed = ?1
                     WHERE id = ?2",
                    rusqlite::params![now, old.id],
                )?;
                let fact = get_fact_tx(&tx, old.id)?;
                FactUpsert::Reinforced(fact)
            }
            Some(old) => {
                // Deactivate first so the partial unique index admits the
                // successor row.
                tx.execute("UPDATE facts SET active = 0 WHERE id = ?1", [old.id])?;
                tx.execute(
                    "UPDATE vectors SET active = 0 WHERE kind = 'fact' AND ref_id = ?1",
                    [old.id],
                )?;
                tx.execute(
                    "INSERT INTO facts
                     (entity_id, domain_id, field, value, confidence, supersedes, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![entity_id, domain_id, field, value, confidence, old.id, now],
                )?;
                let id = tx.last_insert_rowid();
                let new = get_fact_tx(&tx, id)?;
                debug!(old_id = old.id, new_id = id, field, "fact superseded");
                FactUpsert::Superseded { old, new }
            }
        };

        tx.commit()?;
        Ok(result)
    }

    pub fn get_fact(&self, id: i64) -> Result<Option<Fact>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{FACT_COLS} WHERE id = ?1"))?;
        let mut rows = stmt.query_map([id], row_to_fact)?;
        Ok(rows.next().transpose()?)
    }

    pub fn active_fact(
        &self,
        entity_id: Option<i64>,
        domain_id: DomainId,
        field: &str,
    ) -> Result<Option<Fact>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{FACT_COLS}
             WHERE COALESCE(entity_id, 0) = COALESCE(?1, 0)
               AND domain_id = ?2 AND field = ?3 AND active = 1"
        ))?;
        let mut rows = stmt.query_map(rusqlite::params![entity_id, domain_id, field], row_to_fact)?;
        Ok(rows.next().transpose()?)
    }

    /// Keyword pass for one domain: word-wise LIKE over field and value,
    /// active rows only, ordered the way recall merges (confidence, then
    /// access count, then last access).
    pub fn keyword_search(
        &self,
        domain_id: DomainId,
        words: &[String],
        cap: usize,
    ) -> Result<Vec<Fact>> {
        if words.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let mut sql = format!("{FACT_COLS} WHERE domain_id = ?1 AND active = 1 AND (");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(domain_id)];
        for (i, w) in words.iter().enumerate() {
            if i > 0 {
                sql.push_str(" OR ");
            }
            sql.push_str("field LIKE ? OR value LIKE ?");
            let pat = format!("%{w}%");
            params.push(Box::new(pat.clone()));
            params.push(Box::new(pat));
        }
        sql.push_str(
            ") ORDER BY confidence DESC, access_count DESC, last_accessed DESC LIMIT ?",
        );
        params.push(Box::new(cap as i64));
        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(refs.as_slice(), row_to_fact)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// All active facts attached to an entity, newest first, capped.
    pub fn facts_for_entity(&self, entity_id: i64, cap: usize) -> Result<Vec<Fact>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{FACT_COLS} WHERE entity_id = ?1 AND active = 1
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(rusqlite::params![entity_id, cap as i64], row_to_fact)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn facts_by_ids(&self, ids: &[i64]) -> Result<Vec<Fact>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = vec!["?"; ids.len()].join(",");
        let mut stmt =
            conn.prepare(&format!("{FACT_COLS} WHERE id IN ({placeholders})"))?;
        let refs: Vec<&dyn rusqlite::ToSql> =
            ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(refs.as_slice(), row_to_fact)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Record retrieval: +1 access count, last_accessed = now.
    pub fn bump_access(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "UPDATE facts SET access_count = access_count + 1, last_accessed = ?
             WHERE id IN ({placeholders})"
        );
        let mut params: Vec<&dyn rusqlite::ToSql> = vec![&now];
        params.extend(ids.iter().map(|id| id as &dyn rusqlite::ToSql));
        conn.execute(&sql, params.as_slice())?;
        Ok(())
    }

    /// Recompute the decay score of every active fact. Nothing is deleted;
    /// retrieval rankings deprioritise stale rows naturally.
    pub fn decay_scores(&self, stale_after_days: f64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let n = conn.execute(
            "UPDATE facts SET score =
                 0.5 * confidence
               + 0.3 * MAX(0.0, 1.0 - (julianday(?1) - julianday(created_at)) / ?2)
               + 0.2 * MIN(access_count / 10.0, 1.0)
             WHERE active = 1",
            rusqlite::params![now, stale_after_days],
        )?;
        Ok(n)
    }

    // --- edges -------------------------------------------------------------

    /// Insert a typed relation, or bump the strength of an existing
    /// (source, target, relation) row by 0.1, capped at 1.0.
    pub fn upsert_edge(
        &self,
        source_id: i64,
        target_id: i64,
        relation: &str,
        strength: f64,
        metadata: serde_json::Value,
    ) -> Result<Edge> {
        if !(0.0..=1.0).contains(&strength) {
            return Err(MemoryError::Validation(format!(
                "strength {strength} outside [0,1]"
            )));
        }
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM edges WHERE source_id = ?1 AND target_id = ?2 AND relation = ?3",
                rusqlite::params![source_id, target_id, relation],
                |row| row.get(0),
            )
            .ok();
        let id = match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE edges SET strength = MIN(1.0, strength + 0.1) WHERE id = ?1",
                    [id],
                )?;
                id
            }
            None => {
                conn.execute(
                    "INSERT INTO edges (source_id, target_id, relation, strength, metadata, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![source_id, target_id, relation, strength, metadata.to_string(), now],
                )?;
                conn.last_insert_rowid()
            }
        };
        let mut stmt = conn.prepare(&format!("{EDGE_COLS} WHERE id = ?1"))?;
        let mut rows = stmt.query_map([id], row_to_edge)?;
        rows.next()
            .transpose()?
            .ok_or_else(|| MemoryError::NotFound(format!("edge {id}")))
    }

    /// Outbound edges of an entity, strongest first, optionally restricted
    /// to one relation tag.
    pub fn outbound_edges(
        &self,
        source_id: i64,
        relation: Option<&str>,
        cap: usize,
    ) -> Result<Vec<Edge>> {
        let conn = self.conn.lock().unwrap();
        let (sql, has_rel) = match relation {
            Some(_) => (
                format!(
                    "{EDGE_COLS} WHERE source_id = ?1 AND relation = ?2
                     ORDER BY strength DESC, id LIMIT ?3"
                ),
                true,
            ),
            None => (
                format!("{EDGE_COLS} WHERE source_id = ?1 ORDER BY strength DESC, id LIMIT ?2"),
                false,
            ),
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = if has_rel {
            stmt.query_map(
                rusqlite::params![source_id, relation.unwrap(), cap as i64],
                row_to_edge,
            )?
        } else {
            stmt.query_map(rusqlite::params![source_id, cap as i64], row_to_edge)?
        };
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // --- notes -------------------------------------------------------------

    /// Upsert a working note.
    pub fn save_note(&self, key: &str, content: &str) -> Result<Note> {
        if key.trim().is_empty() {
            return Err(MemoryError::Validation("note key must not be empty".into()));
        }
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO notes (key, content, tier, updated_at)
             VALUES (?1, ?2, 'working', ?3)
             ON CONFLICT(key) DO UPDATE SET content = ?2, tier = 'working', updated_at = ?3",
            rusqlite::params![key, content, now],
        )?;
        get_note_inner(&conn, key)?.ok_or_else(|| MemoryError::NotFound(format!("note {key}")))
    }

    pub fn get_note(&self, key: &str) -> Result<Option<Note>> {
        let conn = self.conn.lock().unwrap();
        get_note_inner(&conn, key)
    }

    pub fn get_notes(&self, keys: &[String]) -> Result<Vec<Note>> {
        let conn = self.conn.lock().unwrap();
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(n) = get_note_inner(&conn, key)? {
                out.push(n);
            }
        }
        Ok(out)
    }

    /// Rename and flip to the archive tier.
    pub fn archive_note(&self, old_key: &str, new_key: &str) -> Result<Note> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        if get_note_inner(&conn, old_key)?.is_none() {
            return Err(MemoryError::NotFound(format!("note {old_key}")));
        }
        if old_key != new_key && get_note_inner(&conn, new_key)?.is_some() {
            return Err(MemoryError::Validation(format!(
                "note key {new_key} already exists"
            )));
        }
        conn.execute(
            "UPDATE notes SET key = ?1, tier = 'archive', updated_at = ?2 WHERE key = ?3",
            rusqlite::params![new_key, now, old_key],
        )?;
        get_note_inner(&conn, new_key)?
            .ok_or_else(|| MemoryError::NotFound(format!("note {new_key}")))
    }

    /// Flip an archived note back to the working tier, key unchanged.
    pub fn restore_note(&self, key: &str) -> Result<Note> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let n = conn.execute(
            "UPDATE notes SET tier = 'working', updated_at = ?1 WHERE key = ?2",
            rusqlite::params![now, key],
        )?;
        if n == 0 {
            return Err(MemoryError::NotFound(format!("note {key}")));
        }
        get_note_inner(&conn, key)?.ok_or_else(|| MemoryError::NotFound(format!("note {key}")))
    }

    /// Working-tier notes, most recently touched first.
    pub fn list_notes(&self) -> Result<Vec<Note>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT key, content, tier, updated_at FROM notes
             WHERE tier = 'working' ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_note)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Archived notes whose key contains `pattern` (empty matches all).
    pub fn list_archived_notes(&self, pattern: &str) -> Result<Vec<Note>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT key, content, tier, updated_at FROM notes
             WHERE tier = 'archive' AND key LIKE ?1 ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map([format!("%{pattern}%")], row_to_note)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn delete_note(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM notes WHERE key = ?1", [key])?;
        if n == 0 {
            return Err(MemoryError::NotFound(format!("note {key}")));
        }
        Ok(())
    }

    // --- vectors -----------------------------------------------------------

    pub fn put_vector(
        &self,
        kind: &str,
        ref_id: i64,
        domain_id: DomainId,
        embedding: &[f32],
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO vectors (kind, ref_id, domain_id, active, embedding)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(kind, ref_id) DO UPDATE SET
                 domain_id = ?3, active = 1, embedding = ?4",
            rusqlite::params![kind, ref_id, domain_id, encode_embedding(embedding)],
        )?;
        Ok(())
    }

    /// Active fact vectors within the given domains, for the KNN scan.
    pub fn candidate_vectors(&self, domains: &[DomainId]) -> Result<Vec<(i64, Vec<f32>)>> {
        if domains.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = vec!["?"; domains.len()].join(",");
        let mut stmt = conn.prepare(&format!(
            "SELECT ref_id, embedding FROM vectors
             WHERE kind = 'fact' AND active = 1 AND domain_id IN ({placeholders})"
        ))?;
        let refs: Vec<&dyn rusqlite::ToSql> =
            domains.iter().map(|d| d as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(refs.as_slice(), |row| {
            let id: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((id, decode_embedding(&blob)))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

// --- row mappers & helpers -------------------------------------------------

const FACT_COLS: &str = "SELECT id, entity_id, domain_id, field, value, confidence, \
     access_count, last_accessed, supersedes, active, score, created_at FROM facts";
const EDGE_COLS: &str =
    "SELECT id, source_id, target_id, relation, strength, metadata, created_at FROM edges";

fn get_fact_tx(tx: &rusqlite::Transaction<'_>, id: i64) -> Result<Fact> {
    let mut stmt = tx.prepare(&format!("{FACT_COLS} WHERE id = ?1"))?;
    let mut rows = stmt.query_map([id], row_to_fact)?;
    rows.next()
        .transpose()?
        .ok_or_else(|| MemoryError::NotFound(format!("fact {id}")))
}

fn get_entity_inner(conn: &Connection, id: i64) -> Result<Option<Entity>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, kind, domain_id, metadata, created_at, updated_at
         FROM entities WHERE id = ?1",
    )?;
    let mut rows = stmt.query_map([id], row_to_entity)?;
    Ok(rows.next().transpose()?)
}

fn find_by_name_kind(conn: &Connection, name: &str, kind: EntityKind) -> Result<Option<Entity>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, kind, domain_id, metadata, created_at, updated_at
         FROM entities WHERE name = ?1 COLLATE NOCASE AND kind = ?2",
    )?;
    let mut rows = stmt.query_map(rusqlite::params![name, kind.to_string()], row_to_entity)?;
    Ok(rows.next().transpose()?)
}

fn get_note_inner(conn: &Connection, key: &str) -> Result<Option<Note>> {
    let mut stmt =
        conn.prepare("SELECT key, content, tier, updated_at FROM notes WHERE key = ?1")?;
    let mut rows = stmt.query_map([key], row_to_note)?;
    Ok(rows.next().transpose()?)
}

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entity> {
    let kind_str: String = row.get(2)?;
    let meta_str: String = row.get(4)?;
    Ok(Entity {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: kind_str.parse().unwrap_or(EntityKind::Concept),
        domain_id: row.get(3)?,
        metadata: serde_json::from_str(&meta_str).unwrap_or(serde_json::Value::Null),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn row_to_fact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Fact> {
    Ok(Fact {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        domain_id: row.get(2)?,
        field: row.get(3)?,
        value: row.get(4)?,
        confidence: row.get(5)?,
        access_count: row.get(6)?,
        last_accessed: row.get(7)?,
        supersedes: row.get(8)?,
        active: row.get::<_, i64>(9)? != 0,
        score: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<Edge> {
    let meta_str: String = row.get(5)?;
    Ok(Edge {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        relation: row.get(3)?,
        strength: row.get(4)?,
        metadata: serde_json::from_str(&meta_str).unwrap_or(serde_json::Value::Null),
        created_at: row.get(6)?,
    })
}

fn row_to_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
    let tier_str: String = row.get(2)?;
    Ok(Note {
        key: row.get(0)?,
        content: row.get(1)?,
        tier: tier_str.parse().unwrap_or(NoteTier::Working),
        updated_at: row.get(3)?,
    })
}

/// Normalized Levenshtein similarity in [0, 1] on already-lowercased input.
fn name_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let (a, b): (Vec<char>, Vec<char>) = (a.chars().collect(), b.chars().collect());
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let dist = prev[b.len()];
    1.0 - dist as f64 / a.len().max(b.len()) as f64
}

/// Split a recall query into LIKE-safe search words (≥ 3 chars, deduped).
pub fn significant_words(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .filter(|w| seen.insert(w.to_string()))
        .map(String::from)
        .collect()
}
