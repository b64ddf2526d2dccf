//! Per-chat conversation state: a rolling in-memory window used for
//! context assembly, backed by best-effort SQLite persistence.
//!
//! The buffer is the source of truth within a process lifetime; the
//! `conversations` table only seeds it after a restart. Losing it is
//! acceptable; long-term knowledge lives in the memory store as extracted
//! facts, not in raw transcripts.

use std::collections::VecDeque;
use std::sync::Mutex;

use dashmap::DashMap;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::db::init_db;
use crate::error::Result;
use crate::types::{Turn, TurnRole};

pub const DEFAULT_WINDOW: usize = 20;

pub struct SessionManager {
    window: usize,
    buffers: DashMap<String, VecDeque<Turn>>,
    /// `None` disables persistence entirely (tests, ephemeral runs).
    log: Option<Mutex<Connection>>,
}

impl SessionManager {
    /// `conn` is the persistence connection; pass `None` to keep sessions
    /// purely in memory.
    pub fn new(window: usize, conn: Option<Connection>) -> Result<Self> {
        if let Some(ref c) = conn {
            init_db(c)?;
        }
        Ok(Self {
            window: window.max(1),
            buffers: DashMap::new(),
            log: conn.map(Mutex::new),
        })
    }

    /// Append a turn to the session window, trimming to the last N, and
    /// persist it best-effort (a write failure is logged, never surfaced).
    pub fn append(&self, session_key: &str, transport: &str, turn: Turn) {
        {
            let mut buf = self.buffers.entry(session_key.to_string()).or_default();
            buf.push_back(turn.clone());
            while buf.len() > self.window {
                buf.pop_front();
            }
        }
        if let Err(e) = self.persist(session_key, transport, &turn, None, 0, 0) {
            warn!(session = session_key, error = %e, "session persistence failed");
        }
    }

    /// Like `append` for assistant turns that carry model/token metadata.
    pub fn append_assistant(
        &self,
        session_key: &str,
        transport: &str,
        turn: Turn,
        model: &str,
        tokens_in: u32,
        tokens_out: u32,
    ) {
        {
            let mut buf = self.buffers.entry(session_key.to_string()).or_default();
            buf.push_back(turn.clone());
            while buf.len() > self.window {
                buf.pop_front();
            }
        }
        if let Err(e) = self.persist(session_key, transport, &turn, Some(model), tokens_in, tokens_out)
        {
            warn!(session = session_key, error = %e, "session persistence failed");
        }
    }

    /// Current window, oldest first. Loads from disk on the first touch of
    /// a session after restart.
    pub fn recent(&self, session_key: &str) -> Vec<Turn> {
        if let Some(buf) = self.buffers.get(session_key) {
            return buf.iter().cloned().collect();
        }
        let restored = self.restore(session_key);
        if !restored.is_empty() {
            debug!(session = session_key, turns = restored.len(), "session restored from disk");
            self.buffers
                .insert(session_key.to_string(), restored.iter().cloned().collect());
        }
        restored
    }

    pub fn clear(&self, session_key: &str) {
        self.buffers.remove(session_key);
    }

    fn persist(
        &self,
        session_key: &str,
        transport: &str,
        turn: &Turn,
        model: Option<&str>,
        tokens_in: u32,
        tokens_out: u32,
    ) -> Result<()> {
        let Some(ref log) = self.log else {
            return Ok(());
        };
        let conn = log.lock().unwrap();
        conn.execute(
            "INSERT INTO conversations
             (session_key, transport, role, content, tool_trace, model_used,
              tokens_in, tokens_out, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                session_key,
                transport,
                turn.role.to_string(),
                turn.text,
                serde_json::to_string(&turn.tool_trace).unwrap_or_else(|_| "[]".to_string()),
                model,
                tokens_in,
                tokens_out,
                turn.at,
            ],
        )?;
        Ok(())
    }

    fn restore(&self, session_key: &str) -> Vec<Turn> {
        let Some(ref log) = self.log else {
            return Vec::new();
        };
        let conn = log.lock().unwrap();
        let mut stmt = match conn.prepare(
            "SELECT role, content, tool_trace, created_at FROM conversations
             WHERE session_key = ?1 ORDER BY id DESC LIMIT ?2",
        ) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "session restore query failed");
                return Vec::new();
            }
        };
        let rows = stmt.query_map(rusqlite::params![session_key, self.window as i64], |row| {
            let role: String = row.get(0)?;
            let trace: String = row.get(2)?;
            Ok(Turn {
                role: role.parse().unwrap_or(TurnRole::User),
                text: row.get(1)?,
                tool_trace: serde_json::from_str(&trace).unwrap_or_default(),
                at: row.get(3)?,
            })
        });
        match rows {
            Ok(rows) => {
                let mut turns: Vec<Turn> = rows.filter_map(|r| r.ok()).collect();
                turns.reverse();
                turns
            }
            Err(e) => {
                warn!(error = %e, "session restore failed");
                Vec::new()
            }
        }
    }
}
