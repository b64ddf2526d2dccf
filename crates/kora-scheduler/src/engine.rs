use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use kora_core::ChatId;
use rusqlite::Connection;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    db::init_db,
    error::{Result, SchedulerError},
    schedule::CronSchedule,
    types::{CronJob, WakeEvent},
};

/// Shared handle for cron management (add/list/pause/remove) while the
/// engine loop runs.
///
/// Uses its own `Connection` so tool handlers can manage crons without
/// conflicting with the engine's polling queries.
pub struct CronHandle {
    conn: Arc<Mutex<Connection>>,
    tz: Tz,
}

impl CronHandle {
    pub fn new(conn: Connection, tz: Tz) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            tz,
        })
    }

    /// Validate the schedule, compute the first fire time, and persist.
    pub fn add(
        &self,
        keyword: &str,
        schedule: &str,
        chat_id: ChatId,
        one_time: bool,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<CronJob> {
        let parsed = CronSchedule::parse(schedule)?;
        let now = Utc::now();
        let next = parsed
            .next_after(now, self.tz)
            .ok_or_else(|| SchedulerError::InvalidSchedule("no future occurrence".to_string()))?;
        let id = Uuid::new_v4().to_string();
        let now_str = now.to_rfc3339();
        let next_str = next.to_rfc3339();
        let expires_str = expires_at.map(|t| t.to_rfc3339());

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO crons
             (id, keyword, schedule, chat_id, next_run, paused_until, expires_at,
              one_time, last_fire, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, NULL, ?8)",
            rusqlite::params![id, keyword, schedule, chat_id, next_str, expires_str, one_time, now_str],
        )?;
        info!(cron_id = %id, keyword, schedule, "cron added");
        Ok(CronJob {
            id,
            keyword: keyword.to_string(),
            schedule: schedule.to_string(),
            chat_id,
            next_run: Some(next_str),
            paused_until: None,
            expires_at: expires_str,
            one_time,
            last_fire: None,
            created_at: now_str,
        })
    }

    /// All crons, optionally restricted to one chat, oldest first.
    pub fn list(&self, chat_id: Option<ChatId>) -> Result<Vec<CronJob>> {
        let conn = self.conn.lock().unwrap();
        let mut out = Vec::new();
        match chat_id {
            Some(chat) => {
                let mut stmt = conn.prepare(&format!(
                    "{CRON_COLS} WHERE chat_id = ?1 ORDER BY created_at"
                ))?;
                let rows = stmt.query_map([chat], row_to_cron)?;
                out.extend(rows.filter_map(|r| r.ok()));
            }
            None => {
                let mut stmt = conn.prepare(&format!("{CRON_COLS} ORDER BY created_at"))?;
                let rows = stmt.query_map([], row_to_cron)?;
                out.extend(rows.filter_map(|r| r.ok()));
            }
        }
        Ok(out)
    }

    /// Skip fires until `until`. The row stays; a stale `next_run` fires on
    /// the first poll after the pause lapses.
    pub fn pause(&self, id: &str, until: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE crons SET paused_until = ?1 WHERE id = ?2",
            rusqlite::params![until.to_rfc3339(), id],
        )?;
        if n == 0 {
            return Err(SchedulerError::NotFound { id: id.to_string() });
        }
        info!(cron_id = %id, until = %until, "cron paused");
        Ok(())
    }

    pub fn resume(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("UPDATE crons SET paused_until = NULL WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM crons WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::NotFound { id: id.to_string() });
        }
        info!(cron_id = %id, "cron removed");
        Ok(())
    }
}

/// Core cron engine: polls for due rows and delivers wake events to the
/// agent loop through a bounded channel.
pub struct CronEngine {
    conn: Connection,
    tz: Tz,
    wake_tx: mpsc::Sender<WakeEvent>,
}

impl CronEngine {
    /// Create a new engine, initialising the table if needed.
    pub fn new(conn: Connection, tz: Tz, wake_tx: mpsc::Sender<WakeEvent>) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { conn, tz, wake_tx })
    }

    /// Main loop: poll every `poll_secs`, reap every `reap_secs`, until
    /// shutdown broadcasts `true`.
    pub async fn run(self, poll_secs: u64, reap_secs: u64, mut shutdown: watch::Receiver<bool>) {
        info!(poll_secs, "cron engine started");
        let mut poll = tokio::time::interval(std::time::Duration::from_secs(poll_secs.max(1)));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut reap = tokio::time::interval(std::time::Duration::from_secs(reap_secs.max(1)));
        reap.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.tick() {
                        error!("cron tick error: {e}");
                    }
                }
                _ = reap.tick() => {
                    if let Err(e) = self.reap() {
                        error!("cron reap error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("cron engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Fire every due cron: active (`next_run` arrived), not paused, not
    /// expired. Delivery is fire-and-forget; a full wake queue drops the
    /// event with a warning and the cron simply fires again next time.
    fn tick(&self) -> Result<()> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        // Collect eagerly so the statement is dropped before the updates.
        let due: Vec<CronJob> = {
            let mut stmt = self.conn.prepare_cached(&format!(
                "{CRON_COLS}
                 WHERE next_run IS NOT NULL AND next_run <= ?1
                   AND (paused_until IS NULL OR paused_until <= ?1)
                   AND (expires_at IS NULL OR expires_at > ?1)"
            ))?;
            let rows = stmt.query_map([&now_str], row_to_cron)?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        for job in due {
            let (next, expires) = if job.one_time {
                // At most one fire: clear next_run and let the reaper
                // collect the row an hour later.
                (None, Some((now + Duration::hours(1)).to_rfc3339()))
            } else {
                match CronSchedule::parse(&job.schedule) {
                    Ok(s) => (
                        s.next_after(now, self.tz).map(|t| t.to_rfc3339()),
                        job.expires_at.clone(),
                    ),
                    Err(e) => {
                        error!(cron_id = %job.id, "bad schedule on disk, disabling: {e}");
                        (None, job.expires_at.clone())
                    }
                }
            };

            self.conn.execute(
                "UPDATE crons SET next_run = ?1, last_fire = ?2, expires_at = ?3 WHERE id = ?4",
                rusqlite::params![next, now_str, expires, job.id],
            )?;

            info!(cron_id = %job.id, keyword = %job.keyword, "cron fired");
            let wake = WakeEvent {
                chat_id: job.chat_id,
                keyword: job.keyword,
                one_time: job.one_time,
            };
            if self.wake_tx.try_send(wake).is_err() {
                warn!(cron_id = %job.id, "wake queue full or closed, event dropped");
            }
        }
        Ok(())
    }

    /// Delete rows whose expiry has passed.
    fn reap(&self) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let n = self.conn.execute(
            "DELETE FROM crons WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            [&now],
        )?;
        if n > 0 {
            info!(count = n, "expired crons reaped");
        }
        Ok(())
    }
}

const CRON_COLS: &str = "SELECT id, keyword, schedule, chat_id, next_run, paused_until, \
     expires_at, one_time, last_fire, created_at FROM crons";

fn row_to_cron(row: &rusqlite::Row<'_>) -> rusqlite::Result<CronJob> {
    Ok(CronJob {
        id: row.get(0)?,
        keyword: row.get(1)?,
        schedule: row.get(2)?,
        chat_id: row.get(3)?,
        next_run: row.get(4)?,
        paused_until: row.get(5)?,
        expires_at: row.get(6)?,
        one_time: row.get::<_, i64>(7)? != 0,
        last_fire: row.get(8)?,
        created_at: row.get(9)?,
    })
}
