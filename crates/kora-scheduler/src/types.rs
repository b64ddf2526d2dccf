use kora_core::ChatId;
use serde::{Deserialize, Serialize};

/// A persisted cron trigger.
///
/// The `keyword` doubles as the memory query when the trigger fires: the
/// agent loop recalls it and decides whether anything is worth sending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    /// UUID v4 string, the primary key.
    pub id: String,
    /// Memory query injected into the wake message.
    pub keyword: String,
    /// Raw schedule string: cron expression or `@every <duration>`.
    pub schedule: String,
    /// Chat the wake is delivered to.
    pub chat_id: ChatId,
    /// ISO-8601 UTC instant of the next planned fire; `None` once exhausted.
    pub next_run: Option<String>,
    /// While this instant is in the future the scheduler skips the row.
    pub paused_until: Option<String>,
    /// Row is reaped once this instant passes.
    pub expires_at: Option<String>,
    /// Fire at most once, then expire an hour later.
    pub one_time: bool,
    /// ISO-8601 UTC instant of the most recent fire, if any.
    pub last_fire: Option<String>,
    pub created_at: String,
}

/// Event handed to the agent loop when a cron fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeEvent {
    pub chat_id: ChatId,
    pub keyword: String,
    pub one_time: bool,
}
