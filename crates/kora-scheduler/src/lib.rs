//! `kora-scheduler` — keyword-triggered cron engine with SQLite persistence.
//!
//! # Overview
//!
//! Crons are persisted to a `crons` table in the shared database file. The
//! [`engine::CronEngine`] polls every 30 seconds (configurable) and, for
//! each due row, advances `next_run` and delivers a [`types::WakeEvent`] to
//! the agent loop through a bounded channel. The keyword on the event is a
//! memory query: at fire time the loop recalls it and lets the model decide
//! whether a notification is worth sending.
//!
//! # Schedule forms
//!
//! | Form                | Behaviour                                        |
//! |---------------------|--------------------------------------------------|
//! | `0 20 * * *`        | 5-field cron, evaluated in the configured zone   |
//! | `30 0 20 * * *`     | 6-field cron with seconds                        |
//! | `@every 10m`        | Fixed interval                                   |
//!
//! One-time crons fire once, then expire an hour later and are reaped.
//! Paused crons are skipped but kept.

pub mod db;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod types;

pub use engine::{CronEngine, CronHandle};
pub use error::{Result, SchedulerError};
pub use schedule::CronSchedule;
pub use types::{CronJob, WakeEvent};
