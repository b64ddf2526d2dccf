//! Schedule parsing and next-run computation.
//!
//! Two forms are accepted: standard 5- or 6-field cron expressions
//! (evaluated in the configured IANA zone) and `@every <duration>`
//! intervals (`@every 10m`, `@every 1h30m`). Stored timestamps are always
//! UTC; only evaluation happens in the zone.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::{Result, SchedulerError};

/// A parsed schedule, kept alongside its raw string form.
#[derive(Debug, Clone)]
pub enum CronSchedule {
    /// Cron expression. The inner schedule is seconds-resolution; 5-field
    /// input gets a `0` seconds field prepended.
    Expr(Box<cron::Schedule>),
    /// Fixed interval.
    Every(Duration),
}

impl CronSchedule {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix("@every") {
            let dur = parse_duration(rest.trim())
                .ok_or_else(|| SchedulerError::InvalidSchedule(format!("bad interval: {raw}")))?;
            if dur.is_zero() {
                return Err(SchedulerError::InvalidSchedule(
                    "interval must be positive".to_string(),
                ));
            }
            return Ok(Self::Every(dur));
        }

        let fields = raw.split_whitespace().count();
        let normalized = match fields {
            5 => format!("0 {raw}"),
            6 => raw.to_string(),
            n => {
                return Err(SchedulerError::InvalidSchedule(format!(
                    "expected 5 or 6 cron fields, got {n}"
                )))
            }
        };
        let schedule = cron::Schedule::from_str(&normalized)
            .map_err(|e| SchedulerError::InvalidSchedule(e.to_string()))?;
        Ok(Self::Expr(Box::new(schedule)))
    }

    /// Next UTC fire instant strictly after `from`, evaluating cron fields
    /// in `tz`. `None` when the expression has no future occurrence.
    pub fn next_after(&self, from: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        match self {
            Self::Expr(schedule) => schedule
                .after(&from.with_timezone(&tz))
                .next()
                .map(|dt| dt.with_timezone(&Utc)),
            Self::Every(dur) => Some(from + chrono::Duration::from_std(*dur).ok()?),
        }
    }
}

/// Parse `10s`, `10m`, `2h`, `1d`, or compounds like `1h30m`.
fn parse_duration(s: &str) -> Option<Duration> {
    if s.is_empty() {
        return None;
    }
    let mut total = Duration::ZERO;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: u64 = digits.parse().ok()?;
        digits.clear();
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 24 * 60 * 60,
            _ => return None,
        };
        total += Duration::from_secs(n * unit);
    }
    if !digits.is_empty() {
        // Trailing bare number has no unit.
        return None;
    }
    Some(total)
}
