//! Usage ledger: one row per LLM call, priced from an in-process table,
//! with the aggregations the budget tools surface (today / week / month /
//! arbitrary range, grouped by model or by day).
//!
//! Lives in the same SQLite file as the store but runs over its own
//! connection, so accounting writes never queue behind fact transactions.

use std::sync::Mutex;

use chrono::{DateTime, Datelike, Duration, Utc};
use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;

/// USD per million tokens (input, output). Prefix-matched, first hit wins.
const PRICE_TABLE: &[(&str, f64, f64)] = &[
    ("claude-opus", 15.0, 75.0),
    ("claude-sonnet", 3.0, 15.0),
    ("claude-haiku", 1.0, 5.0),
    ("gpt-4o-mini", 0.15, 0.6),
    ("gpt-4o", 2.5, 10.0),
    ("kimi", 0.6, 2.5),
];

/// Price for a model in USD/MTok; unknown models cost nothing (local
/// Ollama etc.).
fn price_for(model: &str) -> (f64, f64) {
    PRICE_TABLE
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, i, o)| (*i, *o))
        .unwrap_or((0.0, 0.0))
}

/// Aggregated usage over some slice of the ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageTotals {
    pub calls: i64,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost_usd: f64,
}

/// One aggregation bucket (a model name or a day).
#[derive(Debug, Clone)]
pub struct UsageBucket {
    pub key: String,
    pub totals: UsageTotals,
}

pub struct UsageLedger {
    conn: Mutex<Connection>,
}

impl UsageLedger {
    /// Wrap a connection and create the ledger table if missing.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS usage (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                provider   TEXT NOT NULL,
                model      TEXT NOT NULL,
                tokens_in  INTEGER NOT NULL,
                tokens_out INTEGER NOT NULL,
                cost_usd   REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_usage_created ON usage(created_at);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record one call; returns the computed USD cost.
    pub fn record(
        &self,
        provider: &str,
        model: &str,
        tokens_in: u32,
        tokens_out: u32,
    ) -> Result<f64> {
        let (in_price, out_price) = price_for(model);
        let cost = tokens_in as f64 / 1e6 * in_price + tokens_out as f64 / 1e6 * out_price;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO usage (created_at, provider, model, tokens_in, tokens_out, cost_usd)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                Utc::now().to_rfc3339(),
                provider,
                model,
                tokens_in,
                tokens_out,
                cost
            ],
        )?;
        debug!(provider, model, tokens_in, tokens_out, cost, "usage recorded");
        Ok(cost)
    }

    pub fn today(&self) -> Result<UsageTotals> {
        let now = Utc::now();
        let start = now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        self.range(start, now)
    }

    /// Monday 00:00 UTC through now.
    pub fn this_week(&self) -> Result<UsageTotals> {
        let now = Utc::now();
        let days_back = now.date_naive().weekday().num_days_from_monday() as i64;
        let start = (now.date_naive() - Duration::days(days_back))
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        self.range(start, now)
    }

    pub fn this_month(&self) -> Result<UsageTotals> {
        let now = Utc::now();
        let start = now
            .date_naive()
            .with_day(1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        self.range(start, now)
    }

    pub fn range(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<UsageTotals> {
        let conn = self.conn.lock().unwrap();
        let totals = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(tokens_in), 0), COALESCE(SUM(tokens_out), 0),
                    COALESCE(SUM(cost_usd), 0.0)
             FROM usage WHERE created_at >= ?1 AND created_at <= ?2",
            rusqlite::params![since.to_rfc3339(), until.to_rfc3339()],
            |row| {
                Ok(UsageTotals {
                    calls: row.get(0)?,
                    tokens_in: row.get(1)?,
                    tokens_out: row.get(2)?,
                    cost_usd: row.get(3)?,
                })
            },
        )?;
        Ok(totals)
    }

    /// Range totals grouped by model, most expensive first.
    pub fn by_model(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<UsageBucket>> {
        self.grouped("model", since, until)
    }

    /// Range totals grouped by UTC day, newest first.
    pub fn by_day(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<UsageBucket>> {
        self.grouped("substr(created_at, 1, 10)", since, until)
    }

    fn grouped(
        &self,
        key_expr: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<UsageBucket>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {key_expr} AS k, COUNT(*), SUM(tokens_in), SUM(tokens_out), SUM(cost_usd)
             FROM usage WHERE created_at >= ?1 AND created_at <= ?2
             GROUP BY k ORDER BY SUM(cost_usd) DESC, k DESC"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![since.to_rfc3339(), until.to_rfc3339()],
            |row| {
                Ok(UsageBucket {
                    key: row.get(0)?,
                    totals: UsageTotals {
                        calls: row.get(1)?,
                        tokens_in: row.get(2)?,
                        tokens_out: row.get(3)?,
                        cost_usd: row.get(4)?,
                    },
                })
            },
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> UsageLedger {
        UsageLedger::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn record_prices_known_models() {
        let l = ledger();
        let cost = l.record("anthropic", "claude-sonnet-4-6", 1_000_000, 100_000).unwrap();
        // 1M in @ $3 + 100k out @ $15/M = 3 + 1.5.
        assert!((cost - 4.5).abs() < 1e-9);

        let free = l.record("ollama", "qwen3:8b", 500, 500).unwrap();
        assert_eq!(free, 0.0);
    }

    #[test]
    fn aggregations_cover_today_and_group_by_model() {
        let l = ledger();
        l.record("anthropic", "claude-haiku-4-5", 1000, 1000).unwrap();
        l.record("anthropic", "claude-haiku-4-5", 1000, 1000).unwrap();
        l.record("anthropic", "claude-sonnet-4-6", 2000, 500).unwrap();

        let today = l.today().unwrap();
        assert_eq!(today.calls, 3);
        assert_eq!(today.tokens_in, 4000);
        assert!(today.cost_usd > 0.0);

        assert!(l.this_week().unwrap().calls >= today.calls);
        assert_eq!(l.this_month().unwrap().calls, 3);

        let by_model = l
            .by_model(Utc::now() - Duration::hours(1), Utc::now())
            .unwrap();
        assert_eq!(by_model.len(), 2);
        let haiku = by_model.iter().find(|b| b.key.starts_with("claude-haiku")).unwrap();
        assert_eq!(haiku.totals.calls, 2);

        let by_day = l
            .by_day(Utc::now() - Duration::hours(1), Utc::now())
            .unwrap();
        assert_eq!(by_day.len(), 1);
        assert_eq!(by_day[0].totals.calls, 3);
    }

    #[test]
    fn empty_range_is_zero() {
        let l = ledger();
        let t = l
            .range(Utc::now() - Duration::days(2), Utc::now() - Duration::days(1))
            .unwrap();
        assert_eq!(t, UsageTotals::default());
    }
}
