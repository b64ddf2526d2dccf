//! `usage` tool — surface the budget ledger in chat.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use kora_memory::budget::{UsageLedger, UsageTotals};
use serde_json::{json, Value};

use super::{Tool, ToolContext, ToolResult};

pub struct UsageTool {
    ledger: Arc<UsageLedger>,
}

impl UsageTool {
    pub fn new(ledger: Arc<UsageLedger>) -> Self {
        Self { ledger }
    }
}

fn line(label: &str, t: &UsageTotals) -> String {
    format!(
        "{label}: {} calls, {} in / {} out tokens, ${:.4}",
        t.calls, t.tokens_in, t.tokens_out, t.cost_usd
    )
}

#[async_trait]
impl Tool for UsageTool {
    fn name(&self) -> &str {
        "usage"
    }
    fn description(&self) -> &str {
        "Report LLM token usage and cost: today, this week, this month, \
         optionally broken down per model over the last 30 days."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "by_model": { "type": "boolean" }
            }
        })
    }
    async fn execute(&self, _ctx: &ToolContext, input: Value) -> ToolResult {
        let mut out = Vec::new();
        for (label, totals) in [
            ("Today", self.ledger.today()),
            ("This week", self.ledger.this_week()),
            ("This month", self.ledger.this_month()),
        ] {
            match totals {
                Ok(t) => out.push(line(label, &t)),
                Err(e) => return ToolResult::error(format!("usage query failed: {e}")),
            }
        }

        if input.get("by_model").and_then(|v| v.as_bool()).unwrap_or(false) {
            let now = Utc::now();
            match self.ledger.by_model(now - Duration::days(30), now) {
                Ok(buckets) => {
                    out.push("Per model (30d):".to_string());
                    for b in buckets {
                        out.push(format!("  {}", line(&b.key, &b.totals)));
                    }
                }
                Err(e) => return ToolResult::error(format!("usage query failed: {e}")),
            }
        }
        ToolResult::success(out.join("\n"))
    }
}
