//! `schedule` tool — keyword-triggered crons via the scheduler handle.
//!
//! The model calls this for "remind me to take meds every day at 20:00".
//! The keyword is what gets recalled at fire time, so the tool description
//! pushes the model toward short, memorable keywords.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use kora_scheduler::CronHandle;
use serde_json::{json, Value};

use super::{Tool, ToolContext, ToolResult};

pub struct CronTool {
    handle: Arc<CronHandle>,
}

impl CronTool {
    pub fn new(handle: Arc<CronHandle>) -> Self {
        Self { handle }
    }

    fn add(&self, ctx: &ToolContext, input: &Value) -> ToolResult {
        let Some(keyword) = input.get("keyword").and_then(|v| v.as_str()) else {
            return ToolResult::error("'keyword' is required for add");
        };
        let Some(schedule) = input.get("schedule").and_then(|v| v.as_str()) else {
            return ToolResult::error("'schedule' is required for add");
        };
        let one_time = input.get("one_time").and_then(|v| v.as_bool()).unwrap_or(false);
        let expires_at = input
            .get("expires_in_days")
            .and_then(|v| v.as_i64())
            .map(|d| Utc::now() + Duration::days(d));

        match self
            .handle
            .add(keyword, schedule, ctx.chat_id, one_time, expires_at)
        {
            Ok(job) => ToolResult::success(format!(
                "Scheduled '{}' ({}). First fire: {}. Id: {}",
                job.keyword,
                job.schedule,
                job.next_run.as_deref().unwrap_or("unknown"),
                job.id,
            )),
            Err(e) => ToolResult::error(format!("failed to schedule: {e}")),
        }
    }

    fn list(&self, ctx: &ToolContext) -> ToolResult {
        match self.handle.list(Some(ctx.chat_id)) {
            Ok(jobs) if jobs.is_empty() => ToolResult::success("No schedules for this chat."),
            Ok(jobs) => {
                let lines: Vec<String> = jobs
                    .iter()
                    .map(|j| {
                        let state = if j.paused_until.is_some() {
                            " [paused]"
                        } else {
                            ""
                        };
                        format!(
                            "- {} '{}' ({}) next: {}{}",
                            j.id,
                            j.keyword,
                            j.schedule,
                            j.next_run.as_deref().unwrap_or("never"),
                            state,
                        )
                    })
                    .collect();
                ToolResult::success(lines.join("\n"))
            }
            Err(e) => ToolResult::error(format!("failed to list schedules: {e}")),
        }
    }

    fn pause(&self, input: &Value) -> ToolResult {
        let Some(id) = input.get("id").and_then(|v| v.as_str()) else {
            return ToolResult::error("'id' is required for pause");
        };
        let days = input.get("days").and_then(|v| v.as_i64()).unwrap_or(1);
        match self.handle.pause(id, Utc::now() + Duration::days(days)) {
            Ok(()) => ToolResult::success(format!("Paused for {days} day(s).")),
            Err(e) => ToolResult::error(format!("failed to pause: {e}")),
        }
    }

    fn resume(&self, input: &Value) -> ToolResult {
        let Some(id) = input.get("id").and_then(|v| v.as_str()) else {
            return ToolResult::error("'id' is required for resume");
        };
        match self.handle.resume(id) {
            Ok(()) => ToolResult::success("Resumed."),
            Err(e) => ToolResult::error(format!("failed to resume: {e}")),
        }
    }

    fn remove(&self, input: &Value) -> ToolResult {
        let Some(id) = input.get("id").and_then(|v| v.as_str()) else {
            return ToolResult::error("'id' is required for remove");
        };
        match self.handle.remove(id) {
            Ok(()) => ToolResult::success("Removed."),
            Err(e) => ToolResult::error(format!("failed to remove: {e}")),
        }
    }
}

#[async_trait]
impl Tool for CronTool {
    fn name(&self) -> &str {
        "schedule"
    }
    fn description(&self) -> &str {
        "Manage recurring triggers. Actions: add (keyword + schedule: cron \
         expression like '0 20 * * *' or '@every 10m', optional one_time and \
         expires_in_days), list, pause (id, days), resume (id), remove (id). \
         At fire time the keyword is recalled from memory, so keep it short \
         and topical (e.g. 'meds')."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["add", "list", "pause", "resume", "remove"] },
                "keyword": { "type": "string" },
                "schedule": { "type": "string" },
                "one_time": { "type": "boolean" },
                "expires_in_days": { "type": "integer", "minimum": 1 },
                "id": { "type": "string" },
                "days": { "type": "integer", "minimum": 1 }
            },
            "required": ["action"]
        })
    }
    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        match input.get("action").and_then(|v| v.as_str()) {
            Some("add") => self.add(ctx, &input),
            Some("list") => self.list(ctx),
            Some("pause") => self.pause(&input),
            Some("resume") => self.resume(&input),
            Some("remove") => self.remove(&input),
            _ => ToolResult::error("'action' must be add|list|pause|resume|remove"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn tool() -> (tempfile::TempDir, CronTool) {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("crons.db")).unwrap();
        let handle = Arc::new(CronHandle::new(conn, chrono_tz::UTC).unwrap());
        (dir, CronTool::new(handle))
    }

    #[tokio::test]
    async fn add_and_list_are_chat_scoped() {
        // Daily reminder with a two-week expiry, listed only in its chat.
        let (_dir, tool) = tool();
        let ctx = ToolContext::new(42, 1, "t:42");
        let result = tool
            .execute(
                &ctx,
                json!({
                    "action": "add",
                    "keyword": "meds",
                    "schedule": "0 20 * * *",
                    "expires_in_days": 14
                }),
            )
            .await;
        assert!(!result.is_error, "{}", result.content);
        assert!(result.content.contains("meds"));

        let listed = tool.execute(&ctx, json!({ "action": "list" })).await;
        assert!(listed.content.contains("meds"));

        let other_chat = ToolContext::new(99, 1, "t:99");
        let listed = tool.execute(&other_chat, json!({ "action": "list" })).await;
        assert!(listed.content.contains("No schedules"));
    }

    #[tokio::test]
    async fn bad_schedule_is_a_friendly_error() {
        let (_dir, tool) = tool();
        let ctx = ToolContext::new(1, 1, "t:1");
        let result = tool
            .execute(
                &ctx,
                json!({ "action": "add", "keyword": "x", "schedule": "whenever" }),
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("invalid schedule"));
    }
}
