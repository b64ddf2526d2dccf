//! Note tools — the model's mutable working state.
//!
//! Context assembly only ever surfaces note *keys*; these tools are how
//! content gets read and written on demand.

use std::sync::Arc;

use async_trait::async_trait;
use kora_memory::MemoryEngine;
use serde_json::{json, Value};

use super::{Tool, ToolContext, ToolResult};

fn require_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolResult> {
    match input.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(ToolResult::error(format!("'{key}' is required"))),
    }
}

pub struct SaveNoteTool {
    engine: Arc<MemoryEngine>,
}

impl SaveNoteTool {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for SaveNoteTool {
    fn name(&self) -> &str {
        "save_note"
    }
    fn description(&self) -> &str {
        "Create or overwrite a working note. Use notes for evolving state \
         (plans, lists, drafts); content is often JSON."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": { "type": "string", "description": "Note key, e.g. 'meal_plan'" },
                "content": { "type": "string", "description": "Full note content" }
            },
            "required": ["key", "content"]
        })
    }
    async fn execute(&self, _ctx: &ToolContext, input: Value) -> ToolResult {
        let key = match require_str(&input, "key") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let content = match input.get("content").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolResult::error("'content' is required"),
        };
        match self.engine.save_note(key, content) {
            Ok(note) => ToolResult::success(format!("Saved note '{}'.", note.key)),
            Err(e) => ToolResult::error(format!("failed to save note: {e}")),
        }
    }
}

pub struct GetNoteTool {
    engine: Arc<MemoryEngine>,
}

impl GetNoteTool {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for GetNoteTool {
    fn name(&self) -> &str {
        "get_note"
    }
    fn description(&self) -> &str {
        "Read a note's content by key (working or archived)."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "key": { "type": "string" } },
            "required": ["key"]
        })
    }
    async fn execute(&self, _ctx: &ToolContext, input: Value) -> ToolResult {
        let key = match require_str(&input, "key") {
            Ok(v) => v,
            Err(e) => return e,
        };
        match self.engine.get_note(key) {
            Ok(Some(note)) => ToolResult::success(note.content),
            Ok(None) => ToolResult::success(format!("No note named '{key}'.")),
            Err(e) => ToolResult::error(format!("failed to read note: {e}")),
        }
    }
}

pub struct ArchiveNoteTool {
    engine: Arc<MemoryEngine>,
}

impl ArchiveNoteTool {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for ArchiveNoteTool {
    fn name(&self) -> &str {
        "archive_note"
    }
    fn description(&self) -> &str {
        "Move a working note to the archive, optionally renaming it \
         (e.g. 'meal_plan' -> 'meal_plan_2026w31')."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": { "type": "string" },
                "new_key": { "type": "string", "description": "Defaults to the old key" }
            },
            "required": ["key"]
        })
    }
    async fn execute(&self, _ctx: &ToolContext, input: Value) -> ToolResult {
        let key = match require_str(&input, "key") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let new_key = input
            .get("new_key")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(key);
        match self.engine.archive_note(key, new_key) {
            Ok(note) => ToolResult::success(format!("Archived as '{}'.", note.key)),
            Err(e) => ToolResult::error(format!("failed to archive note: {e}")),
        }
    }
}

pub struct ListNotesTool {
    engine: Arc<MemoryEngine>,
}

impl ListNotesTool {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for ListNotesTool {
    fn name(&self) -> &str {
        "list_notes"
    }
    fn description(&self) -> &str {
        "List note keys. tier 'working' (default) or 'archive' with an \
         optional substring pattern."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tier": { "type": "string", "enum": ["working", "archive"] },
                "pattern": { "type": "string" }
            }
        })
    }
    async fn execute(&self, _ctx: &ToolContext, input: Value) -> ToolResult {
        let tier = input.get("tier").and_then(|v| v.as_str()).unwrap_or("working");
        let result = if tier == "archive" {
            let pattern = input.get("pattern").and_then(|v| v.as_str()).unwrap_or("");
            self.engine.list_archived_notes(pattern)
        } else {
            self.engine.list_notes()
        };
        match result {
            Ok(notes) if notes.is_empty() => ToolResult::success("No notes."),
            Ok(notes) => {
                let lines: Vec<String> = notes
                    .iter()
                    .map(|n| format!("- {} ({})", n.key, n.updated_at))
                    .collect();
                ToolResult::success(lines.join("\n"))
            }
            Err(e) => ToolResult::error(format!("failed to list notes: {e}")),
        }
    }
}

pub struct RestoreNoteTool {
    engine: Arc<MemoryEngine>,
}

impl RestoreNoteTool {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for RestoreNoteTool {
    fn name(&self) -> &str {
        "restore_note"
    }
    fn description(&self) -> &str {
        "Bring an archived note back to the working tier."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "key": { "type": "string" } },
            "required": ["key"]
        })
    }
    async fn execute(&self, _ctx: &ToolContext, input: Value) -> ToolResult {
        let key = match require_str(&input, "key") {
            Ok(v) => v,
            Err(e) => return e,
        };
        match self.engine.restore_note(key) {
            Ok(note) => ToolResult::success(format!("Restored '{}' to working notes.", note.key)),
            Err(e) => ToolResult::error(format!("failed to restore note: {e}")),
        }
    }
}

pub struct DeleteNoteTool {
    engine: Arc<MemoryEngine>,
}

impl DeleteNoteTool {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for DeleteNoteTool {
    fn name(&self) -> &str {
        "delete_note"
    }
    fn description(&self) -> &str {
        "Delete a note permanently. Prefer archive_note unless the user \
         explicitly wants it gone."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "key": { "type": "string" } },
            "required": ["key"]
        })
    }
    async fn execute(&self, _ctx: &ToolContext, input: Value) -> ToolResult {
        let key = match require_str(&input, "key") {
            Ok(v) => v,
            Err(e) => return e,
        };
        match self.engine.delete_note(key) {
            Ok(()) => ToolResult::success(format!("Deleted note '{key}'.")),
            Err(e) => ToolResult::error(format!("failed to delete note: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kora_memory::db::open_in_memory;
    use kora_memory::embed::HashEmbedder;
    use kora_memory::engine::EngineConfig;
    use kora_memory::types::Extraction;
    use kora_memory::SqliteStore;

    struct NoopExtractor;

    #[async_trait]
    impl kora_memory::Extractor for NoopExtractor {
        async fn extract(
            &self,
            _u: &str,
            _a: &str,
        ) -> kora_memory::Result<Extraction> {
            Ok(Extraction::default())
        }
    }

    fn engine() -> Arc<MemoryEngine> {
        Arc::new(MemoryEngine::new(
            Arc::new(SqliteStore::new(open_in_memory(8).unwrap())),
            Arc::new(HashEmbedder::new(8)),
            Arc::new(NoopExtractor),
            EngineConfig::default(),
        ))
    }

    #[tokio::test]
    async fn save_then_get_roundtrips_verbatim() {
        // The meal-plan flow: save, read back, update in place.
        let eng = engine();
        let ctx = ToolContext::new(1, 1, "t:1");
        let content = r#"{"mon":{"dish":"pasta","done":false}}"#;

        let save = SaveNoteTool::new(Arc::clone(&eng));
        let result = save
            .execute(&ctx, json!({ "key": "meal_plan", "content": content }))
            .await;
        assert!(!result.is_error);

        let get = GetNoteTool::new(Arc::clone(&eng));
        let result = get.execute(&ctx, json!({ "key": "meal_plan" })).await;
        assert_eq!(result.content, content);

        // Update in place, as the model does after "I made the pasta".
        let updated = r#"{"mon":{"dish":"pasta","done":true}}"#;
        save.execute(&ctx, json!({ "key": "meal_plan", "content": updated }))
            .await;
        let result = get.execute(&ctx, json!({ "key": "meal_plan" })).await;
        assert_eq!(result.content, updated);
    }

    #[tokio::test]
    async fn missing_args_are_validation_errors() {
        let eng = engine();
        let ctx = ToolContext::new(1, 1, "t:1");
        let save = SaveNoteTool::new(eng);
        let result = save.execute(&ctx, json!({})).await;
        assert!(result.is_error);
        assert!(result.content.contains("required"));
    }
}
