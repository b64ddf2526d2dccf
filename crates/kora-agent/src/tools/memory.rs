//! Explicit memory tools: search on demand, and the synchronous AddFact
//! path (unlike background extraction, failures here surface to the model).

use std::sync::Arc;

use async_trait::async_trait;
use kora_core::DomainId;
use kora_memory::types::RecallOptions;
use kora_memory::{Domain, MemoryEngine};
use serde_json::{json, Value};

use super::{Tool, ToolContext, ToolResult};

pub struct MemorySearchTool {
    engine: Arc<MemoryEngine>,
}

impl MemorySearchTool {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }
    fn description(&self) -> &str {
        "Search long-term memory beyond what is already in context. \
         Optionally restrict to domain ids (1-14)."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "domains": {
                    "type": "array",
                    "items": { "type": "integer", "minimum": 1, "maximum": 14 }
                },
                "limit": { "type": "integer", "minimum": 1, "maximum": 50 }
            },
            "required": ["query"]
        })
    }
    async fn execute(&self, _ctx: &ToolContext, input: Value) -> ToolResult {
        let Some(query) = input.get("query").and_then(|v| v.as_str()) else {
            return ToolResult::error("'query' is required");
        };
        let domains: Vec<DomainId> = input
            .get("domains")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|d| d.as_i64()).collect())
            .unwrap_or_else(|| (1..=14).collect());
        let limit = input.get("limit").and_then(|v| v.as_u64()).unwrap_or(10) as usize;

        match self
            .engine
            .recall(query, &domains, &[], limit, &RecallOptions::default())
            .await
        {
            Ok(result) if result.facts.is_empty() => {
                ToolResult::success("No matching memories.")
            }
            Ok(result) => {
                let lines: Vec<String> = result
                    .facts
                    .iter()
                    .map(|sf| {
                        let domain = Domain::from_id(sf.fact.domain_id)
                            .map(|d| d.name())
                            .unwrap_or("?");
                        format!(
                            "- [{domain}] {}: {} (confidence {:.2})",
                            sf.fact.field, sf.fact.value, sf.fact.confidence
                        )
                    })
                    .collect();
                ToolResult::success(lines.join("\n"))
            }
            Err(e) => ToolResult::error(format!("memory search failed: {e}")),
        }
    }
}

pub struct RememberFactTool {
    engine: Arc<MemoryEngine>,
}

impl RememberFactTool {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for RememberFactTool {
    fn name(&self) -> &str {
        "remember_fact"
    }
    fn description(&self) -> &str {
        "Store one durable fact immediately (background extraction handles \
         most turns; use this when the user explicitly asks you to remember)."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "domain": { "type": "integer", "minimum": 1, "maximum": 14 },
                "field": { "type": "string", "description": "snake_case key, e.g. 'city'" },
                "value": { "type": "string" },
                "confidence": { "type": "number", "minimum": 0, "maximum": 1 }
            },
            "required": ["domain", "field", "value"]
        })
    }
    async fn execute(&self, _ctx: &ToolContext, input: Value) -> ToolResult {
        let Some(domain) = input.get("domain").and_then(|v| v.as_i64()) else {
            return ToolResult::error("'domain' is required");
        };
        if Domain::from_id(domain).is_none() {
            return ToolResult::error(format!("domain {domain} is not in 1-14"));
        }
        let Some(field) = input.get("field").and_then(|v| v.as_str()) else {
            return ToolResult::error("'field' is required");
        };
        let Some(value) = input.get("value").and_then(|v| v.as_str()) else {
            return ToolResult::error("'value' is required");
        };
        let confidence = input
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.8);

        match self
            .engine
            .add_fact(None, domain, field, value, confidence)
            .await
        {
            Ok(fact) => {
                let note = match fact.supersedes {
                    Some(old) => format!(" (replaces a previous value, fact {old})"),
                    None => String::new(),
                };
                ToolResult::success(format!("Remembered {field} = {value}{note}."))
            }
            Err(e) => ToolResult::error(format!("failed to store fact: {e}")),
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
        async fn extract(&self, _u: &str, _a: &str) -> kora_memory::Result<Extraction> {
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
    async fn remember_then_search_finds_the_fact() {
        let eng = engine();
        let ctx = ToolContext::new(1, 1, "t:1");

        let remember = RememberFactTool::new(Arc::clone(&eng));
        let result = remember
            .execute(&ctx, json!({ "domain": 9, "field": "city", "value": "LA" }))
            .await;
        assert!(!result.is_error);

        let search = MemorySearchTool::new(eng);
        let result = search
            .execute(&ctx, json!({ "query": "city", "domains": [9] }))
            .await;
        assert!(result.content.contains("LA"));
        assert!(result.content.contains("[Place]"));
    }

    #[tokio::test]
    async fn bad_domain_is_rejected() {
        let eng = engine();
        let ctx = ToolContext::new(1, 1, "t:1");
        let remember = RememberFactTool::new(eng);
        let result = remember
            .execute(&ctx, json!({ "domain": 99, "field": "x", "value": "y" }))
            .await;
        assert!(result.is_error);
    }
}
