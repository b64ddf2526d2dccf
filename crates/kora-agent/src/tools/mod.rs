//! Tool system for the agent loop.
//!
//! Defines the `Tool` trait all tools implement, the per-call
//! `ToolContext` handlers read instead of extra arguments, and the
//! registry that dispatches calls (gating dangerous ones behind the
//! approval manager).

pub mod cron;
pub mod memory;
pub mod notes;
pub mod registry;
pub mod tool_loop;
pub mod usage;

use async_trait::async_trait;
use kora_core::{ChatId, MediaItem, UserId};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::provider::ToolDefinition;

/// Per-call context propagated to handlers. Everything request-scoped a
/// tool might need lives here, not in handler arguments.
#[derive(Clone)]
pub struct ToolContext {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub session_id: String,
    /// Media items attached to the inbound message, if any.
    pub media: Vec<MediaItem>,
    /// When set, tools with side effects outside the store should refuse.
    pub safe_mode: bool,
    /// Cancelled when the inbound request is abandoned.
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(chat_id: ChatId, user_id: UserId, session_id: impl Into<String>) -> Self {
        Self {
            chat_id,
            user_id,
            session_id: session_id.into(),
            media: Vec::new(),
            safe_mode: false,
            cancel: CancellationToken::new(),
        }
    }
}

/// Result of executing a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text content returned to the LLM verbatim.
    pub content: String,
    /// Whether the tool execution failed.
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }
}

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name for this tool (e.g. "save_note").
    fn name(&self) -> &str;
    /// Human-readable description of what this tool does.
    fn description(&self) -> &str;
    /// JSON Schema for the tool's input parameters.
    fn input_schema(&self) -> serde_json::Value;
    /// Execution deadline. Store-backed tools finish in milliseconds; a
    /// tool that shells out to builds or deploys should raise this.
    fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(30)
    }
    /// Execute the tool with the given input.
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult;
}

/// Convert a slice of tools to API-level tool definitions.
pub fn to_definitions(tools: &[std::sync::Arc<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}
