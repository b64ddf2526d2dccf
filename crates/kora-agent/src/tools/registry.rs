//! Name → handler registry with per-call context propagation, progress
//! notifications, and the dangerous-tool approval gate.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use kora_core::Transport;
use tracing::{info, warn};

use crate::approval::{ApprovalManager, ApprovalOutcome};
use crate::provider::ToolDefinition;

use super::{Tool, ToolContext, ToolResult};

pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
    /// Static set of tool names that require owner approval before running.
    dangerous: RwLock<HashSet<String>>,
    approvals: Arc<ApprovalManager>,
    transport: Arc<dyn Transport>,
}

impl ToolRegistry {
    pub fn new(approvals: Arc<ApprovalManager>, transport: Arc<dyn Transport>) -> Self {
        Self {
            tools: DashMap::new(),
            dangerous: RwLock::new(HashSet::new()),
            approvals,
            transport,
        }
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Add a name to the dangerous set. Unregistered names are fine — the
    /// gate only matters once the tool exists.
    pub fn mark_dangerous(&self, name: &str) {
        self.dangerous.write().unwrap().insert(name.to_string());
    }

    pub fn is_dangerous(&self, name: &str) -> bool {
        self.dangerous.read().unwrap().contains(name)
    }

    /// Tool schemas for the LLM request, sorted by name for stable prompts.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .iter()
            .map(|entry| ToolDefinition {
                name: entry.value().name().to_string(),
                description: entry.value().description().to_string(),
                input_schema: entry.value().input_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Forward a short progress line to the chat (long-running tools call
    /// this through their context). Failures are logged and swallowed.
    pub async fn notify(&self, ctx: &ToolContext, message: &str) {
        if let Err(e) = self.transport.send_text(ctx.chat_id, message).await {
            warn!(chat_id = ctx.chat_id, error = %e, "progress notification failed");
        }
    }

    /// Execute a named tool.
    ///
    /// An unknown name is non-fatal: the LLM gets an empty result and can
    /// recover on the next turn. Dangerous tools run the approval gate
    /// first; denial or timeout produces a structured refusal the LLM can
    /// relay.
    pub async fn execute(
        &self,
        ctx: &ToolContext,
        name: &str,
        input: serde_json::Value,
    ) -> ToolResult {
        let Some(tool) = self.tools.get(name).map(|t| Arc::clone(t.value())) else {
            warn!(tool = name, "unknown tool requested");
            return ToolResult::success("");
        };

        if self.is_dangerous(name) {
            let description = format!("Allow '{name}' with {input}?");
            let approval_id =
                self.approvals
                    .start(ctx.chat_id, ctx.user_id, name, input.clone(), &description);

            if let Err(e) = self
                .transport
                .show_approval_prompt(ctx.chat_id, &approval_id, &description)
                .await
            {
                self.approvals.cancel(&approval_id);
                return ToolResult::error(format!("approval prompt failed: {e}"));
            }

            match self.approvals.wait(&approval_id, &ctx.cancel).await {
                ApprovalOutcome::Approved => {
                    info!(tool = name, "dangerous tool approved");
                }
                outcome => {
                    warn!(tool = name, ?outcome, "dangerous tool refused");
                    return ToolResult::error(format!(
                        "refused: '{name}' was not approved ({})",
                        match outcome {
                            ApprovalOutcome::Denied => "denied by user",
                            ApprovalOutcome::TimedOut => "approval timed out",
                            _ => "cancelled",
                        }
                    ));
                }
            }
        }

        match tokio::time::timeout(tool.timeout(), tool.execute(ctx, input)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(tool = name, timeout = ?tool.timeout(), "tool timed out");
                ToolResult::error(format!("'{name}' timed out"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kora_core::{ChatId, KoraError};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Transport stub that records sends and can auto-resolve approvals.
    struct StubTransport {
        sent: Mutex<Vec<String>>,
        /// (approve, user) applied as soon as the prompt is shown.
        auto_resolve: Option<(bool, i64)>,
        approvals: Mutex<Option<Arc<ApprovalManager>>>,
    }

    impl StubTransport {
        fn new(auto_resolve: Option<(bool, i64)>) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                auto_resolve,
                approvals: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        fn name(&self) -> &str {
            "stub"
        }
        async fn send_text(&self, _chat_id: ChatId, text: &str) -> Result<(), KoraError> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
        async fn show_approval_prompt(
            &self,
            _chat_id: ChatId,
            approval_id: &str,
            _description: &str,
        ) -> Result<(), KoraError> {
            if let Some((approve, user)) = self.auto_resolve {
                let approvals = self.approvals.lock().unwrap().clone().unwrap();
                let id = approval_id.to_string();
                tokio::spawn(async move {
                    let _ = approvals.resolve(&id, approve, user);
                });
            }
            Ok(())
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the input back"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        async fn execute(&self, _ctx: &ToolContext, input: serde_json::Value) -> ToolResult {
            ToolResult::success(input.to_string())
        }
    }

    fn registry_with(
        auto_resolve: Option<(bool, i64)>,
        timeout: Duration,
    ) -> (ToolRegistry, Arc<StubTransport>) {
        let approvals = Arc::new(ApprovalManager::new(timeout));
        let transport = Arc::new(StubTransport::new(auto_resolve));
        *transport.approvals.lock().unwrap() = Some(Arc::clone(&approvals));
        let registry = ToolRegistry::new(approvals, transport.clone());
        registry.register(Arc::new(EchoTool));
        (registry, transport)
    }

    #[tokio::test]
    async fn unknown_tool_returns_empty_success() {
        let (registry, _t) = registry_with(None, Duration::from_millis(50));
        let ctx = ToolContext::new(1, 100, "stub:1");
        let result = registry.execute(&ctx, "no_such_tool", serde_json::json!({})).await;
        assert!(!result.is_error);
        assert!(result.content.is_empty());
    }

    #[tokio::test]
    async fn plain_tool_runs_without_approval() {
        let (registry, _t) = registry_with(None, Duration::from_millis(50));
        let ctx = ToolContext::new(1, 100, "stub:1");
        let result = registry
            .execute(&ctx, "echo", serde_json::json!({"x": 1}))
            .await;
        assert!(!result.is_error);
        assert!(result.content.contains("\"x\":1"));
    }

    #[tokio::test]
    async fn dangerous_tool_runs_after_owner_approval() {
        // The requester approves within the window; the handler runs.
        let (registry, _t) = registry_with(Some((true, 100)), Duration::from_secs(5));
        registry.mark_dangerous("echo");
        let ctx = ToolContext::new(1, 100, "stub:1");
        let result = registry.execute(&ctx, "echo", serde_json::json!({})).await;
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn dangerous_tool_denied_yields_refusal() {
        let (registry, _t) = registry_with(Some((false, 100)), Duration::from_secs(5));
        registry.mark_dangerous("echo");
        let ctx = ToolContext::new(1, 100, "stub:1");
        let result = registry.execute(&ctx, "echo", serde_json::json!({})).await;
        assert!(result.is_error);
        assert!(result.content.contains("denied"));
    }

    #[tokio::test]
    async fn non_requester_approval_times_out_to_refusal() {
        // User 200 presses approve on user 100's call: the press bounces
        // off the owner lock and the approval runs out the clock.
        let (registry, _t) = registry_with(Some((true, 200)), Duration::from_millis(50));
        registry.mark_dangerous("echo");
        let ctx = ToolContext::new(1, 100, "stub:1");
        let result = registry.execute(&ctx, "echo", serde_json::json!({})).await;
        assert!(result.is_error);
        assert!(result.content.contains("timed out"));
    }

    #[tokio::test]
    async fn notify_reaches_transport() {
        let (registry, transport) = registry_with(None, Duration::from_millis(50));
        let ctx = ToolContext::new(1, 100, "stub:1");
        registry.notify(&ctx, "building image...").await;
        assert_eq!(transport.sent.lock().unwrap().as_slice(), ["building image..."]);
    }
}
