//! Tool execution loop — the core agentic behavior.
//!
//! Flow: prompt → LLM → if tool_use → execute tools → inject results → LLM
//! → repeat. Stops when the model yields a terminal assistant message, the
//! turn budget runs out, the caller cancels, or an LLM call times out.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};

use super::registry::ToolRegistry;
use super::ToolContext;

/// Outcome of a full loop run, including the tool names that ran (for
/// session tool traces).
#[derive(Debug)]
pub struct LoopResult {
    pub response: ChatResponse,
    pub called_tools: Vec<String>,
}

/// Run the full tool loop (non-streaming).
///
/// Tool calls execute sequentially in the order the model returned them —
/// interleaving approvals from parallel calls would be unreadable in chat.
/// On an exhausted turn budget the last assistant text comes back with a
/// diagnostic warning appended.
///
/// `partial` (when given) always holds the newest assistant text, so a
/// caller that abandons the whole loop on a deadline can still flush the
/// best text produced so far.
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    registry: &ToolRegistry,
    ctx: &ToolContext,
    initial_request: ChatRequest,
    max_tool_turns: usize,
    llm_timeout: Duration,
    partial: Option<&std::sync::Mutex<String>>,
) -> Result<LoopResult, ProviderError> {
    let mut raw_messages: Vec<serde_json::Value> =
        if let Some(ref raw) = initial_request.raw_messages {
            raw.clone()
        } else {
            initial_request
                .messages
                .iter()
                .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
                .collect()
        };

    let mut called_tools: Vec<String> = Vec::new();
    let mut last_response: Option<ChatResponse> = None;

    for iteration in 0..max_tool_turns {
        if ctx.cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let mut req = initial_request.clone();
        req.raw_messages = Some(raw_messages.clone());

        debug!(iteration, "tool loop iteration");
        let response = match tokio::time::timeout(llm_timeout, provider.send(&req)).await {
            Ok(res) => res?,
            Err(_) => {
                warn!(iteration, "LLM call timed out");
                return Err(ProviderError::Timeout);
            }
        };

        if let (Some(sink), false) = (partial, response.content.is_empty()) {
            *sink.lock().unwrap() = response.content.clone();
        }

        if response.tool_calls.is_empty() || response.stop_reason != "tool_use" {
            info!(iteration, "tool loop complete");
            return Ok(LoopResult {
                response,
                called_tools,
            });
        }

        // Assistant turn: any text plus the tool_use blocks.
        let mut assistant_content: Vec<serde_json::Value> = Vec::new();
        if !response.content.is_empty() {
            assistant_content.push(serde_json::json!({
                "type": "text",
                "text": response.content,
            }));
        }
        for call in &response.tool_calls {
            assistant_content.push(serde_json::json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.input,
            }));
        }
        raw_messages.push(serde_json::json!({
            "role": "assistant",
            "content": assistant_content,
        }));

        // Execute sequentially, in model order.
        let mut tool_result_content: Vec<serde_json::Value> = Vec::new();
        for call in &response.tool_calls {
            debug!(tool = %call.name, "executing tool");
            let result = registry.execute(ctx, &call.name, call.input.clone()).await;
            called_tools.push(call.name.clone());
            tool_result_content.push(serde_json::json!({
                "type": "tool_result",
                "tool_use_id": call.id,
                "content": result.content,
                "is_error": result.is_error,
            }));
        }
        raw_messages.push(serde_json::json!({
            "role": "user",
            "content": tool_result_content,
        }));

        last_response = Some(response);
    }

    warn!(max_tool_turns, "tool loop hit maximum turns");
    match last_response {
        Some(mut resp) => {
            resp.content.push_str(
                "\n\n(Stopped early: the tool budget for this message ran out.)",
            );
            Ok(LoopResult {
                response: resp,
                called_tools,
            })
        }
        None => Err(ProviderError::Parse(format!(
            "tool loop exceeded {max_tool_turns} turns without a response"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalManager;
    use crate::provider::{Message, Role, ToolCall};
    use async_trait::async_trait;
    use kora_core::{ChatId, KoraError, Transport};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        fn name(&self) -> &str {
            "null"
        }
        async fn send_text(&self, _c: ChatId, _t: &str) -> Result<(), KoraError> {
            Ok(())
        }
        async fn show_approval_prompt(
            &self,
            _c: ChatId,
            _i: &str,
            _d: &str,
        ) -> Result<(), KoraError> {
            Ok(())
        }
    }

    /// Keeps asking for the same tool `n` times, then stops.
    struct ToolHappyProvider {
        remaining: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for ToolHappyProvider {
        fn name(&self) -> &str {
            "tool-happy"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            if self.remaining.load(Ordering::SeqCst) > 0 {
                self.remaining.fetch_sub(1, Ordering::SeqCst);
                return Ok(ChatResponse {
                    content: String::new(),
                    model: req.model.clone(),
                    tokens_in: 5,
                    tokens_out: 5,
                    stop_reason: "tool_use".to_string(),
                    tool_calls: vec![ToolCall {
                        id: "call_0".to_string(),
                        name: "missing_tool".to_string(),
                        input: serde_json::json!({}),
                    }],
                });
            }
            Ok(ChatResponse {
                content: "done".to_string(),
                model: req.model.clone(),
                tokens_in: 5,
                tokens_out: 5,
                stop_reason: "end_turn".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "m".to_string(),
            system: "s".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: "go".to_string(),
            }],
            max_tokens: 128,
            tools: Vec::new(),
            raw_messages: None,
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(
            Arc::new(ApprovalManager::new(Duration::from_millis(50))),
            Arc::new(NullTransport),
        )
    }

    #[tokio::test]
    async fn loop_terminates_when_model_stops_calling_tools() {
        let provider = ToolHappyProvider {
            remaining: AtomicUsize::new(2),
        };
        let ctx = ToolContext::new(1, 1, "null:1");
        let result = run_tool_loop(
            &provider,
            &registry(),
            &ctx,
            request(),
            10,
            Duration::from_secs(5),
            None,
        )
        .await
        .unwrap();
        assert_eq!(result.response.content, "done");
        // Unknown tool twice: both recovered with empty results.
        assert_eq!(result.called_tools, vec!["missing_tool", "missing_tool"]);
    }

    #[tokio::test]
    async fn exhausted_budget_appends_diagnostic() {
        let provider = ToolHappyProvider {
            remaining: AtomicUsize::new(100),
        };
        let ctx = ToolContext::new(1, 1, "null:1");
        let result = run_tool_loop(
            &provider,
            &registry(),
            &ctx,
            request(),
            3,
            Duration::from_secs(5),
            None,
        )
        .await
        .unwrap();
        assert!(result.response.content.contains("tool budget"));
        assert_eq!(result.called_tools.len(), 3);
    }

    #[tokio::test]
    async fn cancellation_aborts_before_the_next_call() {
        let provider = ToolHappyProvider {
            remaining: AtomicUsize::new(100),
        };
        let ctx = ToolContext::new(1, 1, "null:1");
        ctx.cancel.cancel();
        let err = run_tool_loop(
            &provider,
            &registry(),
            &ctx,
            request(),
            3,
            Duration::from_secs(5),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
    }
}
