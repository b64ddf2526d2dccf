//! Minimal Ollama chat client — the thin default provider for local-first
//! deployments. Non-streaming `/api/chat` with tool calling.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError, ToolCall};

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut messages: Vec<serde_json::Value> =
            vec![json!({ "role": "system", "content": req.system })];
        match &req.raw_messages {
            Some(raw) => messages.extend(raw.clone()),
            None => messages.extend(
                req.messages
                    .iter()
                    .map(|m| json!({ "role": m.role, "content": m.content })),
            ),
        }

        let tools: Vec<serde_json::Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": req.model,
            "messages": messages,
            "stream": false,
            "options": { "num_predict": req.max_tokens },
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }

        let parsed: OllamaChatResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let tool_calls: Vec<ToolCall> = parsed
            .message
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, tc)| ToolCall {
                // Ollama doesn't assign call ids; synthesise stable ones so
                // tool_result blocks can reference them.
                id: format!("call_{i}"),
                name: tc.function.name,
                input: tc.function.arguments,
            })
            .collect();

        let stop_reason = if tool_calls.is_empty() {
            parsed.done_reason.unwrap_or_else(|| "stop".to_string())
        } else {
            "tool_use".to_string()
        };

        Ok(ChatResponse {
            content: parsed.message.content,
            model: req.model.clone(),
            tokens_in: parsed.prompt_eval_count.unwrap_or(0),
            tokens_out: parsed.eval_count.unwrap_or(0),
            stop_reason,
            tool_calls,
        })
    }
}
