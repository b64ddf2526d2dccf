//! HTTP embedding clients implementing `kora_memory::Embedder`.
//!
//! Two wire shapes: Ollama's `/api/embeddings` and the OpenAI-compatible
//! `/v1/embeddings`. Failures map to `MemoryError::Embedder`, which the
//! recall path treats as "skip the semantic pass", never as a hard error.

use async_trait::async_trait;
use kora_core::config::EmbedderConfig;
use kora_memory::embed::Embedder;
use kora_memory::error::{MemoryError, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const EMBED_RETRIES: u32 = 2;

pub struct HttpEmbedder {
    client: reqwest::Client,
    provider: String,
    model: String,
    base_url: String,
    dim: usize,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(cfg: &EmbedderConfig) -> Self {
        // Secrets stay in process env; they are never part of the config
        // file or the runtime override store.
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        Self {
            client: reqwest::Client::new(),
            provider: cfg.provider.clone(),
            model: cfg.model.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            dim: cfg.dim,
            api_key,
        }
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        match self.provider.as_str() {
            "openai" => self.embed_openai(text).await,
            _ => self.embed_ollama(text).await,
        }
    }

    async fn embed_ollama(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Deserialize)]
        struct OllamaEmbedding {
            embedding: Vec<f32>,
        }

        let resp = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&json!({ "model": self.model, "prompt": text }))
            .send()
            .await
            .map_err(|e| MemoryError::Embedder(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(MemoryError::Embedder(format!("ollama returned {status}")));
        }
        let parsed: OllamaEmbedding = resp
            .json()
            .await
            .map_err(|e| MemoryError::Embedder(e.to_string()))?;
        Ok(parsed.embedding)
    }

    async fn embed_openai(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Deserialize)]
        struct OpenAiEmbeddings {
            data: Vec<OpenAiEmbedding>,
        }
        #[derive(Deserialize)]
        struct OpenAiEmbedding {
            embedding: Vec<f32>,
        }

        let mut req = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .json(&json!({ "model": self.model, "input": text }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| MemoryError::Embedder(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(MemoryError::Embedder(format!("openai returned {status}")));
        }
        let parsed: OpenAiEmbeddings = resp
            .json()
            .await
            .map_err(|e| MemoryError::Embedder(e.to_string()))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| MemoryError::Embedder("empty embeddings response".to_string()))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut last_err = None;
        for attempt in 0..=EMBED_RETRIES {
            match self.embed_once(text).await {
                Ok(v) => {
                    if v.len() != self.dim {
                        return Err(MemoryError::Embedder(format!(
                            "dimension {} from endpoint, expected {}",
                            v.len(),
                            self.dim
                        )));
                    }
                    return Ok(v);
                }
                Err(e) => {
                    debug!(attempt, error = %e, "embedding attempt failed");
                    last_err = Some(e);
                    if attempt < EMBED_RETRIES {
                        tokio::time::sleep(std::time::Duration::from_millis(
                            200 * 2u64.pow(attempt),
                        ))
                        .await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| MemoryError::Embedder("unreachable".to_string())))
    }
}
