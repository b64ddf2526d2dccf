use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::KoraError;

/// Top-level config (kora.toml + KORA_* env overrides).
///
/// A handful of well-known plain env vars (`MEMORY_PATH`, `EMBEDDER_*`,
/// `OLLAMA_HOST`, `TZ`, `OWNER_CHAT_ID`) are applied on top for
/// compatibility with container deployments. Secrets (API keys) are never
/// part of this struct; providers read them from the process env directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KoraConfig {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub approvals: ApprovalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Path of the single SQLite file holding every store table.
    #[serde(default = "default_memory_path")]
    pub path: PathBuf,
    /// Days until a fact's recency component reaches zero.
    #[serde(default = "default_stale_after")]
    pub stale_after_days: f64,
    /// Seconds between decay recomputation passes.
    #[serde(default = "default_decay_interval")]
    pub decay_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Static personality baseline, loaded once at boot.
    #[serde(default = "default_personality_path")]
    pub personality_path: PathBuf,
    /// Model used for the `"fast"` tier (routing, smalltalk).
    #[serde(default = "default_fast_model")]
    pub fast_model: String,
    /// Model used for the `"deep"` tier (decisions, long answers).
    #[serde(default = "default_deep_model")]
    pub deep_model: String,
    #[serde(default = "default_max_tool_turns")]
    pub max_tool_turns: usize,
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_secs: u64,
    /// Global per-message budget; on expiry the best partial text is flushed.
    #[serde(default = "default_loop_timeout")]
    pub loop_timeout_secs: u64,
    /// Cap on concurrently processed inbound messages.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_messages: usize,
    /// Cap on concurrently running background extractions.
    #[serde(default = "default_max_extractions")]
    pub max_concurrent_extractions: usize,
    /// Rolling session buffer length, in turns.
    #[serde(default = "default_session_window")]
    pub session_window: usize,
    /// Daily USD cap; extraction is skipped once today's spend exceeds it.
    #[serde(default = "default_extraction_cap")]
    pub daily_extraction_cap_usd: f64,
    /// Tool names that require owner approval before running.
    #[serde(default)]
    pub dangerous_tools: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    /// `"ollama"` or `"openai"` (any OpenAI-compatible endpoint).
    #[serde(default = "default_embedder_provider")]
    pub provider: String,
    #[serde(default = "default_embedder_model")]
    pub model: String,
    #[serde(default = "default_embedder_base_url")]
    pub base_url: String,
    /// Vector dimension. Recorded in the store on first init; a mismatch on
    /// a later open is fatal (re-embedding every fact needs a migration).
    #[serde(default = "default_embedder_dim")]
    pub dim: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
    /// IANA zone used to evaluate cron expressions. Timestamps stay UTC.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_wake_queue")]
    pub wake_queue_size: usize,
    #[serde(default = "default_reap_secs")]
    pub reap_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_approval_timeout")]
    pub timeout_secs: u64,
    /// When set, only this chat may originate dangerous-tool approvals.
    #[serde(default)]
    pub owner_chat_id: Option<i64>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: default_memory_path(),
            stale_after_days: default_stale_after(),
            decay_interval_secs: default_decay_interval(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            personality_path: default_personality_path(),
            fast_model: default_fast_model(),
            deep_model: default_deep_model(),
            max_tool_turns: default_max_tool_turns(),
            llm_timeout_secs: default_llm_timeout(),
            loop_timeout_secs: default_loop_timeout(),
            max_concurrent_messages: default_max_concurrent(),
            max_concurrent_extractions: default_max_extractions(),
            session_window: default_session_window(),
            daily_extraction_cap_usd: default_extraction_cap(),
            dangerous_tools: Vec::new(),
        }
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            provider: default_embedder_provider(),
            model: default_embedder_model(),
            base_url: default_embedder_base_url(),
            dim: default_embedder_dim(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
            timezone: default_timezone(),
            wake_queue_size: default_wake_queue(),
            reap_interval_secs: default_reap_secs(),
        }
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_approval_timeout(),
            owner_chat_id: None,
        }
    }
}

impl Default for KoraConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            agent: AgentConfig::default(),
            embedder: EmbedderConfig::default(),
            scheduler: SchedulerConfig::default(),
            approvals: ApprovalConfig::default(),
        }
    }
}

impl KoraConfig {
    /// Load from `kora.toml` (if present) merged with `KORA_*` env vars,
    /// then apply the well-known plain env overrides.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, KoraError> {
        let toml_path = path
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("kora.toml"));

        let mut cfg: KoraConfig = Figment::new()
            .merge(Toml::file(toml_path))
            .merge(Env::prefixed("KORA_").split("__"))
            .extract()
            .map_err(|e| KoraError::Validation(format!("config: {e}")))?;

        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Parsed scheduler timezone; falls back to UTC on a bad zone name.
    pub fn timezone(&self) -> chrono_tz::Tz {
        self.scheduler.timezone.parse().unwrap_or_else(|_| {
            warn!(zone = %self.scheduler.timezone, "unknown IANA zone, falling back to UTC");
            chrono_tz::UTC
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MEMORY_PATH") {
            self.memory.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("EMBEDDER_PROVIDER") {
            self.embedder.provider = v;
        }
        if let Ok(v) = std::env::var("EMBEDDER_MODEL") {
            self.embedder.model = v;
        }
        if let Ok(v) = std::env::var("EMBEDDER_BASE_URL") {
            self.embedder.base_url = v;
        }
        if let Ok(v) = std::env::var("OLLAMA_HOST") {
            if self.embedder.provider == "ollama" {
                self.embedder.base_url = v;
            }
        }
        if let Ok(v) = std::env::var("TZ") {
            self.scheduler.timezone = v;
        }
        if let Ok(v) = std::env::var("OWNER_CHAT_ID") {
            match v.parse() {
                Ok(id) => self.approvals.owner_chat_id = Some(id),
                Err(_) => warn!(value = %v, "OWNER_CHAT_ID is not an integer, ignoring"),
            }
        }
    }
}

fn default_memory_path() -> PathBuf {
    PathBuf::from("kora.db")
}
fn default_stale_after() -> f64 {
    90.0
}
fn default_decay_interval() -> u64 {
    24 * 60 * 60
}
fn default_personality_path() -> PathBuf {
    PathBuf::from("PERSONALITY.md")
}
fn default_fast_model() -> String {
    "claude-haiku-4-5".to_string()
}
fn default_deep_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_max_tool_turns() -> usize {
    10
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_loop_timeout() -> u64 {
    300
}
fn default_max_concurrent() -> usize {
    8
}
fn default_max_extractions() -> usize {
    4
}
fn default_session_window() -> usize {
    20
}
fn default_extraction_cap() -> f64 {
    5.0
}
fn default_embedder_provider() -> String {
    "ollama".to_string()
}
fn default_embedder_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_embedder_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_embedder_dim() -> usize {
    768
}
fn default_poll_secs() -> u64 {
    30
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_wake_queue() -> usize {
    32
}
fn default_reap_secs() -> u64 {
    10 * 60
}
fn default_approval_timeout() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = KoraConfig::default();
        assert_eq!(cfg.agent.max_tool_turns, 10);
        assert_eq!(cfg.agent.max_concurrent_messages, 8);
        assert_eq!(cfg.scheduler.poll_secs, 30);
        assert_eq!(cfg.approvals.timeout_secs, 60);
        assert_eq!(cfg.memory.stale_after_days, 90.0);
    }

    #[test]
    fn bad_timezone_falls_back_to_utc() {
        let mut cfg = KoraConfig::default();
        cfg.scheduler.timezone = "Mars/Olympus".to_string();
        assert_eq!(cfg.timezone(), chrono_tz::UTC);
    }
}
