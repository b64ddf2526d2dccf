//! Mutable runtime configuration — a small persisted key/value store for
//! the settings the user may flip at runtime (models, providers, embedder
//! endpoints) without restarting the daemon.
//!
//! Keys form a closed allowlist; secrets are rejected by construction
//! because they are not on it. Writes go through a temp file + rename so a
//! crash mid-write never corrupts the store. Readers take a full snapshot;
//! there is no partial visibility of a multi-key update.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::info;

use crate::error::KoraError;

/// Every key the runtime store accepts. Anything else is a validation error.
pub const ALLOWED_KEYS: &[&str] = &[
    "llm_provider",
    "llm_model",
    "coder_provider",
    "coder_model",
    "embedder_provider",
    "embedder_model",
    "embedder_base_url",
    "ollama_host",
];

pub struct RuntimeStore {
    path: PathBuf,
    /// Env-derived defaults restored by `reset_all`.
    defaults: HashMap<String, String>,
    inner: RwLock<HashMap<String, String>>,
}

impl RuntimeStore {
    /// Open (or create) the override file. Unknown keys found on disk are
    /// dropped with a log line rather than failing the boot.
    pub fn open(path: &Path, defaults: HashMap<String, String>) -> Result<Self, KoraError> {
        let mut map = defaults.clone();
        if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let stored: HashMap<String, String> = serde_json::from_str(&raw)?;
            for (k, v) in stored {
                if ALLOWED_KEYS.contains(&k.as_str()) {
                    map.insert(k, v);
                } else {
                    info!(key = %k, "dropping unknown runtime config key");
                }
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            defaults,
            inner: RwLock::new(map),
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read().unwrap().get(key).cloned()
    }

    /// Copy-on-write snapshot for request-scoped reads.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.inner.read().unwrap().clone()
    }

    /// Set one key. Persists before the in-memory map is updated, so a
    /// failed write leaves the old value visible.
    pub fn set(&self, key: &str, value: &str) -> Result<(), KoraError> {
        if !ALLOWED_KEYS.contains(&key) {
            return Err(KoraError::Validation(format!(
                "unknown runtime config key: {key}"
            )));
        }
        let mut next = self.snapshot();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *self.inner.write().unwrap() = next;
        info!(key, value, "runtime config updated");
        Ok(())
    }

    /// Restore env-derived defaults and persist them.
    pub fn reset_all(&self) -> Result<(), KoraError> {
        self.persist(&self.defaults)?;
        *self.inner.write().unwrap() = self.defaults.clone();
        info!("runtime config reset to defaults");
        Ok(())
    }

    fn persist(&self, map: &HashMap<String, String>) -> Result<(), KoraError> {
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(map)?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> RuntimeStore {
        let mut defaults = HashMap::new();
        defaults.insert("llm_model".to_string(), "claude-sonnet-4-6".to_string());
        RuntimeStore::open(&dir.path().join("runtime.json"), defaults).unwrap()
    }

    #[test]
    fn set_get_roundtrip_and_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);
        s.set("llm_model", "claude-haiku-4-5").unwrap();
        assert_eq!(s.get("llm_model").as_deref(), Some("claude-haiku-4-5"));

        // Reopen from disk: the override survives.
        let s2 = store(&dir);
        assert_eq!(s2.get("llm_model").as_deref(), Some("claude-haiku-4-5"));
    }

    #[test]
    fn rejects_keys_outside_allowlist() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);
        assert!(s.set("anthropic_api_key", "sk-secret").is_err());
        assert!(s.get("anthropic_api_key").is_none());
    }

    #[test]
    fn reset_restores_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);
        s.set("llm_model", "other").unwrap();
        s.reset_all().unwrap();
        assert_eq!(s.get("llm_model").as_deref(), Some("claude-sonnet-4-6"));
    }

    #[test]
    fn no_tmp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);
        s.set("ollama_host", "http://10.0.0.5:11434").unwrap();
        assert!(!dir.path().join("runtime.json.tmp").exists());
    }
}
