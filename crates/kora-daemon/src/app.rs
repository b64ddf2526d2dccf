//! Wiring: build every subsystem from config, spawn the long-lived
//! workers, and drain them on shutdown.
//!
//! Each subsystem opens its own SQLite connection to the shared file; WAL
//! keeps their reads concurrent while the store serialises writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use kora_agent::embedder::HttpEmbedder;
use kora_agent::extractor::LlmExtractor;
use kora_agent::failover::{FailoverProvider, ProviderSlot, DEFAULT_MAX_RETRIES};
use kora_agent::ollama::OllamaProvider;
use kora_agent::personality::load_baseline;
use kora_agent::tools::cron::CronTool;
use kora_agent::tools::memory::{MemorySearchTool, RememberFactTool};
use kora_agent::tools::notes::{
    ArchiveNoteTool, DeleteNoteTool, GetNoteTool, ListNotesTool, RestoreNoteTool, SaveNoteTool,
};
use kora_agent::tools::usage::UsageTool;
use kora_agent::{
    AgentLoop, AgentLoopConfig, ApprovalManager, LlmProvider, LlmRouter, ToolRegistry,
};
use kora_core::{KoraConfig, RuntimeStore, Transport};
use kora_memory::budget::UsageLedger;
use kora_memory::{EngineConfig, MemoryEngine, SqliteStore};
use kora_scheduler::{CronEngine, CronHandle, WakeEvent};
use kora_sessions::SessionManager;
use rusqlite::Connection;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::terminal::TerminalTransport;

/// How long in-flight messages may drain after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub struct App {
    pub approvals: Arc<ApprovalManager>,
    pub inbound_tx: mpsc::Sender<kora_core::InboundMessage>,
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl App {
    /// Build the full runtime and spawn the workers.
    pub fn start(config: KoraConfig) -> Result<Self> {
        let tz = config.timezone();

        // Runtime overrides live next to the database file.
        let runtime_path = config.memory.path.with_file_name("runtime.json");
        let runtime = Arc::new(
            RuntimeStore::open(&runtime_path, runtime_defaults(&config))
                .context("open runtime config")?,
        );

        // Store + engine. The embedder dimension binds on first open.
        let store_conn = kora_memory::db::open(&config.memory.path, config.embedder.dim)
            .context("open memory store")?;
        let store = Arc::new(SqliteStore::new(store_conn));

        let mut embedder_cfg = config.embedder.clone();
        if let Some(v) = runtime.get("embedder_provider") {
            embedder_cfg.provider = v;
        }
        if let Some(v) = runtime.get("embedder_model") {
            embedder_cfg.model = v;
        }
        if let Some(v) = runtime.get("embedder_base_url") {
            embedder_cfg.base_url = v;
        }
        let embedder = Arc::new(HttpEmbedder::new(&embedder_cfg));

        let provider: Arc<dyn LlmProvider> = Arc::new(FailoverProvider::new(vec![
            ProviderSlot::new(
                Box::new(OllamaProvider::new(
                    runtime
                        .get("ollama_host")
                        .unwrap_or_else(|| "http://127.0.0.1:11434".to_string()),
                )),
                DEFAULT_MAX_RETRIES,
            ),
        ]));

        let extractor = Arc::new(LlmExtractor::new(
            Arc::clone(&provider),
            config.agent.fast_model.clone(),
        ));

        let engine = Arc::new(MemoryEngine::new(
            store,
            embedder,
            extractor,
            EngineConfig {
                stale_after_days: config.memory.stale_after_days,
            },
        ));

        let ledger = Arc::new(
            UsageLedger::new(open_sibling(&config, "usage")?).context("open usage ledger")?,
        );
        let sessions = Arc::new(
            SessionManager::new(config.agent.session_window, Some(open_sibling(&config, "sessions")?))
                .context("open session store")?,
        );

        // Cron: one handle for tools, one connection for the engine loop.
        let cron_handle = Arc::new(
            CronHandle::new(open_sibling(&config, "cron handle")?, tz)
                .context("open cron handle")?,
        );
        let (wake_tx, wake_rx) = mpsc::channel::<WakeEvent>(config.scheduler.wake_queue_size);
        let cron_engine = CronEngine::new(open_sibling(&config, "cron engine")?, tz, wake_tx)
            .context("open cron engine")?;

        let approvals = Arc::new(ApprovalManager::new(Duration::from_secs(
            config.approvals.timeout_secs,
        )));
        let transport: Arc<dyn Transport> = Arc::new(TerminalTransport);

        let registry = Arc::new(ToolRegistry::new(
            Arc::clone(&approvals),
            Arc::clone(&transport),
        ));
        registry.register(Arc::new(MemorySearchTool::new(Arc::clone(&engine))));
        registry.register(Arc::new(RememberFactTool::new(Arc::clone(&engine))));
        registry.register(Arc::new(SaveNoteTool::new(Arc::clone(&engine))));
        registry.register(Arc::new(GetNoteTool::new(Arc::clone(&engine))));
        registry.register(Arc::new(ArchiveNoteTool::new(Arc::clone(&engine))));
        registry.register(Arc::new(ListNotesTool::new(Arc::clone(&engine))));
        registry.register(Arc::new(RestoreNoteTool::new(Arc::clone(&engine))));
        registry.register(Arc::new(DeleteNoteTool::new(Arc::clone(&engine))));
        registry.register(Arc::new(CronTool::new(Arc::clone(&cron_handle))));
        registry.register(Arc::new(UsageTool::new(Arc::clone(&ledger))));
        for name in &config.agent.dangerous_tools {
            registry.mark_dangerous(name);
        }

        let router = Arc::new(LlmRouter::new(
            Arc::clone(&provider),
            config.agent.fast_model.clone(),
        ));

        let baseline = load_baseline(&config.agent.personality_path);
        let agent = Arc::new(AgentLoop::new(
            Arc::clone(&engine),
            Arc::clone(&ledger),
            sessions,
            registry,
            Arc::clone(&provider),
            router,
            Arc::clone(&transport),
            baseline,
            tz,
            AgentLoopConfig {
                fast_model: config.agent.fast_model.clone(),
                deep_model: config.agent.deep_model.clone(),
                max_tool_turns: config.agent.max_tool_turns,
                llm_timeout: Duration::from_secs(config.agent.llm_timeout_secs),
                loop_timeout: Duration::from_secs(config.agent.loop_timeout_secs),
                max_concurrent_messages: config.agent.max_concurrent_messages,
                max_concurrent_extractions: config.agent.max_concurrent_extractions,
                daily_extraction_cap_usd: config.agent.daily_extraction_cap_usd,
            },
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);

        let mut workers = Vec::new();
        workers.push(tokio::spawn(cron_engine.run(
            config.scheduler.poll_secs,
            config.scheduler.reap_interval_secs,
            shutdown_rx.clone(),
        )));
        workers.push(tokio::spawn(Arc::clone(&engine).run_decay_loop(
            config.memory.decay_interval_secs,
            shutdown_rx.clone(),
        )));
        workers.push(tokio::spawn(agent.run(inbound_rx, wake_rx, shutdown_rx)));

        info!(db = %config.memory.path.display(), zone = %tz, "kora started");
        Ok(Self {
            approvals,
            inbound_tx,
            shutdown_tx,
            workers,
        })
    }

    /// Signal shutdown and drain workers for up to the grace period.
    pub async fn shutdown(self) {
        info!("shutdown requested, draining");
        let _ = self.shutdown_tx.send(true);
        let drain = async {
            for w in self.workers {
                let _ = w.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!("grace period elapsed, abandoning in-flight work");
        }
        info!("kora stopped");
    }
}

/// Another connection into the shared database file, with the same busy
/// timeout the store uses.
fn open_sibling(config: &KoraConfig, what: &str) -> Result<Connection> {
    let conn = Connection::open(&config.memory.path)
        .with_context(|| format!("open db connection for {what}"))?;
    conn.busy_timeout(Duration::from_secs(5))
        .with_context(|| format!("set busy timeout for {what}"))?;
    Ok(conn)
}

fn runtime_defaults(config: &KoraConfig) -> HashMap<String, String> {
    HashMap::from([
        ("llm_provider".to_string(), "ollama".to_string()),
        ("llm_model".to_string(), config.agent.deep_model.clone()),
        (
            "embedder_provider".to_string(),
            config.embedder.provider.clone(),
        ),
        ("embedder_model".to_string(), config.embedder.model.clone()),
        (
            "embedder_base_url".to_string(),
            config.embedder.base_url.clone(),
        ),
        (
            "ollama_host".to_string(),
            std::env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| "http://127.0.0.1:11434".to_string()),
        ),
    ])
}
