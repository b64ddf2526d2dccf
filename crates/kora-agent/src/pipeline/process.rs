//! The agent loop — one inbound message or cron wake, end to end:
//! route → recall → assemble context → LLM + tool dispatch → emit →
//! detached Remember → budget accounting.
//!
//! Concurrency contract (per the resource model):
//! - a per-session single-flight lock keeps messages from the same chat
//!   from interleaving into the LLM step or extraction
//! - a message semaphore caps concurrent LLM work across sessions
//! - Remember runs on a separate bounded pool, derived from the *process*
//!   lifetime — cancelling the request never cancels extraction already
//!   in flight, and a cancelled request spawns no extraction at all

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use dashmap::DashMap;
use kora_core::{InboundMessage, Transport};
use kora_memory::budget::UsageLedger;
use kora_memory::engine::DEFAULT_RECALL_LIMIT;
use kora_memory::types::RecallOptions;
use kora_memory::MemoryEngine;
use kora_scheduler::WakeEvent;
use kora_sessions::{SessionManager, Turn, TurnRole};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::provider::{ChatRequest, LlmProvider, Message, Role};
use crate::router::DomainRouter;
use crate::tools::registry::ToolRegistry;
use crate::tools::{tool_loop, ToolContext};

use super::context::{assemble_system, format_envelope};

/// Reply marker that suppresses outbound text on cron wakes.
pub const SILENCE_MARKER: &str = "NO_NOTIFY";

#[derive(Debug, Clone)]
pub struct AgentLoopConfig {
    pub fast_model: String,
    pub deep_model: String,
    pub max_tool_turns: usize,
    pub llm_timeout: Duration,
    /// Whole-message budget; on expiry the best partial text is flushed
    /// and Remember is skipped.
    pub loop_timeout: Duration,
    pub max_concurrent_messages: usize,
    pub max_concurrent_extractions: usize,
    /// Remember is skipped once today's ledger spend crosses this.
    pub daily_extraction_cap_usd: f64,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            fast_model: "claude-haiku-4-5".to_string(),
            deep_model: "claude-sonnet-4-6".to_string(),
            max_tool_turns: 10,
            llm_timeout: Duration::from_secs(120),
            loop_timeout: Duration::from_secs(300),
            max_concurrent_messages: 8,
            max_concurrent_extractions: 4,
            daily_extraction_cap_usd: 5.0,
        }
    }
}

/// Outcome of one processed turn, for callers that want more than the
/// emitted text (tests, terminal echo).
#[derive(Debug)]
pub struct ProcessedTurn {
    pub text: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    /// Tool names executed this turn, in order (session tool trace).
    pub called_tools: Vec<String>,
    /// False when the reply was suppressed (silence marker, empty text).
    pub emitted: bool,
}

pub struct AgentLoop {
    engine: Arc<MemoryEngine>,
    ledger: Arc<UsageLedger>,
    sessions: Arc<SessionManager>,
    registry: Arc<ToolRegistry>,
    provider: Arc<dyn LlmProvider>,
    router: Arc<dyn DomainRouter>,
    transport: Arc<dyn Transport>,
    baseline: String,
    tz: Tz,
    config: AgentLoopConfig,
    message_slots: Semaphore,
    extraction_slots: Arc<Semaphore>,
    session_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    /// Extraction tasks derive from this, not from any request token.
    process_cancel: CancellationToken,
}

impl AgentLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: Arc<MemoryEngine>,
        ledger: Arc<UsageLedger>,
        sessions: Arc<SessionManager>,
        registry: Arc<ToolRegistry>,
        provider: Arc<dyn LlmProvider>,
        router: Arc<dyn DomainRouter>,
        transport: Arc<dyn Transport>,
        baseline: String,
        tz: Tz,
        config: AgentLoopConfig,
    ) -> Self {
        Self {
            engine,
            ledger,
            sessions,
            registry,
            provider,
            router,
            transport,
            baseline,
            tz,
            message_slots: Semaphore::new(config.max_concurrent_messages),
            extraction_slots: Arc::new(Semaphore::new(config.max_concurrent_extractions)),
            config,
            session_locks: DashMap::new(),
            process_cancel: CancellationToken::new(),
        }
    }

    /// Fan-out worker: one task per inbound message or wake, until shutdown.
    pub async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<InboundMessage>,
        mut wakes: mpsc::Receiver<WakeEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("agent loop started");
        loop {
            tokio::select! {
                msg = inbound.recv() => {
                    let Some(msg) = msg else { break };
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        let chat_id = msg.chat_id;
                        let cancel = this.process_cancel.child_token();
                        match this.handle_message(msg, cancel).await {
                            Ok(_) | Err(AgentError::Cancelled) => {}
                            Err(e) => {
                                warn!(chat_id, error = %e, "message processing failed");
                                let _ = this.transport.send_text(chat_id, &e.user_message()).await;
                            }
                        }
                    });
                }
                wake = wakes.recv() => {
                    let Some(wake) = wake else { break };
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = this.handle_wake(&wake).await {
                            warn!(chat_id = wake.chat_id, keyword = %wake.keyword, error = %e, "cron wake failed");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("agent loop shutting down, cancelling in-flight work");
                        self.process_cancel.cancel();
                        break;
                    }
                }
            }
        }
    }

    /// Process one inbound user message end to end.
    pub async fn handle_message(
        &self,
        msg: InboundMessage,
        cancel: CancellationToken,
    ) -> Result<ProcessedTurn> {
        // Per-session single-flight: covers the LLM/tool phase AND the
        // extraction spawn, so two messages from one chat can't interleave.
        let lock = self
            .session_locks
            .entry(msg.session_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _session_guard = lock.lock().await;

        let _slot = self
            .message_slots
            .acquire()
            .await
            .map_err(|_| AgentError::Cancelled)?;

        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let history = self.sessions.recent(&msg.session_id);
        self.sessions.append(
            &msg.session_id,
            self.transport.name(),
            Turn::now(TurnRole::User, msg.text.clone()),
        );

        let route = self.router.route(&msg.text, &history).await;
        debug!(primary = ?route.primary, tier = %route.model_tier, "message routed");

        let turn = self
            .converse(&msg, &history, &route, &msg.text, None, &cancel)
            .await?;

        if turn.emitted {
            self.transport.send_text(msg.chat_id, &turn.text).await?;
        }

        self.sessions.append_assistant(
            &msg.session_id,
            self.transport.name(),
            Turn {
                role: TurnRole::Assistant,
                text: turn.text.clone(),
                tool_trace: turn.called_tools.clone(),
                at: Utc::now().to_rfc3339(),
            },
            &turn.model,
            turn.tokens_in,
            turn.tokens_out,
        );

        if let Err(e) = self
            .ledger
            .record(self.provider.name(), &turn.model, turn.tokens_in, turn.tokens_out)
        {
            warn!(error = %e, "usage accounting failed");
        }

        // Detached Remember: its lifetime is the process, not the request.
        if !cancel.is_cancelled() && !turn.text.is_empty() {
            self.spawn_remember(msg.text.clone(), turn.text.clone());
        }

        Ok(turn)
    }

    /// Process a cron wake: synthesize the pseudo-message, recall the
    /// keyword, and let the model decide whether to say anything at all.
    pub async fn handle_wake(&self, wake: &WakeEvent) -> Result<ProcessedTurn> {
        let session_id = format!("{}:{}", self.transport.name(), wake.chat_id);
        let pseudo = format!("[CRON_FIRE: {}]", wake.keyword);
        info!(chat_id = wake.chat_id, keyword = %wake.keyword, "cron wake entering loop");

        let lock = self
            .session_locks
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _session_guard = lock.lock().await;

        let history = self.sessions.recent(&session_id);
        let route = self.router.route(&wake.keyword, &history).await;
        let cancel = self.process_cancel.child_token();

        let msg = InboundMessage {
            chat_id: wake.chat_id,
            user_id: wake.chat_id,
            session_id: session_id.clone(),
            text: pseudo.clone(),
            media: Vec::new(),
        };

        let wake_instruction = format!(
            "A scheduled trigger fired for '{}'. Decide whether the user \
             should hear from you right now. Reply with exactly {SILENCE_MARKER} \
             to stay silent; anything else is sent as a notification.",
            wake.keyword
        );
        let turn = self
            .converse(&msg, &history, &route, &wake.keyword, Some(&wake_instruction), &cancel)
            .await?;

        if turn.emitted {
            self.transport.send_text(wake.chat_id, &turn.text).await?;
            self.sessions
                .append(&session_id, self.transport.name(), Turn::now(TurnRole::User, pseudo.clone()));
            self.sessions.append_assistant(
                &session_id,
                self.transport.name(),
                Turn {
                    role: TurnRole::Assistant,
                    text: turn.text.clone(),
                    tool_trace: Vec::new(),
                    at: Utc::now().to_rfc3339(),
                },
                &turn.model,
                turn.tokens_in,
                turn.tokens_out,
            );
        } else {
            debug!(keyword = %wake.keyword, "cron fire produced no notification");
        }

        if let Err(e) = self
            .ledger
            .record(self.provider.name(), &turn.model, turn.tokens_in, turn.tokens_out)
        {
            warn!(error = %e, "usage accounting failed");
        }
        Ok(turn)
    }

    /// Resolve from the transport's approval callback. Exposed here so
    /// adapters only need the loop handle.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    // -------------------------------------------------------------------------
    // Private helpers
    // -------------------------------------------------------------------------

    /// Shared LLM phase: recall → context → tool loop, under the global
    /// loop timeout. Returns the turn without emitting or persisting it.
    async fn converse(
        &self,
        msg: &InboundMessage,
        history: &[Turn],
        route: &kora_core::RouteDecision,
        recall_query: &str,
        extra_instruction: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ProcessedTurn> {
        let now = Utc::now();

        let recall = self
            .engine
            .recall(
                recall_query,
                &route.primary,
                &route.related,
                DEFAULT_RECALL_LIMIT,
                &RecallOptions::default(),
            )
            .await?;
        let notes = self.engine.list_notes()?;

        let mut system = assemble_system(&self.baseline, &recall, &notes, now, self.tz);
        if let Some(extra) = extra_instruction {
            system.push_str("\n\n");
            system.push_str(extra);
        }

        let mut messages: Vec<Message> = history
            .iter()
            .map(|t| Message {
                role: match t.role {
                    TurnRole::User => Role::User,
                    TurnRole::Assistant => Role::Assistant,
                },
                content: match t.role {
                    TurnRole::User => format_envelope(self.transport.name(), &t.at, &t.text),
                    TurnRole::Assistant => t.text.clone(),
                },
            })
            .collect();
        messages.push(Message {
            role: Role::User,
            content: format_envelope(self.transport.name(), &now.to_rfc3339(), &msg.text),
        });

        let model = if route.model_tier == "deep" {
            self.config.deep_model.clone()
        } else {
            self.config.fast_model.clone()
        };

        let request = ChatRequest {
            model: model.clone(),
            system,
            messages,
            max_tokens: 4096,
            tools: self.registry.definitions(),
            raw_messages: None,
        };

        let ctx = ToolContext {
            chat_id: msg.chat_id,
            user_id: msg.user_id,
            session_id: msg.session_id.clone(),
            media: msg.media.clone(),
            safe_mode: false,
            cancel: cancel.clone(),
        };

        let partial = std::sync::Mutex::new(String::new());
        let loop_fut = tool_loop::run_tool_loop(
            self.provider.as_ref(),
            &self.registry,
            &ctx,
            request,
            self.config.max_tool_turns,
            self.config.llm_timeout,
            Some(&partial),
        );

        let (text, model, tokens_in, tokens_out, called_tools) =
            match tokio::time::timeout(self.config.loop_timeout, loop_fut).await {
                Ok(Ok(result)) => (
                    result.response.content,
                    result.response.model,
                    result.response.tokens_in,
                    result.response.tokens_out,
                    result.called_tools,
                ),
                Ok(Err(crate::provider::ProviderError::Cancelled)) => {
                    return Err(AgentError::Cancelled)
                }
                Ok(Err(e)) => return Err(AgentError::Provider(e)),
                Err(_) => {
                    // Global budget exhausted: flush the best partial text.
                    warn!(session = %msg.session_id, "agent loop timed out, flushing partial text");
                    cancel.cancel();
                    let best = partial.lock().unwrap().clone();
                    let text = if best.is_empty() {
                        "That took longer than I allow myself; I stopped partway. \
                         Ask again and I'll pick it up."
                            .to_string()
                    } else {
                        best
                    };
                    (text, model, 0, 0, Vec::new())
                }
            };

        let trimmed = text.trim();
        let emitted = !trimmed.is_empty() && trimmed != SILENCE_MARKER;
        Ok(ProcessedTurn {
            text: trimmed.to_string(),
            model,
            tokens_in,
            tokens_out,
            called_tools,
            emitted,
        })
    }

    fn spawn_remember(&self, user_text: String, assistant_text: String) {
        match self.ledger.today() {
            Ok(t) if t.cost_usd >= self.config.daily_extraction_cap_usd => {
                info!(
                    spent = t.cost_usd,
                    cap = self.config.daily_extraction_cap_usd,
                    "extraction budget exhausted, skipping remember"
                );
                return;
            }
            Err(e) => warn!(error = %e, "budget check failed, extracting anyway"),
            _ => {}
        }

        let engine = Arc::clone(&self.engine);
        let slots = Arc::clone(&self.extraction_slots);
        let process_cancel = self.process_cancel.clone();
        tokio::spawn(async move {
            let Ok(_permit) = slots.acquire_owned().await else {
                return;
            };
            tokio::select! {
                res = engine.remember(&user_text, &assistant_text) => match res {
                    Ok(report) if !report.contradictions.is_empty() => {
                        for c in &report.contradictions {
                            info!(
                                field = %c.field,
                                old = %c.old_value,
                                new = %c.new_value,
                                "fact superseded during extraction"
                            );
                        }
                    }
                    Ok(_) => {}
                    // Async failures are logged, never user-visible; the
                    // next turn produces its own extraction.
                    Err(e) => warn!(error = %e, "remember failed, turn facts lost"),
                },
                _ = process_cancel.cancelled() => {
                    debug!("process shutdown interrupted extraction");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatResponse, ProviderError};
    use crate::router::HeuristicRouter;
    use crate::tools::registry::ToolRegistry;
    use crate::approval::ApprovalManager;
    use async_trait::async_trait;
    use kora_core::{ChatId, KoraError};
    use kora_memory::db::open_in_memory;
    use kora_memory::embed::HashEmbedder;
    use kora_memory::engine::EngineConfig;
    use kora_memory::types::{ExtractedFact, Extraction, FactTarget};
    use kora_memory::SqliteStore;
    use rusqlite::Connection;
    use std::sync::Mutex;

    struct RecordingTransport {
        sent: Mutex<Vec<(ChatId, String)>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn name(&self) -> &str {
            "test"
        }
        async fn send_text(&self, chat_id: ChatId, text: &str) -> std::result::Result<(), KoraError> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
        async fn show_approval_prompt(
            &self,
            _c: ChatId,
            _i: &str,
            _d: &str,
        ) -> std::result::Result<(), KoraError> {
            Ok(())
        }
    }

    /// Scripted provider: pops canned replies, records requests.
    struct ScriptedProvider {
        replies: Mutex<Vec<String>>,
        seen_systems: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                seen_systems: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn send(&self, req: &ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
            self.seen_systems.lock().unwrap().push(req.system.clone());
            let content = self
                .replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| "fallback".to_string());
            Ok(ChatResponse {
                content,
                model: req.model.clone(),
                tokens_in: 100,
                tokens_out: 50,
                stop_reason: "end_turn".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    struct FixedExtractor(Extraction);

    #[async_trait]
    impl kora_memory::Extractor for FixedExtractor {
        async fn extract(&self, _u: &str, _a: &str) -> kora_memory::Result<Extraction> {
            Ok(self.0.clone())
        }
    }

    struct Fixture {
        agent: Arc<AgentLoop>,
        transport: Arc<RecordingTransport>,
        provider: Arc<ScriptedProvider>,
        engine: Arc<MemoryEngine>,
    }

    fn fixture(replies: &[&str], extraction: Extraction) -> Fixture {
        let engine = Arc::new(MemoryEngine::new(
            Arc::new(SqliteStore::new(open_in_memory(8).unwrap())),
            Arc::new(HashEmbedder::new(8)),
            Arc::new(FixedExtractor(extraction)),
            EngineConfig::default(),
        ));
        let ledger =
            Arc::new(UsageLedger::new(Connection::open_in_memory().unwrap()).unwrap());
        let sessions = Arc::new(SessionManager::new(20, None).unwrap());
        let transport = Arc::new(RecordingTransport {
            sent: Mutex::new(Vec::new()),
        });
        let approvals = Arc::new(ApprovalManager::new(Duration::from_millis(100)));
        let registry = Arc::new(ToolRegistry::new(approvals, transport.clone()));
        let provider = Arc::new(ScriptedProvider::new(replies));

        let agent = Arc::new(AgentLoop::new(
            Arc::clone(&engine),
            ledger,
            sessions,
            registry,
            provider.clone(),
            Arc::new(HeuristicRouter),
            transport.clone(),
            "Default tone: warm but direct.".to_string(),
            chrono_tz::UTC,
            AgentLoopConfig::default(),
        ));
        Fixture {
            agent,
            transport,
            provider,
            engine,
        }
    }

    fn inbound(text: &str) -> InboundMessage {
        InboundMessage {
            chat_id: 42,
            user_id: 7,
            session_id: "test:42".to_string(),
            text: text.to_string(),
            media: Vec::new(),
        }
    }

    /// Poll until the background extraction lands (bounded).
    async fn wait_for_fact(engine: &MemoryEngine, domain: i64, field: &str) -> bool {
        for _ in 0..100 {
            if engine
                .store()
                .active_fact(None, domain, field)
                .unwrap()
                .is_some()
            {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn full_turn_emits_reply_and_remembers_async() {
        let f = fixture(
            &["Noted, LA sounds great."],
            Extraction {
                facts: vec![ExtractedFact {
                    target: FactTarget::User,
                    domain: 9,
                    field: "city".to_string(),
                    value: "LA".to_string(),
                    confidence: 0.9,
                    entity_name: None,
                }],
                ..Default::default()
            },
        );

        let turn = f
            .agent
            .handle_message(inbound("I moved to LA"), CancellationToken::new())
            .await
            .unwrap();
        assert!(turn.emitted);
        assert_eq!(turn.text, "Noted, LA sounds great.");
        assert_eq!(
            f.transport.sent.lock().unwrap().as_slice(),
            [(42, "Noted, LA sounds great.".to_string())]
        );

        // The reply reached the user before extraction finished; the fact
        // still lands shortly after.
        assert!(wait_for_fact(&f.engine, 9, "city").await);
    }

    #[tokio::test]
    async fn agent_self_facts_reach_the_system_prompt() {
        // An agent directive stored on a prior turn shows up on the next
        // recall, regardless of where the new message routes.
        let f = fixture(&["Short."], Extraction::default());
        f.engine
            .add_fact(
                Some(f.engine.store().agent_entity().unwrap().id),
                1,
                "tone_preference",
                "concise",
                0.9,
            )
            .await
            .unwrap();

        f.agent
            .handle_message(inbound("what's the weather like"), CancellationToken::new())
            .await
            .unwrap();

        let systems = f.provider.seen_systems.lock().unwrap();
        assert!(systems[0].contains("tone_preference: concise"));
        // Baseline comes first, directive after it.
        assert!(systems[0].find("warm but direct").unwrap() < systems[0].find("tone_preference").unwrap());
    }

    #[tokio::test]
    async fn wake_with_silence_marker_sends_nothing() {
        let f = fixture(&[SILENCE_MARKER], Extraction::default());
        let turn = f
            .agent
            .handle_wake(&WakeEvent {
                chat_id: 42,
                keyword: "meds".to_string(),
                one_time: false,
            })
            .await
            .unwrap();
        assert!(!turn.emitted);
        assert!(f.transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn wake_with_text_notifies_and_recalls_the_keyword() {
        // The fire recalls its keyword; every stored medication fact
        // shapes the prompt, so later additions ride along.
        let f = fixture(&["Time for your meds, with food."], Extraction::default());
        f.engine
            .add_fact(None, 12, "medication", "take meds", 0.9)
            .await
            .unwrap();
        f.engine
            .add_fact(None, 12, "medication_note", "take with food", 0.9)
            .await
            .unwrap();

        let turn = f
            .agent
            .handle_wake(&WakeEvent {
                chat_id: 42,
                keyword: "meds".to_string(),
                one_time: true,
            })
            .await
            .unwrap();
        assert!(turn.emitted);

        let systems = f.provider.seen_systems.lock().unwrap();
        assert!(systems[0].contains("medication: take meds"));
        assert!(systems[0].contains("medication_note: take with food"));
        let sent = f.transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 42);
    }

    #[tokio::test]
    async fn cancelled_request_spawns_no_remember() {
        let f = fixture(
            &["ignored"],
            Extraction {
                facts: vec![ExtractedFact {
                    target: FactTarget::User,
                    domain: 9,
                    field: "city".to_string(),
                    value: "LA".to_string(),
                    confidence: 0.9,
                    entity_name: None,
                }],
                ..Default::default()
            },
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = f
            .agent
            .handle_message(inbound("I moved to LA"), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert!(f.transport.sent.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f
            .engine
            .store()
            .active_fact(None, 9, "city")
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn same_session_messages_never_interleave() {
        let f = fixture(&["first reply", "second reply"], Extraction::default());
        let a = {
            let agent = Arc::clone(&f.agent);
            tokio::spawn(async move {
                agent
                    .handle_message(inbound("message one"), CancellationToken::new())
                    .await
                    .unwrap()
            })
        };
        let b = {
            let agent = Arc::clone(&f.agent);
            tokio::spawn(async move {
                agent
                    .handle_message(inbound("message two"), CancellationToken::new())
                    .await
                    .unwrap()
            })
        };
        a.await.unwrap();
        b.await.unwrap();

        // Both completed; the single-flight lock means the second saw the
        // first turn in its history (2 sends, 4 buffered turns).
        assert_eq!(f.transport.sent.lock().unwrap().len(), 2);
    }
}
