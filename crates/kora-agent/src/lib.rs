//! `kora-agent` — the conversational loop and everything it dispatches.
//!
//! # Overview
//!
//! One inbound message flows: route → recall → context assembly → LLM →
//! tool dispatch → emit → detached Remember. The pieces:
//!
//! - [`provider`] / [`failover`] — the LLM boundary with retry + failover
//! - [`router`] — per-message domain routing (LLM with heuristic fallback)
//! - [`embedder`] / [`extractor`] — HTTP collaborators the memory engine
//!   calls through its traits
//! - [`tools`] — registry, dispatch loop, and the built-in tool set
//! - [`approval`] — owner-locked gate for dangerous tools
//! - [`pipeline`] — context assembly and the [`pipeline::AgentLoop`] itself
//!
//! Chat transports stay outside this crate; they feed `InboundMessage`s in
//! and implement `kora_core::Transport` for the way back out.

pub mod approval;
pub mod embedder;
pub mod error;
pub mod extractor;
pub mod failover;
pub mod ollama;
pub mod personality;
pub mod pipeline;
pub mod provider;
pub mod router;
pub mod stream;
pub mod tools;

pub use approval::{ApprovalError, ApprovalManager, ApprovalOutcome};
pub use error::AgentError;
pub use pipeline::{AgentLoop, AgentLoopConfig, SILENCE_MARKER};
pub use provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
pub use router::{DomainRouter, HeuristicRouter, LlmRouter};
pub use tools::registry::ToolRegistry;
pub use tools::{Tool, ToolContext, ToolResult};
