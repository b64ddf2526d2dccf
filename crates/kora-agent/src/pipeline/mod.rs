//! Message pipeline: context assembly plus the agent loop that every
//! transport feeds into.

pub mod context;
pub mod process;

pub use process::{AgentLoop, AgentLoopConfig, ProcessedTurn, SILENCE_MARKER};
