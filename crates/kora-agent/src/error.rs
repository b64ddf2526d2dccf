use thiserror::Error;

use crate::provider::ProviderError;
use kora_memory::MemoryError;

/// Errors crossing the agent-loop boundary. Synchronous paths render these
/// as a brief assistant message; async paths only log them.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("transport error: {0}")]
    Transport(#[from] kora_core::KoraError),

    #[error("the request was cancelled")]
    Cancelled,
}

impl AgentError {
    /// Brief user-visible line for synchronous failure paths.
    pub fn user_message(&self) -> String {
        format!("couldn't do that: {self}")
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
