use serde::{Deserialize, Serialize};

/// Events emitted by a streaming LLM response. The caller accumulates
/// `TextDelta`s; `Done` carries the usage totals for budget accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta {
        text: String,
    },
    Done {
        model: String,
        tokens_in: u32,
        tokens_out: u32,
        stop_reason: String,
    },
    Error {
        message: String,
    },
}
