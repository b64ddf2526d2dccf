//! `kora-sessions` — per-chat conversation identity and rolling history.
//!
//! A session is `<transport>:<chat_id>`. Each one keeps the last N turns
//! (user text, assistant text, tool trace summaries) in memory for context
//! assembly; persistence to the `conversations` table is best-effort and
//! only used to reseed the window after a restart.

pub mod db;
pub mod error;
pub mod manager;
pub mod types;

pub use error::{Result, SessionError};
pub use manager::{SessionManager, DEFAULT_WINDOW};
pub use types::{SessionKey, Turn, TurnRole};
