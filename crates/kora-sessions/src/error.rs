use thiserror::Error;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A SQLite operation failed. Session persistence is best-effort, so
    /// callers usually log this and move on.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The provided session key string is malformed.
    ///
    /// Expected format: `<transport>:<chat_id>`
    #[error("invalid session key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
