use thiserror::Error;

/// Errors that can occur within the cron subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The schedule string is neither a cron expression nor `@every <dur>`.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// No cron with the given id exists.
    #[error("cron not found: {id}")]
    NotFound { id: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
