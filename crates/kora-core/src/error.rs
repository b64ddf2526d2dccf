use thiserror::Error;

/// Error classification. Every error in the system maps to one of these
/// kinds; propagation policy is decided by kind, not by variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Recoverable; surfaced to the caller.
    NotFound,
    /// Bad tool args, bad cron expression, bad fact. User-friendly message.
    Validation,
    /// Contradiction detected; a signal, not a failure.
    Conflict,
    /// LLM / embedder / transport failure. Bounded retries, then degrade.
    External,
    /// Approval mismatch, dangerous tool without approval. Refuse + warn.
    Security,
    /// Store corruption, missing schema. Abort the process.
    Fatal,
}

#[derive(Debug, Error)]
pub enum KoraError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("external service error: {0}")]
    External(String),

    #[error("security violation: {0}")]
    Security(String),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KoraError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KoraError::NotFound(_) => ErrorKind::NotFound,
            KoraError::Validation(_) | KoraError::Serialization(_) => ErrorKind::Validation,
            KoraError::Conflict(_) => ErrorKind::Conflict,
            KoraError::External(_) => ErrorKind::External,
            KoraError::Security(_) => ErrorKind::Security,
            KoraError::Fatal(_) | KoraError::Io(_) => ErrorKind::Fatal,
        }
    }

    /// Short machine code string for logs and structured replies.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::External => "EXTERNAL",
            ErrorKind::Security => "SECURITY",
            ErrorKind::Fatal => "FATAL",
        }
    }

    /// Brief user-visible line for synchronous failure paths
    /// ("couldn't do that: <reason>").
    pub fn user_message(&self) -> String {
        format!("couldn't do that: {self}")
    }
}
