use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    /// Embedder unreachable or returned garbage. Recall degrades to the
    /// keyword pass; writes leave the fact unembedded.
    #[error("embedder error: {0}")]
    Embedder(String),

    /// Extractor failed; the turn's facts are lost (logged upstream).
    #[error("extractor error: {0}")]
    Extractor(String),

    /// The store was initialised with a different embedding dimension.
    /// Fatal: re-embedding every fact requires an explicit migration.
    #[error("embedder dimension mismatch: store has {stored}, config wants {configured}")]
    DimensionMismatch { stored: usize, configured: usize },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
