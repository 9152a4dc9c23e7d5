use thiserror::Error;

/// Errors raised by the index engine.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("invalid search query `{query}`: {message}")]
    QueryParse { query: String, message: String },

    #[error("index write lock is held by another process: {0}")]
    WriteConflict(String),

    #[error("index writer lock poisoned by a previous panic")]
    LockPoisoned,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the ingestion, processing, and query layers.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("invalid search query `{query}`: {message}")]
    QueryParse { query: String, message: String },

    #[error("{service} unavailable: {details}")]
    Upstream { service: String, details: String },

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job queue is closed")]
    QueueClosed,
}

impl PipelineError {
    pub fn upstream(service: impl Into<String>, details: impl ToString) -> Self {
        PipelineError::Upstream {
            service: service.into(),
            details: details.to_string(),
        }
    }

    /// True when retrying through an alternate route could help.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            PipelineError::Upstream { .. } | PipelineError::QueueClosed
        )
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
