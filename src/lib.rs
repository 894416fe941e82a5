use thiserror::Error;

pub type Result<T> = std::result::Result<T, QaError>;

#[derive(Error, Debug)]
pub enum QaError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("No document indexed for session '{session_id}'")]
    IndexNotFound { session_id: String },

    #[error("Index for session '{session_id}' is inconsistent: {reason}")]
    IndexInconsistent { session_id: String, reason: String },

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("Completion service error: {0}")]
    Completion(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl QaError {
    /// Whether the same request may succeed if simply tried again.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Completion(_) | Self::Embedding(_) | Self::IndexInconsistent { .. }
        )
    }
}

pub mod commands;
pub mod composer;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod index;
pub mod language;
pub mod pipeline;
pub mod session;
