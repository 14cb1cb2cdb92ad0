//! Caller-visible failures of the upload and chat pipelines.
//!
//! Per-URL fetch failures and shortening failures are recovered where they
//! happen and never show up here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Bad request input: empty query, empty upload, too many files.
    #[error("{0}")]
    InvalidInput(String),

    #[error("Knowledge base is not yet built. Please use the /upload endpoint first.")]
    KnowledgeBaseUninitialized,

    #[error("Could not extract any text from the provided sources.")]
    NoContentExtracted,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ChatError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ChatError::InvalidInput(message.into())
    }

    /// Whether the failure was caused by the request rather than the backend.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ChatError::Internal(_))
    }
}
