//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("File not ready: {0}")]
    NotReady(String),

    #[error("Forbidden file name: {0}")]
    Forbidden(String),

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("Invalid task id: {0}")]
    InvalidTaskId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn not_ready(name: impl Into<String>) -> Self {
        Self::NotReady(name.into())
    }

    pub fn forbidden(name: impl Into<String>) -> Self {
        Self::Forbidden(name.into())
    }

    pub fn invalid_submission(msg: impl Into<String>) -> Self {
        Self::InvalidSubmission(msg.into())
    }
}
