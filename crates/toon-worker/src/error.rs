//! Worker error types.

use std::path::PathBuf;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Stylization failed: {0}")]
    Stylization(#[from] toon_ml_client::MlError),

    #[error("Stylization failed: {source} (raw output written to {})", .dump.display())]
    UnusableOutput {
        source: toon_ml_client::MlError,
        dump: PathBuf,
    },

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Storage error: {0}")]
    Storage(#[from] toon_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] toon_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn panicked(msg: impl Into<String>) -> Self {
        Self::Panicked(msg.into())
    }
}
