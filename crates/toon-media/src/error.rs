//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while locating, fitting or compositing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Cannot read image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Face detection failed: {0}")]
    DetectionFailed(String),

    #[error("Compositing failed: {0}")]
    CompositeFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an image load error carrying the offending path.
    pub fn image_load(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::ImageLoad {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        Self::InvalidGeometry(message.into())
    }

    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    pub fn composite_failed(message: impl Into<String>) -> Self {
        Self::CompositeFailed(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
