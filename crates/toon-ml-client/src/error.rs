//! ML client error types.

use thiserror::Error;

pub type MlResult<T> = Result<T, MlError>;

#[derive(Debug, Error)]
pub enum MlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stylization request failed: {0}")]
    Request(String),

    #[error("Stylization service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Prediction did not succeed: {0}")]
    PredictionFailed(String),

    #[error("Stylization service returned no output")]
    EmptyOutput,

    #[error("Could not extract a downloadable reference from stylization output")]
    UnusableOutput { raw: String },

    #[error("Download of stylized image failed: {0}")]
    Download(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MlError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    pub fn prediction_failed(msg: impl Into<String>) -> Self {
        Self::PredictionFailed(msg.into())
    }

    pub fn download(msg: impl Into<String>) -> Self {
        Self::Download(msg.into())
    }

    /// The raw service output, when the failure was an unusable response.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            MlError::UnusableOutput { raw } => Some(raw),
            _ => None,
        }
    }
}
