//! Stylization seam.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::MlResult;

/// Inputs to one stylization call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylizeRequest {
    /// The photo to stylize
    pub input_path: PathBuf,
    /// Image whose look the output should match
    pub style_reference: Option<PathBuf>,
    /// Free-text guidance; implementations treat blank as absent
    pub prompt: Option<String>,
}

impl StylizeRequest {
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            style_reference: None,
            prompt: None,
        }
    }

    pub fn with_style_reference(mut self, path: Option<PathBuf>) -> Self {
        self.style_reference = path;
        self
    }

    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = prompt;
        self
    }
}

/// Produces a stylized image from a photo.
///
/// Calls may block for a long time and are not retried; any error is
/// final for the task that made the call.
#[async_trait]
pub trait Stylizer: Send + Sync {
    /// Returns the encoded output image.
    async fn stylize(&self, request: &StylizeRequest) -> MlResult<Vec<u8>>;
}
