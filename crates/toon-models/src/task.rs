//! Task identity and submission types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returns the prompt only if it carries non-whitespace text.
fn usable(prompt: Option<&str>) -> Option<&str> {
    prompt.map(str::trim).filter(|p| !p.is_empty())
}

/// What the upload side hands over before a task exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TaskSubmission {
    /// The raw photo to stylize
    pub photo_path: PathBuf,
    /// Optional user-supplied template image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_path: Option<PathBuf>,
    /// Optional free-text instruction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Rejection reasons for a submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("Please provide either a template image or a custom prompt.")]
    NothingToDo,
}

impl TaskSubmission {
    pub fn new(photo_path: impl Into<PathBuf>) -> Self {
        Self {
            photo_path: photo_path.into(),
            ..Default::default()
        }
    }

    pub fn with_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(path.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// A submission must carry a template or a non-blank prompt.
    pub fn validate(&self) -> Result<(), SubmissionError> {
        if self.template_path.is_none() && usable(self.prompt.as_deref()).is_none() {
            return Err(SubmissionError::NothingToDo);
        }
        Ok(())
    }
}

/// A task ready for the orchestrator.
///
/// Paths point inside the task's own namespace, which the upload side has
/// already populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TaskRequest {
    /// Unique task ID
    pub id: TaskId,
    /// Raw uploaded photo (read-only to the pipeline)
    pub input_path: PathBuf,
    /// User-supplied template, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_path: Option<PathBuf>,
    /// Free-text instruction, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl TaskRequest {
    pub fn new(id: TaskId, input_path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            input_path: input_path.into(),
            template_path: None,
            prompt: None,
        }
    }

    pub fn with_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(path.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// The prompt trimmed of surrounding whitespace, or `None` when blank.
    pub fn usable_prompt(&self) -> Option<&str> {
        usable(self.prompt.as_deref())
    }

    /// Whether the user supplied a template, readable or not.
    pub fn has_user_template(&self) -> bool {
        self.template_path.is_some()
    }
}
