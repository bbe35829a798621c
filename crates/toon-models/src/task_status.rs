//! Persisted task status record.
//!
//! One flat JSON document per task. Every write replaces the whole
//! document, so a reader polling the record always sees one of the shapes
//! produced by the constructors below.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Task processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task was created and is waiting for its worker
    #[default]
    Queued,
    /// Worker has started on the task
    Processing,
    /// A usable artifact was produced (possibly degraded, see the note)
    Done,
    /// Stylization failed; no artifact
    Error,
}

impl TaskStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Machine-readable reason why a non-default artifact was returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskNote {
    /// Template supplied without a prompt: used only as a style reference
    UsedTemplateAsStyle,
    /// Compositing into the template failed
    InsertionFailed,
    /// No template was available or configured
    NoTemplate,
    /// A default template was configured but is not on disk
    TemplateMissing,
}

impl TaskNote {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskNote::UsedTemplateAsStyle => "used_template_as_style",
            TaskNote::InsertionFailed => "insertion_failed",
            TaskNote::NoTemplate => "no_template",
            TaskNote::TemplateMissing => "template_missing",
        }
    }
}

impl std::fmt::Display for TaskNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The persisted per-task document.
///
/// Absent optional fields are omitted from the JSON rather than written
/// as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TaskRecord {
    pub status: TaskStatus,
    /// URL of the stylized-only artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stylized_url: Option<String>,
    /// URL of the composited artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<TaskNote>,
    /// Failure detail: the terminal error, or the absorbed one behind a degraded result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskRecord {
    fn with_status(status: TaskStatus) -> Self {
        Self {
            status,
            stylized_url: None,
            result_url: None,
            note: None,
            error: None,
        }
    }

    /// Record written when the task is created.
    pub fn queued() -> Self {
        Self::with_status(TaskStatus::Queued)
    }

    /// Record written when the worker picks the task up.
    pub fn processing() -> Self {
        Self::with_status(TaskStatus::Processing)
    }

    /// Success with the composited artifact.
    pub fn done_with_final(result_url: impl Into<String>) -> Self {
        Self {
            result_url: Some(result_url.into()),
            ..Self::with_status(TaskStatus::Done)
        }
    }

    /// Success with the stylized artifact only.
    pub fn done_with_stylized(
        stylized_url: impl Into<String>,
        note: Option<TaskNote>,
        error: Option<String>,
    ) -> Self {
        Self {
            stylized_url: Some(stylized_url.into()),
            note,
            error,
            ..Self::with_status(TaskStatus::Done)
        }
    }

    /// Terminal failure; no artifact.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::with_status(TaskStatus::Error)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The URL reported to the caller, if any.
    pub fn artifact_url(&self) -> Option<&str> {
        self.result_url.as_deref().or(self.stylized_url.as_deref())
    }

    /// Check the record shape against its status.
    ///
    /// Terminal records carry exactly one outcome: the final artifact, the
    /// stylized artifact, or an error status. Non-terminal records carry
    /// nothing but the status.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            TaskStatus::Queued | TaskStatus::Processing => {
                self.stylized_url.is_none()
                    && self.result_url.is_none()
                    && self.note.is_none()
                    && self.error.is_none()
            }
            TaskStatus::Done => {
                self.result_url.is_some() != self.stylized_url.is_some()
                    && (self.result_url.is_none() || (self.note.is_none() && self.error.is_none()))
            }
            TaskStatus::Error => {
                self.error.is_some()
                    && self.stylized_url.is_none()
                    && self.result_url.is_none()
                    && self.note.is_none()
            }
        }
    }
}
