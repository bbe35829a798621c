//! Shared data models for the toonify pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Task identity and submissions
//! - The persisted per-task status record
//! - Detection and placement rectangles

pub mod rect;
pub mod task;
pub mod task_status;

// Re-export common types
pub use rect::{NormalizedRect, PixelRect};
pub use task::{SubmissionError, TaskId, TaskRequest, TaskSubmission};
pub use task_status::{TaskNote, TaskRecord, TaskStatus};
