//! Toonify task worker.
//!
//! This crate provides:
//! - Worker configuration from the environment
//! - The task pipeline: stylize, then insert into a template when wanted
//! - A background executor with tracked task handles and graceful shutdown
//! - Structured task logging

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod pipeline;
pub mod templates;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{wait_for_terminal, TaskExecutor};
pub use logging::TaskLogger;
pub use pipeline::TaskPipeline;
pub use templates::ensure_default_template;
