//! Local task storage.
//!
//! This crate provides:
//! - One disjoint directory per task under a common root
//! - Stable artifact naming (`input.<ext>`, `stylized.png`, `final.png`)
//! - Whole-document status record snapshots (`meta.json`)
//! - Result file lookup restricted to the published artifacts
//! - Debug dumps for unusable stylization responses

pub mod error;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use store::{result_url, Artifact, TaskStore, RECORD_FILE};
