//! Filesystem-backed task namespace.

use std::path::{Path, PathBuf};

use tokio::fs;
use toon_models::{TaskId, TaskRecord, TaskRequest, TaskSubmission};
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};

/// File name of the persisted status record inside a task directory.
pub const RECORD_FILE: &str = "meta.json";

/// Extension used when the uploaded photo has none we can keep.
const DEFAULT_INPUT_EXT: &str = "jpg";

/// A named file inside a task directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// The raw upload, keeping its extension
    Input(String),
    /// A user-supplied template
    Template,
    Stylized,
    Final,
    Record,
}

impl Artifact {
    pub fn file_name(&self) -> String {
        match self {
            Artifact::Input(ext) => format!("input.{}", ext),
            Artifact::Template => "template.png".to_string(),
            Artifact::Stylized => "stylized.png".to_string(),
            Artifact::Final => "final.png".to_string(),
            Artifact::Record => RECORD_FILE.to_string(),
        }
    }
}

/// Public URL of an artifact: `{prefix}/{task_id}/{file}`.
pub fn result_url(prefix: &str, id: &TaskId, artifact: &Artifact) -> String {
    format!("{}/{}/{}", prefix.trim_end_matches('/'), id, artifact.file_name())
}

/// Root directory holding one subdirectory per task.
#[derive(Debug, Clone)]
pub struct TaskStore {
    root: PathBuf,
}

impl TaskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if needed.
    pub async fn init(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub fn task_dir(&self, id: &TaskId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub fn artifact_path(&self, id: &TaskId, artifact: &Artifact) -> PathBuf {
        self.task_dir(id).join(artifact.file_name())
    }

    /// Allocate a task, copy the uploads into its namespace and write the
    /// initial `queued` record.
    pub async fn create_task(&self, submission: &TaskSubmission) -> StorageResult<TaskRequest> {
        submission
            .validate()
            .map_err(|e| StorageError::invalid_submission(e.to_string()))?;

        let id = TaskId::new();
        let dir = self.task_dir(&id);
        fs::create_dir_all(&dir).await?;

        match self.populate_task(&id, submission).await {
            Ok(request) => {
                info!(task_id = %id, dir = %dir.display(), "Created task");
                Ok(request)
            }
            Err(e) => {
                // A directory without a record would be an unknown task forever
                if let Err(cleanup) = fs::remove_dir_all(&dir).await {
                    warn!(task_id = %id, error = %cleanup, "Failed to remove incomplete task directory");
                }
                Err(e)
            }
        }
    }

    async fn populate_task(&self, id: &TaskId, submission: &TaskSubmission) -> StorageResult<TaskRequest> {
        let input_path = self.artifact_path(id, &Artifact::Input(input_extension(&submission.photo_path)));
        fs::copy(&submission.photo_path, &input_path).await?;

        let mut request = TaskRequest::new(id.clone(), input_path);
        if let Some(template) = &submission.template_path {
            let template_path = self.artifact_path(id, &Artifact::Template);
            fs::copy(template, &template_path).await?;
            request = request.with_template(template_path);
        }
        if let Some(prompt) = &submission.prompt {
            request = request.with_prompt(prompt.clone());
        }

        self.write_record(id, &TaskRecord::queued()).await?;
        Ok(request)
    }

    /// Replace the task's record with `record`.
    ///
    /// The document is written to a sibling temp file and renamed into
    /// place, so readers see either the previous or the new snapshot.
    pub async fn write_record(&self, id: &TaskId, record: &TaskRecord) -> StorageResult<()> {
        let path = self.artifact_path(id, &Artifact::Record);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec(record)?;
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &path).await?;
        debug!(task_id = %id, status = %record.status, "Wrote task record");
        Ok(())
    }

    /// Read the task's current record.
    pub async fn read_record(&self, id: &TaskId) -> StorageResult<TaskRecord> {
        check_id(id)?;
        let path = self.artifact_path(id, &Artifact::Record);
        match fs::read(&path).await {
            Ok(body) => Ok(serde_json::from_slice(&body)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::not_found(id.as_str())),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a published result file by name.
    ///
    /// Only `final.png` and `stylized.png` may be fetched.
    pub async fn result_file(&self, id: &TaskId, file_name: &str) -> StorageResult<PathBuf> {
        check_id(id)?;
        let artifact = published(file_name).ok_or_else(|| StorageError::forbidden(file_name))?;
        let path = self.artifact_path(id, &artifact);
        if fs::try_exists(&path).await? {
            Ok(path)
        } else {
            Err(StorageError::not_ready(file_name))
        }
    }

    /// Write `<artifact>.debug.txt` with a raw payload for inspection.
    pub async fn write_debug_dump(&self, id: &TaskId, artifact: &Artifact, raw: &str) -> StorageResult<PathBuf> {
        let path = self
            .task_dir(id)
            .join(format!("{}.debug.txt", artifact.file_name()));
        fs::write(&path, format!("STYLIZATION OUTPUT DUMP:\n{}", raw)).await?;
        Ok(path)
    }
}

/// Files that may be served back to callers.
fn published(file_name: &str) -> Option<Artifact> {
    [Artifact::Final, Artifact::Stylized]
        .into_iter()
        .find(|a| a.file_name() == file_name)
}

/// Keep a lowercase alphanumeric extension, or fall back to `jpg`.
fn input_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_INPUT_EXT.to_string())
}

/// Externally supplied ids must not escape the root.
fn check_id(id: &TaskId) -> StorageResult<()> {
    let s = id.as_str();
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(StorageError::InvalidTaskId(s.to_string()));
    }
    Ok(())
}
