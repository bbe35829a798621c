//! Task orchestration.
//!
//! A task moves `queued -> processing -> {done, error}`. Only a failed
//! stylization call ends in `error`; everything downstream of a
//! successful stylization degrades to `done` with a note, since the
//! stylized image is already useful on its own.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use metrics::counter;
use tokio::fs;
use tracing::{warn, Instrument};

use toon_media::{Compositor, FaceInserter, FaceLocator, NoFaceLocator};
use toon_ml_client::{HttpFaceLocator, MlError, ReplicateClient, StylizeRequest, Stylizer};
use toon_models::{TaskId, TaskNote, TaskRecord, TaskRequest, TaskStatus};
use toon_storage::{result_url, Artifact, TaskStore};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::TaskLogger;

/// Template chosen for a task before stylization.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EffectiveTemplate {
    /// The user's own template
    Supplied(PathBuf),
    /// The process-wide default
    Default(PathBuf),
    /// A default is configured but not on disk
    DefaultMissing,
    /// No default is configured
    Unconfigured,
}

impl EffectiveTemplate {
    fn path(&self) -> Option<&Path> {
        match self {
            EffectiveTemplate::Supplied(p) | EffectiveTemplate::Default(p) => Some(p),
            EffectiveTemplate::DefaultMissing | EffectiveTemplate::Unconfigured => None,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            EffectiveTemplate::Supplied(_) => "supplied",
            EffectiveTemplate::Default(_) => "default",
            EffectiveTemplate::DefaultMissing => "default missing",
            EffectiveTemplate::Unconfigured => "none",
        }
    }
}

/// Runs one task from `processing` to its terminal record.
pub struct TaskPipeline {
    store: TaskStore,
    stylizer: Arc<dyn Stylizer>,
    inserter: FaceInserter,
    default_template: Option<PathBuf>,
    result_url_prefix: String,
}

impl TaskPipeline {
    pub fn new(store: TaskStore, stylizer: Arc<dyn Stylizer>, inserter: FaceInserter) -> Self {
        Self {
            store,
            stylizer,
            inserter,
            default_template: None,
            result_url_prefix: "/result".to_string(),
        }
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &WorkerConfig) -> Self {
        let locator: Arc<dyn FaceLocator> = match &config.face_service_url {
            Some(url) => Arc::new(HttpFaceLocator::new(url)),
            None => Arc::new(NoFaceLocator),
        };
        let inserter = FaceInserter::new(locator)
            .with_compositor(Compositor::new().with_feather_radius(config.feather_radius));

        Self::new(
            TaskStore::new(&config.tasks_dir),
            Arc::new(ReplicateClient::new(config.replicate.clone())),
            inserter,
        )
        .with_default_template(config.default_template.clone())
        .with_result_url_prefix(config.result_url_prefix.clone())
    }

    pub fn with_default_template(mut self, path: Option<PathBuf>) -> Self {
        self.default_template = path;
        self
    }

    pub fn with_result_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.result_url_prefix = prefix.into();
        self
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Process a task and persist exactly one terminal record.
    ///
    /// Never fails: every error becomes part of the returned record.
    pub async fn run(&self, request: &TaskRequest) -> TaskRecord {
        let logger = TaskLogger::new(&request.id, "stylize_task");
        let span = logger.create_span();

        async {
            logger.log_start(&format!("input {}", request.input_path.display()));

            let record = match self.process(request, &logger).await {
                Ok(record) => record,
                Err(e) => {
                    logger.log_error(&e.to_string());
                    TaskRecord::failed(e.to_string())
                }
            };

            if let Err(e) = self.store.write_record(&request.id, &record).await {
                logger.log_error(&format!("failed to persist terminal record: {}", e));
            }

            let outcome = outcome_label(&record);
            counter!("toon_tasks_finished_total", "outcome" => outcome).increment(1);
            logger.log_completion(&format!("status={} outcome={}", record.status, outcome));
            record
        }
        .instrument(span)
        .await
    }

    async fn process(&self, request: &TaskRequest, logger: &TaskLogger) -> WorkerResult<TaskRecord> {
        let id = &request.id;
        self.store.write_record(id, &TaskRecord::processing()).await?;

        let template = self.effective_template(request, logger).await;
        let prompt = request.usable_prompt();
        logger.log_progress(&format!(
            "stylizing (template: {}, prompt: {})",
            template.describe(),
            if prompt.is_some() { "custom" } else { "default" }
        ));

        let stylize_request = StylizeRequest::new(&request.input_path)
            .with_style_reference(template.path().map(Path::to_path_buf))
            .with_prompt(prompt.map(str::to_string));
        let bytes = match self.stylizer.stylize(&stylize_request).await {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.stylization_error(id, e).await),
        };

        let stylized_path = self.store.artifact_path(id, &Artifact::Stylized);
        fs::write(&stylized_path, &bytes).await?;
        let stylized_url = self.url(id, &Artifact::Stylized);
        logger.log_progress(&format!("stylized image written ({} bytes)", bytes.len()));

        // A template without a prompt is a style reference, not a scene
        if request.has_user_template() && prompt.is_none() {
            return Ok(TaskRecord::done_with_stylized(
                stylized_url,
                Some(TaskNote::UsedTemplateAsStyle),
                None,
            ));
        }

        let template_path = match template {
            EffectiveTemplate::Supplied(path) | EffectiveTemplate::Default(path) => path,
            EffectiveTemplate::DefaultMissing => {
                return Ok(TaskRecord::done_with_stylized(
                    stylized_url,
                    Some(TaskNote::TemplateMissing),
                    None,
                ));
            }
            EffectiveTemplate::Unconfigured => {
                return Ok(TaskRecord::done_with_stylized(
                    stylized_url,
                    Some(TaskNote::NoTemplate),
                    None,
                ));
            }
        };

        let final_path = self.store.artifact_path(id, &Artifact::Final);
        match self.inserter.insert(&stylized_path, &template_path, &final_path).await {
            Ok(region) => {
                logger.log_progress(&format!(
                    "inserted into {}x{} region at ({}, {})",
                    region.width, region.height, region.x, region.y
                ));
                Ok(TaskRecord::done_with_final(self.url(id, &Artifact::Final)))
            }
            Err(e) => {
                logger.log_warning(&format!("face insertion failed, returning stylized image: {}", e));
                remove_partial(&final_path).await;
                Ok(TaskRecord::done_with_stylized(
                    stylized_url,
                    Some(TaskNote::InsertionFailed),
                    Some(e.to_string()),
                ))
            }
        }
    }

    /// The user's template when readable, else the default when present.
    async fn effective_template(&self, request: &TaskRequest, logger: &TaskLogger) -> EffectiveTemplate {
        if let Some(path) = &request.template_path {
            if is_readable(path).await {
                return EffectiveTemplate::Supplied(path.clone());
            }
            logger.log_warning(&format!(
                "supplied template {} is unreadable, falling back to default",
                path.display()
            ));
        }

        match &self.default_template {
            None => EffectiveTemplate::Unconfigured,
            Some(path) => {
                if is_readable(path).await {
                    EffectiveTemplate::Default(path.clone())
                } else {
                    EffectiveTemplate::DefaultMissing
                }
            }
        }
    }

    /// Convert a stylization failure, dumping unusable raw output beside
    /// the artifact it should have produced.
    async fn stylization_error(&self, id: &TaskId, err: MlError) -> WorkerError {
        let Some(raw) = err.raw_output() else {
            return err.into();
        };
        match self.store.write_debug_dump(id, &Artifact::Stylized, raw).await {
            Ok(dump) => WorkerError::UnusableOutput { source: err, dump },
            Err(e) => {
                warn!(task_id = %id, error = %e, "Failed to write stylization debug dump");
                err.into()
            }
        }
    }

    fn url(&self, id: &TaskId, artifact: &Artifact) -> String {
        result_url(&self.result_url_prefix, id, artifact)
    }
}

/// Metrics label for a terminal record.
fn outcome_label(record: &TaskRecord) -> &'static str {
    if record.status == TaskStatus::Error {
        return "error";
    }
    record.note.as_ref().map(TaskNote::as_str).unwrap_or("final")
}

async fn is_readable(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

async fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove partial output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{ImageOutputFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use toon_media::{MediaError, MediaResult};
    use toon_ml_client::MlResult;
    use toon_models::{NormalizedRect, TaskSubmission};

    enum Reply {
        Image(Vec<u8>),
        Fail(&'static str),
        Unusable(&'static str),
    }

    /// Stylizer that records each call and the task status seen meanwhile.
    struct FakeStylizer {
        reply: Reply,
        store: TaskStore,
        calls: Mutex<Vec<(StylizeRequest, TaskStatus)>>,
    }

    impl FakeStylizer {
        fn new(store: &TaskStore, reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                store: store.clone(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(StylizeRequest, TaskStatus)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Stylizer for FakeStylizer {
        async fn stylize(&self, request: &StylizeRequest) -> MlResult<Vec<u8>> {
            let task = request
                .input_path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .unwrap();
            let status = self
                .store
                .read_record(&TaskId::from_string(task))
                .await
                .unwrap()
                .status;
            self.calls.lock().unwrap().push((request.clone(), status));

            match &self.reply {
                Reply::Image(bytes) => Ok(bytes.clone()),
                Reply::Fail(msg) => Err(MlError::prediction_failed(*msg)),
                Reply::Unusable(raw) => Err(MlError::UnusableOutput { raw: raw.to_string() }),
            }
        }
    }

    struct BrokenLocator;

    #[async_trait]
    impl FaceLocator for BrokenLocator {
        async fn locate(&self, _image: &RgbaImage) -> MediaResult<Vec<NormalizedRect>> {
            Err(MediaError::detection_failed("detector offline"))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    struct OversizedLocator;

    #[async_trait]
    impl FaceLocator for OversizedLocator {
        async fn locate(&self, _image: &RgbaImage) -> MediaResult<Vec<NormalizedRect>> {
            Ok(vec![NormalizedRect::new(0.0, 0.0, 1e12, 1e12)])
        }

        fn name(&self) -> &'static str {
            "oversized"
        }
    }

    fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let mut buf = Vec::new();
        RgbaImage::from_pixel(width, height, Rgba(color))
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    struct Fixture {
        dir: TempDir,
        store: TaskStore,
        photo: PathBuf,
        template: PathBuf,
        default_template: PathBuf,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path().join("tasks"));
        store.init().await.unwrap();

        let photo = dir.path().join("kid.jpg");
        fs::write(&photo, b"photo").await.unwrap();
        let template = dir.path().join("scene.png");
        fs::write(&template, png(400, 320, [0, 0, 255, 255])).await.unwrap();
        let default_template = dir.path().join("default.png");
        fs::write(&default_template, png(200, 200, [0, 255, 0, 255])).await.unwrap();

        Fixture {
            dir,
            store,
            photo,
            template,
            default_template,
        }
    }

    fn pipeline(fx: &Fixture, stylizer: Arc<FakeStylizer>, locator: Arc<dyn FaceLocator>) -> TaskPipeline {
        TaskPipeline::new(fx.store.clone(), stylizer, FaceInserter::new(locator))
            .with_default_template(Some(fx.default_template.clone()))
    }

    fn stylized_png() -> Reply {
        Reply::Image(png(80, 120, [255, 0, 0, 255]))
    }

    async fn submit(fx: &Fixture, submission: TaskSubmission) -> TaskRequest {
        fx.store.create_task(&submission).await.unwrap()
    }

    async fn assert_persisted(fx: &Fixture, request: &TaskRequest, record: &TaskRecord) {
        assert!(record.is_consistent(), "inconsistent record: {:?}", record);
        assert_eq!(&fx.store.read_record(&request.id).await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_template_without_prompt_is_style_only() {
        let fx = fixture().await;
        let stylizer = FakeStylizer::new(&fx.store, stylized_png());
        let pipeline = pipeline(&fx, stylizer.clone(), Arc::new(NoFaceLocator));
        let request = submit(&fx, TaskSubmission::new(&fx.photo).with_template(&fx.template).with_prompt("   ")).await;

        let record = pipeline.run(&request).await;

        assert_eq!(record.status, TaskStatus::Done);
        assert_eq!(record.note, Some(TaskNote::UsedTemplateAsStyle));
        assert_eq!(
            record.stylized_url.as_deref(),
            Some(format!("/result/{}/stylized.png", request.id).as_str())
        );
        assert!(record.result_url.is_none());
        assert!(!fx.store.artifact_path(&request.id, &Artifact::Final).exists());
        assert_persisted(&fx, &request, &record).await;

        let calls = stylizer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.style_reference, request.template_path);
        assert_eq!(calls[0].0.prompt, None);
        assert_eq!(calls[0].1, TaskStatus::Processing);
    }

    #[tokio::test]
    async fn test_template_and_prompt_produces_final() {
        let fx = fixture().await;
        let stylizer = FakeStylizer::new(&fx.store, stylized_png());
        let pipeline = pipeline(&fx, stylizer.clone(), Arc::new(NoFaceLocator));
        let request = submit(&fx, TaskSubmission::new(&fx.photo).with_template(&fx.template).with_prompt("a pirate")).await;

        let record = pipeline.run(&request).await;

        assert_eq!(record.status, TaskStatus::Done);
        assert_eq!(
            record.result_url.as_deref(),
            Some(format!("/result/{}/final.png", request.id).as_str())
        );
        assert!(record.note.is_none());
        assert_persisted(&fx, &request, &record).await;

        let final_image = image::open(fx.store.artifact_path(&request.id, &Artifact::Final)).unwrap();
        assert_eq!((final_image.width(), final_image.height()), (400, 320));
        assert_eq!(stylizer.calls()[0].0.prompt.as_deref(), Some("a pirate"));
    }

    #[tokio::test]
    async fn test_insertion_failure_degrades_to_stylized() {
        let fx = fixture().await;
        let stylizer = FakeStylizer::new(&fx.store, stylized_png());
        let pipeline = pipeline(&fx, stylizer, Arc::new(BrokenLocator));
        let request = submit(&fx, TaskSubmission::new(&fx.photo).with_template(&fx.template).with_prompt("a pirate")).await;

        let record = pipeline.run(&request).await;

        assert_eq!(record.status, TaskStatus::Done);
        assert_eq!(record.note, Some(TaskNote::InsertionFailed));
        assert!(record.stylized_url.is_some());
        assert!(record.error.as_deref().unwrap().contains("detector offline"));
        assert!(!fx.store.artifact_path(&request.id, &Artifact::Final).exists());
        assert_persisted(&fx, &request, &record).await;
    }

    #[tokio::test]
    async fn test_oversized_detection_still_completes() {
        let fx = fixture().await;
        let stylizer = FakeStylizer::new(&fx.store, stylized_png());
        let pipeline = pipeline(&fx, stylizer, Arc::new(OversizedLocator));
        let request = submit(&fx, TaskSubmission::new(&fx.photo).with_template(&fx.template).with_prompt("a pirate")).await;

        let record = pipeline.run(&request).await;

        assert_eq!(record.status, TaskStatus::Done);
        assert!(record.result_url.is_some(), "unexpected record: {:?}", record);
        assert_persisted(&fx, &request, &record).await;
        let final_image = image::open(fx.store.artifact_path(&request.id, &Artifact::Final)).unwrap();
        assert_eq!((final_image.width(), final_image.height()), (400, 320));
    }

    #[tokio::test]
    async fn test_missing_default_template() {
        let fx = fixture().await;
        let stylizer = FakeStylizer::new(&fx.store, stylized_png());
        let pipeline = pipeline(&fx, stylizer.clone(), Arc::new(NoFaceLocator))
            .with_default_template(Some(fx.dir.path().join("gone.png")));
        let request = submit(&fx, TaskSubmission::new(&fx.photo).with_prompt("a pirate")).await;

        let record = pipeline.run(&request).await;

        assert_eq!(record.status, TaskStatus::Done);
        assert_eq!(record.note, Some(TaskNote::TemplateMissing));
        assert!(record.stylized_url.is_some());
        assert_persisted(&fx, &request, &record).await;
        assert_eq!(stylizer.calls()[0].0.style_reference, None);
    }

    #[tokio::test]
    async fn test_unconfigured_default_template() {
        let fx = fixture().await;
        let stylizer = FakeStylizer::new(&fx.store, stylized_png());
        let pipeline = pipeline(&fx, stylizer, Arc::new(NoFaceLocator)).with_default_template(None);
        let request = submit(&fx, TaskSubmission::new(&fx.photo).with_prompt("a pirate")).await;

        let record = pipeline.run(&request).await;

        assert_eq!(record.note, Some(TaskNote::NoTemplate));
        assert_persisted(&fx, &request, &record).await;
    }

    #[tokio::test]
    async fn test_default_template_used_for_insertion() {
        let fx = fixture().await;
        let stylizer = FakeStylizer::new(&fx.store, stylized_png());
        let pipeline = pipeline(&fx, stylizer.clone(), Arc::new(NoFaceLocator));
        let request = submit(&fx, TaskSubmission::new(&fx.photo).with_prompt("a pirate")).await;

        let record = pipeline.run(&request).await;

        assert!(record.result_url.is_some());
        assert_persisted(&fx, &request, &record).await;
        let final_image = image::open(fx.store.artifact_path(&request.id, &Artifact::Final)).unwrap();
        assert_eq!((final_image.width(), final_image.height()), (200, 200));
        assert_eq!(stylizer.calls()[0].0.style_reference, Some(fx.default_template.clone()));
    }

    #[tokio::test]
    async fn test_unreadable_user_template_falls_back_to_default() {
        let fx = fixture().await;
        let stylizer = FakeStylizer::new(&fx.store, stylized_png());
        let pipeline = pipeline(&fx, stylizer.clone(), Arc::new(NoFaceLocator));
        let request = submit(&fx, TaskSubmission::new(&fx.photo).with_template(&fx.template).with_prompt("a pirate")).await;
        fs::remove_file(request.template_path.as_ref().unwrap()).await.unwrap();

        let record = pipeline.run(&request).await;

        assert!(record.result_url.is_some());
        assert_eq!(stylizer.calls()[0].0.style_reference, Some(fx.default_template.clone()));
    }

    #[tokio::test]
    async fn test_stylization_failure_is_terminal() {
        let fx = fixture().await;
        let stylizer = FakeStylizer::new(&fx.store, Reply::Fail("failed: quota exceeded"));
        let pipeline = pipeline(&fx, stylizer, Arc::new(NoFaceLocator));
        let request = submit(&fx, TaskSubmission::new(&fx.photo).with_template(&fx.template).with_prompt("a pirate")).await;

        let record = pipeline.run(&request).await;

        assert_eq!(record.status, TaskStatus::Error);
        assert!(record.error.as_deref().unwrap().contains("quota exceeded"));
        assert!(record.stylized_url.is_none() && record.result_url.is_none());
        assert!(!fx.store.artifact_path(&request.id, &Artifact::Stylized).exists());
        assert!(!fx.store.artifact_path(&request.id, &Artifact::Final).exists());
        assert_persisted(&fx, &request, &record).await;
    }

    #[tokio::test]
    async fn test_unusable_output_is_dumped() {
        let fx = fixture().await;
        let stylizer = FakeStylizer::new(&fx.store, Reply::Unusable(r#"{"weird":42}"#));
        let pipeline = pipeline(&fx, stylizer, Arc::new(NoFaceLocator));
        let request = submit(&fx, TaskSubmission::new(&fx.photo).with_prompt("a pirate")).await;

        let record = pipeline.run(&request).await;

        assert_eq!(record.status, TaskStatus::Error);
        let dump = fx.store.task_dir(&request.id).join("stylized.png.debug.txt");
        assert!(record.error.as_deref().unwrap().contains("stylized.png.debug.txt"));
        assert!(fs::read_to_string(&dump).await.unwrap().contains(r#"{"weird":42}"#));
        assert_persisted(&fx, &request, &record).await;
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome_label(&TaskRecord::failed("boom")), "error");
        assert_eq!(outcome_label(&TaskRecord::done_with_final("/r/final.png")), "final");
        let degraded = TaskRecord::done_with_stylized("/r/stylized.png", Some(TaskNote::NoTemplate), None);
        assert_eq!(outcome_label(&degraded), "no_template");
    }
}
