//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use toon_media::DEFAULT_FEATHER_RADIUS;
use toon_ml_client::ReplicateConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root directory holding one subdirectory per task
    pub tasks_dir: PathBuf,
    /// Template used when a task brings none; `None` disables it
    pub default_template: Option<PathBuf>,
    /// Prefix of the URLs written into task records
    pub result_url_prefix: String,
    /// Maximum concurrently running tasks; `None` means unbounded
    pub max_concurrent_tasks: Option<usize>,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Feather radius of the compositing mask, in pixels
    pub feather_radius: f32,
    /// Base URL of the face detection service; without it every template
    /// uses the fallback region
    pub face_service_url: Option<String>,
    pub replicate: ReplicateConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tasks_dir: PathBuf::from("./tasks"),
            default_template: Some(PathBuf::from("./templates/template.png")),
            result_url_prefix: "/result".to_string(),
            max_concurrent_tasks: None,
            shutdown_timeout: Duration::from_secs(30),
            feather_radius: DEFAULT_FEATHER_RADIUS,
            face_service_url: None,
            replicate: ReplicateConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            tasks_dir: std::env::var("TOON_TASKS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./tasks")),
            default_template: match std::env::var("TOON_DEFAULT_TEMPLATE") {
                Ok(path) if path.trim().is_empty() => None,
                Ok(path) => Some(PathBuf::from(path)),
                Err(_) => Some(PathBuf::from("./templates/template.png")),
            },
            result_url_prefix: std::env::var("TOON_RESULT_URL_PREFIX")
                .unwrap_or_else(|_| "/result".to_string()),
            max_concurrent_tasks: std::env::var("WORKER_MAX_TASKS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            feather_radius: std::env::var("TOON_FEATHER_RADIUS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_FEATHER_RADIUS),
            face_service_url: std::env::var("FACE_SERVICE_URL")
                .ok()
                .filter(|u| !u.trim().is_empty()),
            replicate: ReplicateConfig::from_env(),
        }
    }

    pub fn with_tasks_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tasks_dir = dir.into();
        self
    }

    pub fn with_default_template(mut self, path: Option<PathBuf>) -> Self {
        self.default_template = path;
        self
    }

    pub fn with_max_concurrent_tasks(mut self, limit: Option<usize>) -> Self {
        self.max_concurrent_tasks = limit;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
