//! Task executor.
//!
//! `start` hands a task to the runtime and returns its id at once; callers
//! learn the outcome by polling the persisted record.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use metrics::counter;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use toon_models::{TaskId, TaskRecord, TaskRequest};
use toon_storage::{StorageResult, TaskStore};

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::pipeline::TaskPipeline;

/// Spawns tasks in the background and keeps their handles for shutdown.
pub struct TaskExecutor {
    pipeline: Arc<TaskPipeline>,
    task_semaphore: Option<Arc<Semaphore>>,
    tasks: Mutex<JoinSet<()>>,
    shutdown_timeout: Duration,
}

impl TaskExecutor {
    /// Create a new task executor.
    pub fn new(pipeline: TaskPipeline, config: &WorkerConfig) -> Self {
        info!(
            max_concurrent_tasks = ?config.max_concurrent_tasks,
            "Creating task executor"
        );
        Self {
            pipeline: Arc::new(pipeline),
            task_semaphore: config
                .max_concurrent_tasks
                .map(|n| Arc::new(Semaphore::new(n))),
            tasks: Mutex::new(JoinSet::new()),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    pub fn store(&self) -> &TaskStore {
        self.pipeline.store()
    }

    /// Start processing a task in the background.
    ///
    /// Must be called from within a tokio runtime. The task stays `queued`
    /// until a concurrency permit is available.
    pub fn start(&self, request: TaskRequest) -> TaskId {
        let task_id = request.id.clone();
        let pipeline = Arc::clone(&self.pipeline);
        let semaphore = self.task_semaphore.clone();
        counter!("toon_tasks_started_total").increment(1);

        let mut tasks = self.lock_tasks();
        // Drop handles of tasks that already finished
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            let _permit = match semaphore {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        warn!(task_id = %request.id, "Task semaphore closed, running unbounded");
                        None
                    }
                },
                None => None,
            };
            Self::execute_task(pipeline, request).await;
        });

        debug!(task_id = %task_id, in_flight = tasks.len(), "Task spawned");
        task_id
    }

    /// Run the pipeline in its own task so a panic surfaces as a join
    /// error and can still be recorded.
    async fn execute_task(pipeline: Arc<TaskPipeline>, request: TaskRequest) {
        let task_id = request.id.clone();
        let worker = Arc::clone(&pipeline);
        let handle = tokio::spawn(async move { worker.run(&request).await });

        match handle.await {
            Ok(record) => {
                info!(
                    task_id = %task_id,
                    status = %record.status,
                    artifact = record.artifact_url().unwrap_or("-"),
                    "Task finished"
                );
            }
            Err(e) => {
                let detail = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    "task was cancelled".to_string()
                };
                error!(task_id = %task_id, detail = %detail, "Task aborted");

                counter!("toon_tasks_finished_total", "outcome" => "error").increment(1);
                let record = TaskRecord::failed(WorkerError::panicked(detail).to_string());
                if let Err(e) = pipeline.store().write_record(&task_id, &record).await {
                    error!(task_id = %task_id, error = %e, "Failed to record aborted task");
                }
            }
        }
    }

    /// Number of tasks not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.lock_tasks().len()
    }

    /// Wait for in-flight tasks, up to the shutdown timeout.
    ///
    /// Returns how many were still running when the timeout hit. Those are
    /// left running and end with the process.
    pub async fn shutdown(&self) -> usize {
        let mut tasks = std::mem::take(&mut *self.lock_tasks());
        info!(in_flight = tasks.len(), "Waiting for in-flight tasks to complete...");

        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Task handle failed during shutdown");
                }
            }
        })
        .await;

        match drained {
            Ok(()) => {
                info!("Task executor stopped");
                0
            }
            Err(_) => {
                let remaining = tasks.len();
                warn!(remaining, timeout = ?self.shutdown_timeout, "Shutdown timed out");
                tasks.detach_all();
                remaining
            }
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Poll a task's record until it is terminal.
pub async fn wait_for_terminal(
    store: &TaskStore,
    task_id: &TaskId,
    interval: Duration,
) -> StorageResult<TaskRecord> {
    loop {
        let record = store.read_record(task_id).await?;
        if record.is_terminal() {
            return Ok(record);
        }
        tokio::time::sleep(interval).await;
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
