//! Toonify command-line entry point.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use toon_models::{TaskId, TaskRecord, TaskStatus, TaskSubmission};
use toon_storage::TaskStore;
use toon_worker::{ensure_default_template, wait_for_terminal, TaskExecutor, TaskPipeline, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "toonify", version, about = "Turn a photo into a storybook illustration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a photo, wait for the task to finish and print its record
    Run {
        /// Photo to stylize
        #[arg(long)]
        photo: PathBuf,
        /// Template image, used as the style reference or as the scene
        #[arg(long)]
        template: Option<PathBuf>,
        /// Free-text instruction for the stylization
        #[arg(long)]
        prompt: Option<String>,
        /// Status poll interval in milliseconds
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
    },
    /// Print the stored record of a task
    Status {
        task_id: String,
    },
}

#[derive(Serialize)]
struct RunOutput<'a> {
    task_id: &'a TaskId,
    #[serde(flatten)]
    record: &'a TaskRecord,
}

fn init_tracing() -> anyhow::Result<()> {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("toon=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Required before reqwest makes its first TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let store = TaskStore::new(&config.tasks_dir);
    store.init().await.context("Failed to create tasks directory")?;
    if let Some(template) = &config.default_template {
        ensure_default_template(template).await?;
    }

    match cli.command {
        Command::Run {
            photo,
            template,
            prompt,
            poll_ms,
        } => {
            let mut submission = TaskSubmission::new(photo);
            if let Some(template) = template {
                submission = submission.with_template(template);
            }
            if let Some(prompt) = prompt {
                submission = submission.with_prompt(prompt);
            }
            let request = store.create_task(&submission).await?;

            let executor = TaskExecutor::new(TaskPipeline::from_config(&config), &config);
            let task_id = executor.start(request);
            info!(task_id = %task_id, "Task submitted");

            let record = tokio::select! {
                record = wait_for_terminal(&store, &task_id, Duration::from_millis(poll_ms)) => record?,
                _ = tokio::signal::ctrl_c() => {
                    warn!(task_id = %task_id, "Interrupted before the task finished");
                    executor.shutdown().await;
                    return Ok(());
                }
            };
            executor.shutdown().await;

            let output = RunOutput {
                task_id: &task_id,
                record: &record,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            if record.status == TaskStatus::Error {
                std::process::exit(1);
            }
        }
        Command::Status { task_id } => {
            let record = store.read_record(&TaskId::from_string(task_id)).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}
