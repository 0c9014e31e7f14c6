use clap::{Parser, Subcommand};
use exn::ResultExt;
use ingest3d::error::{Classify, ErrorKind, Result};
use ingest3d::{IngestSettings, Ingestor, Payload, job_status, provider_from_config};
use ingest3d_config::{CONFIG_PATH_ENV, Config};
use ingest3d_jobs::models::ModelMetadata;
use ingest3d_jobs::{HttpJobQueue, JobQueueHandle};
use ingest3d_staging::{FileStagingStore, StagingHandle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Discover a 3D model's files and submit them to the job manager as tasks.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON).
    #[arg(long, global = true, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,
    /// Log filter, e.g. `debug` or `ingest3d=trace`. Overrides `RUST_LOG`.
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a job for a model and submit all of its files as tasks.
    Ingest {
        #[arg(long)]
        model_id: String,
        /// Model root, relative to the storage provider's root.
        #[arg(long)]
        path: String,
        #[arg(long, default_value = "tileset.json")]
        tileset_filename: String,
        /// JSON file holding the model's metadata.
        #[arg(long)]
        metadata: Option<PathBuf>,
    },
    /// Show the progress of a job.
    Status { job_id: String },
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn job_queue(config: &Config) -> Result<JobQueueHandle> {
    let timeout = Duration::from_secs(config.job_manager.timeout_secs);
    Ok(Arc::new(HttpJobQueue::new(&config.job_manager.url, timeout).classify()?))
}

async fn read_metadata(path: Option<PathBuf>) -> Result<ModelMetadata> {
    let Some(path) = path else {
        return Ok(ModelMetadata::default());
    };
    let raw = tokio::fs::read(&path).await.or_raise(|| ErrorKind::Io)?;
    serde_json::from_slice(&raw).or_raise(|| ErrorKind::Validation(format!("invalid metadata in {}", path.display())))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).or_raise(|| ErrorKind::Io)?;
    println!("{json}");
    Ok(())
}

async fn execute(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).classify()?;
    let jobs = job_queue(&config)?;
    match cli.command {
        Command::Ingest { model_id, path, tileset_filename, metadata } => {
            let payload = Payload {
                model_id,
                path_to_tileset: path,
                tileset_filename,
                metadata: read_metadata(metadata).await?,
            };
            let staging: StagingHandle = Arc::new(FileStagingStore::new(&config.ingestion.staging_dir));
            let provider = provider_from_config(&config.provider, staging.clone())?;
            let settings = IngestSettings::from_config(&config)?;
            let response = Ingestor::new(settings, provider, staging, jobs).run(&payload).await?;
            print_json(&response)
        },
        Command::Status { job_id } => print_json(&job_status(jobs.as_ref(), &job_id).await?),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());
    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(
                status = err.status_code(),
                operational = err.is_operational(),
                error = ?err,
                "ingest3d failed"
            );
            ExitCode::FAILURE
        },
    }
}
