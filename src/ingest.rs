//! Ingestion of one model: register a job, stage the model's files, and
//! submit them to the job queue as tasks.
//!
//! ```text
//! Created -> Staging -> Enumerating -> Batching -> Submitting -> Finalizing -> CleanedUp
//!               \___________\_____________\___________\_____________\-> FailedCleanup -> Failed
//! ```
//!
//! Once staging exists it is deleted again before [`Ingestor::ingest_model`]
//! returns, whatever the outcome.

use crate::batch::{ExclusionPolicy, TaskBuilder, batches};
use crate::error::{Classify, ErrorKind, Result};
use derive_more::Display;
use exn::OptionExt;
use futures::TryStreamExt;
use ingest3d_config::Config;
use ingest3d_jobs::JobQueueHandle;
use ingest3d_jobs::models::{CreateJobBody, JobParameters, JobStatus, ModelMetadata, UpdateJobBody};
use ingest3d_staging::StagingHandle;
use ingest3d_storage::ProviderHandle;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Version every newly ingested model starts at.
const INITIAL_VERSION: &str = "1";

/// A request to ingest one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub model_id: String,
    /// Model root, relative to the storage provider's root.
    pub path_to_tileset: String,
    pub tileset_filename: String,
    #[serde(default)]
    pub metadata: ModelMetadata,
}

impl Payload {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("modelId", &self.model_id),
            ("pathToTileset", &self.path_to_tileset),
            ("tilesetFilename", &self.tileset_filename),
        ] {
            if value.trim().is_empty() {
                exn::bail!(ErrorKind::Validation(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }

    /// Human readable name for logs; the product name when there is one.
    pub fn model_name(&self) -> &str {
        self.metadata.product_name.as_deref().unwrap_or(&self.model_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionResponse {
    #[serde(rename = "jobID")]
    pub job_id: String,
    pub status: JobStatus,
}

/// Ingestion settings, fixed for the lifetime of an [`Ingestor`].
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub job_type: String,
    pub task_type: String,
    pub domain: String,
    pub batch_size: NonZeroUsize,
    pub max_concurrency: NonZeroUsize,
    pub policy: ExclusionPolicy,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let positive = |value: usize, key: &str| {
            NonZeroUsize::new(value).ok_or_raise(|| ErrorKind::Validation(format!("ingestion.{key} must be positive")))
        };
        Ok(Self {
            job_type: config.job_manager.job_type.clone(),
            task_type: config.job_manager.task_type.clone(),
            domain: config.job_manager.domain.clone(),
            batch_size: positive(config.ingestion.batch_size, "batch_size")?,
            max_concurrency: positive(config.ingestion.max_concurrency, "max_concurrency")?,
            policy: ExclusionPolicy::new(config.ingestion.blacklist.iter().cloned()),
        })
    }
}

/// Where an ingestion currently is.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Created,
    Staging,
    Enumerating,
    Batching,
    Submitting,
    Finalizing,
    CleanedUp,
    FailedCleanup,
    Failed,
}

fn enter(stage: Stage, model_id: &str, job_id: &str) {
    match stage {
        Stage::FailedCleanup | Stage::Failed => tracing::warn!(model_id, job_id, stage = %stage, "Ingestion stage"),
        _ => tracing::debug!(model_id, job_id, stage = %stage, "Ingestion stage"),
    }
}

pub struct Ingestor {
    settings: IngestSettings,
    provider: ProviderHandle,
    staging: StagingHandle,
    jobs: JobQueueHandle,
}

impl Ingestor {
    /// `provider` must append into the same `staging` store the ingestor reads from.
    pub fn new(settings: IngestSettings, provider: ProviderHandle, staging: StagingHandle, jobs: JobQueueHandle) -> Self {
        Self { settings, provider, staging, jobs }
    }

    /// Register a pending job for the model, with no files counted yet.
    pub async fn create_job(&self, payload: &Payload) -> Result<IngestionResponse> {
        payload.validate()?;
        let metadata = &payload.metadata;
        let body = CreateJobBody {
            resource_id: payload.model_id.clone(),
            version: INITIAL_VERSION.to_string(),
            job_type: self.settings.job_type.clone(),
            parameters: JobParameters {
                metadata: metadata.clone(),
                model_id: payload.model_id.clone(),
                tileset_filename: payload.tileset_filename.clone(),
                files_count: 0,
                path_to_tileset: payload.path_to_tileset.clone(),
                extra: Map::new(),
            },
            product_type: metadata.product_type.clone(),
            product_name: metadata.product_name.clone(),
            producer_name: metadata.producer_name.clone(),
            percentage: 0,
            status: JobStatus::Pending,
            domain: self.settings.domain.clone(),
        };
        let created = self.jobs.create_job(body).await.classify()?;
        tracing::info!(model_id = %payload.model_id, job_id = %created.id, "Created ingestion job");
        Ok(IngestionResponse { job_id: created.id, status: JobStatus::Pending })
    }

    /// Stage, batch and submit the model's files as tasks of `job_id`, then
    /// move the job in progress. Returns the number of files found, excluded
    /// ones included.
    ///
    /// Callers that already answered their client must only log an error
    /// from here; there is nobody left to report it to.
    pub async fn ingest_model(&self, payload: &Payload, job_id: &str) -> Result<u64> {
        payload.validate()?;
        let model_id = payload.model_id.as_str();
        tracing::info!(model_id, job_id, model_name = payload.model_name(), provider = self.provider.name(), "Ingesting model");

        enter(Stage::Staging, model_id, job_id);
        self.staging.create(model_id).await.classify()?;

        match self.process(payload, job_id).await {
            Ok(files_count) => {
                self.staging.delete(model_id).await.classify()?;
                enter(Stage::CleanedUp, model_id, job_id);
                tracing::info!(model_id, job_id, files_count, "Model ingestion submitted");
                Ok(files_count)
            },
            Err(err) => {
                enter(Stage::FailedCleanup, model_id, job_id);
                if let Err(cleanup) = self.staging.delete(model_id).await {
                    tracing::error!(model_id, error = ?cleanup, "Failed to delete staging after a failed ingestion");
                }
                enter(Stage::Failed, model_id, job_id);
                tracing::error!(model_id, job_id, error = ?err, "Model ingestion failed");
                Err(err)
            },
        }
    }

    /// Create the job and ingest the model, returning once all tasks are
    /// submitted.
    pub async fn run(&self, payload: &Payload) -> Result<IngestionResponse> {
        let created = self.create_job(payload).await?;
        enter(Stage::Created, &payload.model_id, &created.job_id);
        self.ingest_model(payload, &created.job_id).await?;
        Ok(IngestionResponse { job_id: created.job_id, status: JobStatus::InProgress })
    }

    async fn process(&self, payload: &Payload, job_id: &str) -> Result<u64> {
        let model_id = payload.model_id.as_str();

        enter(Stage::Enumerating, model_id, job_id);
        let files_count = self
            .provider
            .enumerate(model_id, &payload.path_to_tileset, payload.model_name())
            .await
            .classify()?;

        enter(Stage::Batching, model_id, job_id);
        let builder = TaskBuilder::new(self.settings.task_type.as_str(), model_id);
        let batches = batches(self.staging.as_ref(), model_id, self.settings.batch_size, &self.settings.policy);

        enter(Stage::Submitting, model_id, job_id);
        let tasks_count = AtomicUsize::new(0);
        batches
            .try_for_each_concurrent(self.settings.max_concurrency.get(), |paths| {
                let task = builder.build(paths);
                let tasks_count = &tasks_count;
                async move {
                    self.jobs.create_task_for_job(job_id, task).await.classify()?;
                    tasks_count.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
            })
            .await?;
        tracing::info!(model_id, job_id, tasks_count = tasks_count.load(Ordering::Relaxed), "Submitted tasks");

        enter(Stage::Finalizing, model_id, job_id);
        let mut parameters = self.jobs.get_job(job_id).await.classify()?.parameters;
        parameters.files_count = files_count;
        let update = UpdateJobBody {
            status: Some(JobStatus::InProgress),
            parameters: Some(parameters),
            ..Default::default()
        };
        self.jobs.update_job(job_id, update).await.classify()?;
        Ok(files_count)
    }
}
