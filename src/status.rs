//! Progress of an ingestion job, as tracked by the job manager.

use crate::error::{Classify, Result};
use ingest3d_jobs::JobQueue;
use ingest3d_jobs::models::JobStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub percentage: u8,
    pub status: JobStatus,
}

pub async fn job_status(jobs: &dyn JobQueue, job_id: &str) -> Result<JobStatusResponse> {
    let job = jobs.get_job(job_id).await.classify()?;
    tracing::debug!(job_id, status = ?job.status, percentage = ?job.percentage, "Fetched job status");
    Ok(JobStatusResponse { percentage: job.percentage.unwrap_or(0), status: job.status })
}
