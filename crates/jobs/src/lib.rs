//! Client side of the job manager.
//!
//! An ingestion is tracked as one [job](models::Job) holding any number of
//! [tasks](models::Task). The [`JobQueue`] trait is the seam the ingestion
//! pipeline talks to; [`HttpJobQueue`] is the real implementation.

mod client;
pub mod error;
#[cfg(feature = "mock")]
mod mock;
pub mod models;

pub use crate::client::HttpJobQueue;
use crate::error::Result;
#[cfg(feature = "mock")]
pub use crate::mock::MockJobQueue;
use crate::models::{CreateJobBody, CreateJobResponse, Job, Task, UpdateJobBody};
use async_trait::async_trait;
use std::sync::Arc;

pub type JobQueueHandle = Arc<dyn JobQueue + Send + Sync>;

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn create_job(&self, body: CreateJobBody) -> Result<CreateJobResponse>;

    async fn get_job(&self, job_id: &str) -> Result<Job>;

    async fn update_job(&self, job_id: &str, body: UpdateJobBody) -> Result<()>;

    /// Register one more task under an existing job.
    async fn create_task_for_job(&self, job_id: &str, task: Task) -> Result<()>;
}
