//! Wire types exchanged with the job manager.
//!
//! Field names follow the job manager's JSON (camelCase). Anything the job
//! manager sends that isn't modelled here is kept in a flattened map so that
//! reading a job and writing it back never drops data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status of a job (or task) as tracked by the job manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    #[serde(rename = "In-Progress")]
    InProgress,
    Completed,
    Failed,
    Expired,
    Aborted,
}

/// Descriptive metadata of the model being ingested.
///
/// Only the product fields are read; everything else rides along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parameters stored on an ingestion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobParameters {
    pub metadata: ModelMetadata,
    pub model_id: String,
    pub tileset_filename: String,
    pub files_count: u64,
    pub path_to_tileset: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parameters of one task: a batch of file paths to process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskParameters {
    pub paths: Vec<String>,
    pub model_id: String,
    /// Index of the last path a worker failed on; `-1` when none has failed.
    pub last_index_error: i64,
}

/// A task to register under a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "type")]
    pub task_type: String,
    pub parameters: TaskParameters,
}

/// Request body for creating a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobBody {
    pub resource_id: String,
    pub version: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub parameters: JobParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer_name: Option<String>,
    pub percentage: u8,
    pub status: JobStatus,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub id: String,
    #[serde(default)]
    pub task_ids: Vec<String>,
}

/// A job as returned by the job manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(rename = "type", default)]
    pub job_type: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub percentage: Option<u8>,
    pub parameters: JobParameters,
}

/// Partial update of a job. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJobBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<JobParameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
