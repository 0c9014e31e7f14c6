//! HTTP client for the job manager's REST API.

use crate::JobQueue;
use crate::error::{ErrorKind, Result};
use crate::models::{CreateJobBody, CreateJobResponse, Job, Task, UpdateJobBody};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;

/// Default timeout for a single job manager request.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Job queue backed by the job manager's HTTP API.
///
/// # Examples
///
/// ```no_run
/// use ingest3d_jobs::HttpJobQueue;
/// use std::time::Duration;
///
/// # fn example() -> ingest3d_jobs::error::Result<()> {
/// let jobs = HttpJobQueue::new("http://job-manager:8080", Duration::from_secs(30))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpJobQueue {
    client: Client,
    base_url: String,
}

impl HttpJobQueue {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            exn::bail!(ErrorKind::Config(format!("job manager url must be http(s): {base_url}")));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .or_raise(|| ErrorKind::Config("failed to build HTTP client".to_string()))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a request, turning transport failures and non-2xx answers into errors.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.or_raise(|| ErrorKind::Transport)?;
        let status = response.status();
        if !status.is_success() {
            let url = response.url().to_string();
            // The body is only for the log line; failing to read it changes nothing.
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), url = %url, body = %body, "Job manager request failed");
            exn::bail!(ErrorKind::Status(status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl JobQueue for HttpJobQueue {
    async fn create_job(&self, body: CreateJobBody) -> Result<CreateJobResponse> {
        let response = self.send(self.client.post(self.url("/jobs")).json(&body)).await?;
        let created: CreateJobResponse = response.json().await.or_raise(|| ErrorKind::Decode)?;
        tracing::debug!(job_id = %created.id, resource_id = %body.resource_id, "Created job");
        Ok(created)
    }

    async fn get_job(&self, job_id: &str) -> Result<Job> {
        let request = self
            .client
            .get(self.url(&format!("/jobs/{job_id}")))
            .query(&[("shouldReturnTasks", "false")]);
        let response = self.send(request).await?;
        response.json().await.or_raise(|| ErrorKind::Decode)
    }

    async fn update_job(&self, job_id: &str, body: UpdateJobBody) -> Result<()> {
        self.send(self.client.put(self.url(&format!("/jobs/{job_id}"))).json(&body)).await?;
        tracing::debug!(job_id, status = ?body.status, "Updated job");
        Ok(())
    }

    async fn create_task_for_job(&self, job_id: &str, task: Task) -> Result<()> {
        let url = self.url(&format!("/jobs/{job_id}/tasks"));
        self.send(self.client.post(url).json(&task)).await?;
        tracing::trace!(job_id, paths = task.parameters.paths.len(), "Created task");
        Ok(())
    }
}
