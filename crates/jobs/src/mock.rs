//! In-memory job queue for testing.

use crate::JobQueue;
use crate::error::{ErrorKind, Result};
use crate::models::{CreateJobBody, CreateJobResponse, Job, Task, UpdateJobBody};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// In-memory job queue for testing.
///
/// Records every job, task and update it receives, and keeps track of the
/// highest number of [`create_task_for_job`](JobQueue::create_task_for_job)
/// calls that were in flight at the same time. Each task submission yields to
/// the runtime before completing so that concurrent callers really overlap.
///
/// # Examples
///
/// ```
/// use ingest3d_jobs::{JobQueue, MockJobQueue};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let jobs = MockJobQueue::new().fail_task_at(2, 503);
/// assert!(jobs.get_job("unknown").await.is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MockJobQueue {
    jobs: Mutex<HashMap<String, Job>>,
    tasks: Mutex<Vec<(String, Task)>>,
    updates: Mutex<Vec<(String, UpdateJobBody)>>,
    task_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    /// 1-based index of the task submission that fails, and the status it fails with.
    fail_task: Option<(usize, u16)>,
    fail_create_job: Option<u16>,
    /// Scheduler yields per task submission, to widen the overlap window.
    task_yields: usize,
}

impl MockJobQueue {
    pub fn new() -> Self {
        Self { task_yields: 3, ..Default::default() }
    }

    /// Make the `nth` (1-based) task submission fail with `status`.
    pub fn fail_task_at(mut self, nth: usize, status: u16) -> Self {
        self.fail_task = Some((nth, status));
        self
    }

    /// Make job creation fail with `status`.
    pub fn fail_create_job(mut self, status: u16) -> Self {
        self.fail_create_job = Some(status);
        self
    }

    /// Snapshot of a stored job.
    pub async fn job(&self, job_id: &str) -> Option<Job> {
        self.jobs.lock().await.get(job_id).cloned()
    }

    /// Every task successfully submitted so far, in completion order.
    pub async fn tasks(&self) -> Vec<(String, Task)> {
        self.tasks.lock().await.clone()
    }

    pub async fn updates(&self) -> Vec<(String, UpdateJobBody)> {
        self.updates.lock().await.clone()
    }

    /// Number of task submissions attempted, failed ones included.
    pub fn task_calls(&self) -> usize {
        self.task_calls.load(Ordering::SeqCst)
    }

    /// Highest number of task submissions that were in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobQueue for MockJobQueue {
    async fn create_job(&self, body: CreateJobBody) -> Result<CreateJobResponse> {
        if let Some(status) = self.fail_create_job {
            exn::bail!(ErrorKind::Status(status));
        }
        let mut jobs = self.jobs.lock().await;
        let id = format!("job-{}", jobs.len() + 1);
        let job = Job {
            id: id.clone(),
            resource_id: Some(body.resource_id),
            job_type: Some(body.job_type),
            status: body.status,
            percentage: Some(body.percentage),
            parameters: body.parameters,
        };
        jobs.insert(id.clone(), job);
        Ok(CreateJobResponse { id, task_ids: Vec::new() })
    }

    async fn get_job(&self, job_id: &str) -> Result<Job> {
        match self.jobs.lock().await.get(job_id) {
            Some(job) => Ok(job.clone()),
            None => exn::bail!(ErrorKind::Status(404)),
        }
    }

    async fn update_job(&self, job_id: &str, body: UpdateJobBody) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(job_id) else {
            exn::bail!(ErrorKind::Status(404));
        };
        if let Some(status) = body.status {
            job.status = status;
        }
        if let Some(percentage) = body.percentage {
            job.percentage = Some(percentage);
        }
        if let Some(parameters) = &body.parameters {
            job.parameters = parameters.clone();
        }
        drop(jobs);
        self.updates.lock().await.push((job_id.to_string(), body));
        Ok(())
    }

    async fn create_task_for_job(&self, job_id: &str, task: Task) -> Result<()> {
        let call = self.task_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        for _ in 0..self.task_yields {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some((nth, status)) = self.fail_task
            && nth == call
        {
            exn::bail!(ErrorKind::Status(status));
        }
        if !self.jobs.lock().await.contains_key(job_id) {
            exn::bail!(ErrorKind::Status(404));
        }
        self.tasks.lock().await.push((job_id.to_string(), task));
        Ok(())
    }
}
