//! End-to-end ingestion against a filesystem provider and an in-memory job queue.

use async_trait::async_trait;
use ingest3d::error::ErrorKind;
use ingest3d::{ExclusionPolicy, IngestSettings, Ingestor, Payload, job_status};
use ingest3d_jobs::models::{JobStatus, ModelMetadata};
use ingest3d_jobs::MockJobQueue;
use ingest3d_staging::error::{ErrorKind as StagingErrorKind, Result as StagingResult};
use ingest3d_staging::{FileStagingStore, StagingHandle, StagingStore};
use ingest3d_storage::provider::NfsProvider;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    volume: PathBuf,
    staging_dir: PathBuf,
    jobs: Arc<MockJobQueue>,
}

impl Harness {
    fn new(files: &[&str], jobs: MockJobQueue) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let volume = dir.path().join("volume");
        std::fs::create_dir_all(&volume).unwrap();
        for file in files {
            let path = volume.join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, b"tile").unwrap();
        }
        let staging_dir = dir.path().join("staging");
        Self { _dir: dir, volume, staging_dir, jobs: Arc::new(jobs) }
    }

    fn ingestor_with(&self, staging: StagingHandle, batch_size: usize, max_concurrency: usize, blacklist: &[&str]) -> Ingestor {
        let settings = IngestSettings {
            job_type: "Ingestion".to_string(),
            task_type: "Ingestion".to_string(),
            domain: "3D".to_string(),
            batch_size: NonZeroUsize::new(batch_size).unwrap(),
            max_concurrency: NonZeroUsize::new(max_concurrency).unwrap(),
            policy: ExclusionPolicy::new(blacklist.iter().copied()),
        };
        let provider = Arc::new(NfsProvider::new("nfs", &self.volume, staging.clone()).unwrap());
        Ingestor::new(settings, provider, staging, self.jobs.clone())
    }

    fn ingestor(&self, batch_size: usize, max_concurrency: usize, blacklist: &[&str]) -> Ingestor {
        let staging = Arc::new(FileStagingStore::new(&self.staging_dir));
        self.ingestor_with(staging, batch_size, max_concurrency, blacklist)
    }

    fn staging_exists(&self, model_id: &str) -> bool {
        FileStagingStore::new(&self.staging_dir).path(model_id).unwrap().exists()
    }
}

fn payload(model_id: &str, path: &str) -> Payload {
    Payload {
        model_id: model_id.to_string(),
        path_to_tileset: path.to_string(),
        tileset_filename: "tileset.json".to_string(),
        metadata: ModelMetadata {
            product_name: Some("Tel Aviv".to_string()),
            product_type: Some("3DPhotoRealistic".to_string()),
            producer_name: Some("IDFMU".to_string()),
            ..Default::default()
        },
    }
}

/// Staging store whose read cursor breaks after a number of entries.
struct BrokenReader {
    inner: FileStagingStore,
    readable: usize,
    reads: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl StagingStore for BrokenReader {
    async fn create(&self, model_id: &str) -> StagingResult<()> {
        self.inner.create(model_id).await
    }

    async fn append(&self, model_id: &str, entry: &str) -> StagingResult<()> {
        self.inner.append(model_id, entry).await
    }

    async fn read_next(&self, model_id: &str) -> StagingResult<Option<String>> {
        if self.reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst) >= self.readable {
            let err = std::io::Error::other("staging disk went away");
            exn::bail!(StagingErrorKind::Io(err));
        }
        self.inner.read_next(model_id).await
    }

    async fn is_empty(&self, model_id: &str) -> StagingResult<bool> {
        self.inner.is_empty(model_id).await
    }

    async fn delete(&self, model_id: &str) -> StagingResult<()> {
        self.inner.delete(model_id).await
    }
}

#[tokio::test]
async fn test_run_submits_all_files() {
    let files: Vec<String> = (0..12).map(|i| format!("city/tiles/{i}.b3dm")).collect();
    let files: Vec<&str> = files.iter().map(String::as_str).collect();
    let harness = Harness::new(&files, MockJobQueue::new());

    let response = harness.ingestor(5, 2, &[]).run(&payload("m1", "city")).await.unwrap();
    assert_eq!(response.status, JobStatus::InProgress);

    let tasks = harness.jobs.tasks().await;
    let mut sizes: Vec<usize> = tasks.iter().map(|(_, task)| task.parameters.paths.len()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![2, 5, 5]);
    assert!(tasks.iter().all(|(job_id, task)| {
        job_id == &response.job_id && task.parameters.model_id == "m1" && task.parameters.last_index_error == -1
    }));

    let job = harness.jobs.job(&response.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::InProgress);
    assert_eq!(job.parameters.files_count, 12);
    assert_eq!(job.resource_id.as_deref(), Some("m1"));
    assert!(!harness.staging_exists("m1"));
}

#[tokio::test]
async fn test_blacklisted_files_are_counted_but_not_submitted() {
    let harness = Harness::new(&["m/a.txt", "m/archive.zip", "m/b.txt"], MockJobQueue::new());

    let response = harness.ingestor(10, 5, &["zip"]).run(&payload("m1", "m")).await.unwrap();

    let tasks = harness.jobs.tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].1.parameters.paths, vec!["m/a.txt", "m/b.txt"]);
    let job = harness.jobs.job(&response.job_id).await.unwrap();
    assert_eq!(job.parameters.files_count, 3);
}

#[tokio::test]
async fn test_task_failure_cleans_up_and_leaves_job_untouched() {
    let harness = Harness::new(&["m/1.b3dm", "m/2.b3dm", "m/3.b3dm"], MockJobQueue::new().fail_task_at(2, 503));
    let ingestor = harness.ingestor(1, 1, &[]);
    let payload = payload("m1", "m");

    let created = ingestor.create_job(&payload).await.unwrap();
    let err = ingestor.ingest_model(&payload, &created.job_id).await.unwrap_err();

    assert_eq!(*err, ErrorKind::ExternalService(503));
    assert!(!harness.staging_exists("m1"));
    assert!(harness.jobs.updates().await.is_empty());
    let job = harness.jobs.job(&created.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.parameters.files_count, 0);
    // Submission stopped at the failing task.
    assert_eq!(harness.jobs.task_calls(), 2);
}

#[tokio::test]
async fn test_missing_model_cleans_up() {
    let harness = Harness::new(&["other/a.b3dm"], MockJobQueue::new());
    let ingestor = harness.ingestor(10, 5, &[]);
    let payload = payload("m1", "missing");

    let created = ingestor.create_job(&payload).await.unwrap();
    let err = ingestor.ingest_model(&payload, &created.job_id).await.unwrap_err();

    assert_eq!(*err, ErrorKind::NotFound);
    assert_eq!(err.status_code(), 404);
    assert!(!harness.staging_exists("m1"));
    assert!(harness.jobs.tasks().await.is_empty());
}

#[tokio::test]
async fn test_empty_model_is_not_found() {
    let harness = Harness::new(&[], MockJobQueue::new());
    std::fs::create_dir_all(harness.volume.join("empty")).unwrap();

    let err = harness.ingestor(10, 5, &[]).run(&payload("m1", "empty")).await.unwrap_err();

    assert_eq!(*err, ErrorKind::NotFound);
    assert!(!harness.staging_exists("m1"));
    assert_eq!(harness.jobs.task_calls(), 0);
}

#[tokio::test]
async fn test_staging_read_failure_cleans_up() {
    let harness = Harness::new(&["m/1.b3dm", "m/2.b3dm", "m/3.b3dm"], MockJobQueue::new());
    let staging = Arc::new(BrokenReader {
        inner: FileStagingStore::new(&harness.staging_dir),
        readable: 1,
        reads: Default::default(),
    });
    let ingestor = harness.ingestor_with(staging, 1, 1, &[]);

    let err = ingestor.run(&payload("m1", "m")).await.unwrap_err();

    assert_eq!(*err, ErrorKind::Io);
    assert!(!err.is_operational());
    assert!(!harness.staging_exists("m1"));
    assert!(harness.jobs.updates().await.is_empty());
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let files: Vec<String> = (0..40).map(|i| format!("m/{i:02}.b3dm")).collect();
    let files: Vec<&str> = files.iter().map(String::as_str).collect();
    let harness = Harness::new(&files, MockJobQueue::new());

    harness.ingestor(1, 3, &[]).run(&payload("m1", "m")).await.unwrap();

    assert_eq!(harness.jobs.tasks().await.len(), 40);
    // Each submission yields to the scheduler, so the window fills up.
    assert_eq!(harness.jobs.peak_in_flight(), 3);
}

#[tokio::test]
async fn test_failed_job_creation_stages_nothing() {
    let harness = Harness::new(&["m/a.b3dm"], MockJobQueue::new().fail_create_job(502));

    let err = harness.ingestor(10, 5, &[]).run(&payload("m1", "m")).await.unwrap_err();

    assert_eq!(*err, ErrorKind::ExternalService(502));
    assert!(!harness.staging_dir.exists());
}

#[tokio::test]
async fn test_existing_staging_is_not_touched() {
    let harness = Harness::new(&["m/a.b3dm"], MockJobQueue::new());
    let staging = FileStagingStore::new(&harness.staging_dir);
    staging.create("m1").await.unwrap();
    staging.append("m1", "m/left-over.b3dm").await.unwrap();

    let err = harness.ingestor(10, 5, &[]).run(&payload("m1", "m")).await.unwrap_err();

    assert_eq!(*err, ErrorKind::Io);
    assert!(harness.staging_exists("m1"));
}

#[tokio::test]
async fn test_invalid_payload_is_rejected() {
    let harness = Harness::new(&["m/a.b3dm"], MockJobQueue::new());
    let mut payload = payload("m1", "m");
    payload.tileset_filename = String::new();

    let err = harness.ingestor(10, 5, &[]).run(&payload).await.unwrap_err();

    assert!(matches!(&*err, ErrorKind::Validation(_)));
    assert!(harness.jobs.job("job-1").await.is_none());
}

#[tokio::test]
async fn test_path_escaping_the_volume_is_rejected() {
    let harness = Harness::new(&["m/a.b3dm"], MockJobQueue::new());

    let err = harness.ingestor(10, 5, &[]).run(&payload("m1", "../outside")).await.unwrap_err();

    assert!(matches!(&*err, ErrorKind::Validation(_)));
    assert!(!harness.staging_exists("m1"));
}

#[tokio::test]
async fn test_model_id_with_separators_is_ingested() {
    let harness = Harness::new(&["org/m1/tileset.json", "org/m1/0.b3dm"], MockJobQueue::new());

    let response = harness.ingestor(10, 5, &[]).run(&payload("org/m1", "org/m1")).await.unwrap();

    let job = harness.jobs.job(&response.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::InProgress);
    assert_eq!(job.parameters.files_count, 2);
    assert_eq!(harness.jobs.tasks().await.len(), 1);
    assert!(!harness.staging_exists("org/m1"));
    // Nothing was written outside the staging directory.
    assert!(!harness.staging_dir.join("org").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_unstageable_file_name_is_a_validation_error() {
    let harness = Harness::new(&["m/a.b3dm", "m/bad\nname.b3dm"], MockJobQueue::new());

    let err = harness.ingestor(10, 5, &[]).run(&payload("m1", "m")).await.unwrap_err();

    assert!(matches!(&*err, ErrorKind::Validation(_)));
    assert_eq!(err.status_code(), 400);
    assert!(err.is_operational());
    assert!(!harness.staging_exists("m1"));
    assert_eq!(harness.jobs.task_calls(), 0);
}

#[tokio::test]
async fn test_job_status_reflects_ingestion() {
    let harness = Harness::new(&["m/a.b3dm"], MockJobQueue::new());
    let ingestor = harness.ingestor(10, 5, &[]);
    let payload = payload("m1", "m");

    let created = ingestor.create_job(&payload).await.unwrap();
    let before = job_status(harness.jobs.as_ref(), &created.job_id).await.unwrap();
    assert_eq!(before.status, JobStatus::Pending);
    assert_eq!(before.percentage, 0);

    ingestor.ingest_model(&payload, &created.job_id).await.unwrap();
    let after = job_status(harness.jobs.as_ref(), &created.job_id).await.unwrap();
    assert_eq!(after.status, JobStatus::InProgress);

    let err = job_status(harness.jobs.as_ref(), "job-404").await.unwrap_err();
    assert_eq!(*err, ErrorKind::ExternalService(404));
}

#[test]
fn test_payload_wire_format() {
    let json = serde_json::json!({
        "modelId": "m1",
        "pathToTileset": "models/city",
        "tilesetFilename": "tileset.json",
        "metadata": { "productName": "City", "srsId": "4326" }
    });
    let payload: Payload = serde_json::from_value(json).unwrap();
    assert_eq!(payload.model_name(), "City");
    assert_eq!(payload.metadata.extra["srsId"], "4326");
    assert_eq!(payload.path_to_tileset, "models/city");
}
