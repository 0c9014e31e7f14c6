//! Ingestion of 3D models into the job queue.
//!
//! A model is a directory (or object-store prefix) holding many files. To
//! ingest one, every file under the model's root is discovered by a
//! [storage provider](ingest3d_storage::StorageProvider), staged on local
//! disk, and then submitted to the job manager in [batches](batch) as tasks
//! of a single job.
//!
//! [`Ingestor`] drives the whole pipeline; [`job_status`] reports on a job
//! afterwards.

pub mod batch;
pub mod error;
pub mod ingest;
pub mod provider;
pub mod status;

pub use crate::batch::ExclusionPolicy;
pub use crate::ingest::{IngestSettings, IngestionResponse, Ingestor, Payload, Stage};
pub use crate::provider::provider_from_config;
pub use crate::status::{JobStatusResponse, job_status};
