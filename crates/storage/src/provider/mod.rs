//! Storage provider trait and implementations.
//!
//! Two interchangeable providers share one contract:
//!
//! - [`NfsProvider`] walks a directory tree on a (networked) filesystem.
//! - [`S3Provider`] lists an S3-compatible bucket one delimiter level at a
//!   time, following pagination and common prefixes.
//!
//! Which one is used is decided once at startup from configuration.

mod nfs;
#[cfg(feature = "s3")]
mod s3;

pub use self::nfs::NfsProvider;
#[cfg(feature = "s3")]
pub use self::s3::S3Provider;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use ingest3d_staging::StagingStore;
use ingest3d_staging::error::ErrorKind as StagingErrorKind;
use std::path::PathBuf;

/// Recursively enumerates a model's files into staging.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Name of the provider, for logging.
    fn name(&self) -> &str;

    /// Walk every file under `path_to_tileset` and append each one to the
    /// staging resource of `model_id`, returning the number of files found.
    ///
    /// Staging for `model_id` must already be [created](StagingStore::create).
    /// `model_name` is only used for logging and error messages.
    ///
    /// # Errors
    /// - [`NotFound`](ErrorKind::NotFound) if the model's root is missing or
    ///   holds no files at all.
    /// - [`InvalidPath`](ErrorKind::InvalidPath) if `path_to_tileset` would
    ///   escape the storage root, or a discovered file name can't be staged
    ///   (it contains a line break).
    /// - [`Staging`](ErrorKind::Staging) if a discovered path couldn't be
    ///   staged. Enumeration stops at the first such failure; nothing staged
    ///   so far should be considered valid.
    /// - [`Io`](ErrorKind::Io) / [`ExternalService`](ErrorKind::ExternalService)
    ///   for failures of the underlying storage.
    async fn enumerate(&self, model_id: &str, path_to_tileset: &str, model_name: &str) -> Result<u64>;
}

/// Append one discovered path, raising staging failures into this crate's
/// error tree.
async fn stage(staging: &dyn StagingStore, model_id: &str, path: &str) -> Result<()> {
    staging.append(model_id, path).await.map_err(|err| {
        let kind = match &*err {
            StagingErrorKind::InvalidEntry(_) => ErrorKind::InvalidPath(PathBuf::from(path)),
            _ => ErrorKind::Staging,
        };
        err.raise(kind)
    })
}
