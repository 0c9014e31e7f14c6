//! Staging of discovered file paths.
//!
//! Enumerating a model can discover far more paths than are comfortable to
//! hold in memory, and enumeration and batching are separate phases anyway.
//! A [`StagingStore`] sits between the two: storage providers append every
//! discovered path during enumeration, then the batcher reads them back in
//! insertion order.
//!
//! Each staging resource is keyed by a model identifier and has two cursors
//! which are never active at the same time:
//!
//! 1. the **write cursor**, open from [`create`](StagingStore::create) until
//!    the first [`read_next`](StagingStore::read_next), and
//! 2. the **read cursor**, a single forward pass over everything written.

pub mod error;
mod file;

pub use crate::file::FileStagingStore;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub type StagingHandle = Arc<dyn StagingStore + Send + Sync>;

/// Append-then-read buffer of staged paths, keyed by model identifier.
///
/// Uniqueness of in-flight model identifiers is the caller's contract; two
/// concurrent ingestions for the same identifier are not guarded against
/// beyond [`create`](Self::create) refusing to allocate twice.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Allocate a fresh, empty staging resource.
    ///
    /// Returns [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists) if
    /// one is already allocated for `model_id`.
    async fn create(&self, model_id: &str) -> Result<()>;

    /// Append one entry.
    ///
    /// Returns [`Sealed`](crate::error::ErrorKind::Sealed) once reading has
    /// started.
    async fn append(&self, model_id: &str, entry: &str) -> Result<()>;

    /// Next unread entry in insertion order, or `None` once exhausted.
    ///
    /// The first call closes the write cursor. There is exactly one read pass
    /// per staging lifetime; after exhaustion every call returns `None`.
    async fn read_next(&self, model_id: &str) -> Result<Option<String>>;

    /// `true` if nothing was ever appended.
    async fn is_empty(&self, model_id: &str) -> Result<bool>;

    /// Release the staging resource.
    ///
    /// Safe to call on cleanup paths: deleting something that is already gone
    /// (or was never created) succeeds.
    async fn delete(&self, model_id: &str) -> Result<()>;
}
