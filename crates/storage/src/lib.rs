//! Storage providers for model file discovery.
//!
//! A [`StorageProvider`] walks everything under a model's root (a directory
//! on a networked filesystem, or a key prefix in an object store) and appends
//! every file it finds to the model's [staging](ingest3d_staging).

pub mod error;
mod path;
pub mod provider;

pub use crate::path::validate as validate_path;
pub use crate::provider::StorageProvider;
use std::sync::Arc;

pub type ProviderHandle = Arc<dyn StorageProvider + Send + Sync>;
