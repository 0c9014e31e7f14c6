//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Generic status used when the storage client gives no upstream status code.
pub const UNKNOWN_UPSTREAM_STATUS: u16 = 500;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The model's root path (or prefix) does not exist or holds no files.
    #[display("model not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Path contains invalid characters or escapes root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Underlying I/O error while walking a filesystem.
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// The storage service (S3, etc.) failed or returned something unusable.
    #[display("storage service error ({status}): {message}")]
    ExternalService { status: u16, message: String },
    /// Appending a discovered path to staging failed.
    #[display("failed to stage discovered path")]
    Staging,
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ExternalService { .. })
    }
}
