//! Staging Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A staging error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for staging operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A staging file for this model is already allocated.
    #[display("staging already exists for model: {_0}")]
    AlreadyExists(#[error(not(source))] String),
    /// No staging was created for this model (or it was already deleted).
    #[display("no staging for model: {_0}")]
    NotCreated(#[error(not(source))] String),
    /// Reading has started; the write cursor is closed for good.
    #[display("staging is sealed for reading: {_0}")]
    Sealed(#[error(not(source))] String),
    /// The model identifier is empty.
    #[display("invalid staging key: {_0:?}")]
    InvalidKey(#[error(not(source))] String),
    /// Entries are line-delimited, so they can't contain line breaks.
    #[display("invalid staging entry: {_0:?}")]
    InvalidEntry(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
