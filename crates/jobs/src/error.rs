//! Job Queue Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A job queue error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for job queue operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The request never got a response (connection refused, timeout, TLS...).
    #[display("job manager unreachable")]
    Transport,
    /// The job manager answered with a non-success status code.
    #[display("job manager responded with status {_0}")]
    Status(#[error(not(source))] u16),
    /// The response body didn't match what was expected.
    #[display("unexpected job manager response body")]
    Decode,
    /// The client couldn't be constructed from its configuration.
    #[display("invalid job manager client configuration: {_0}")]
    Config(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport => true,
            Self::Status(status) => *status == 429 || *status >= 500,
            Self::Decode | Self::Config(_) => false,
        }
    }
}
