//! Ingestion Error Types
//!
//! Every crate in the workspace reports its own `ErrorKind`. At the ingestion
//! boundary those are classified into the four categories callers act on,
//! keeping the original error as a child in the error tree.

use derive_more::{Display, Error};
use exn::Exn;
use ingest3d_config::error::ErrorKind as ConfigErrorKind;
use ingest3d_jobs::error::ErrorKind as JobsErrorKind;
use ingest3d_staging::error::ErrorKind as StagingErrorKind;
use ingest3d_storage::error::{ErrorKind as StorageErrorKind, UNKNOWN_UPSTREAM_STATUS};

/// An ingestion error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The model's path or prefix is absent, or holds no files.
    #[display("model not found")]
    NotFound,
    /// A storage backend or the job manager failed.
    #[display("external service error ({_0})")]
    ExternalService(#[error(not(source))] u16),
    /// Staging (or other local I/O) failed.
    #[display("I/O error")]
    Io,
    /// Input or configuration is unusable.
    #[display("validation error: {_0}")]
    Validation(#[error(not(source))] String),
}

impl ErrorKind {
    /// HTTP-equivalent status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::ExternalService(status) => *status,
            Self::Io => 500,
            Self::Validation(_) => 400,
        }
    }

    /// `false` for failures with no recognizable cause, which should be
    /// treated as fatal rather than reported back as a normal error response.
    pub fn is_operational(&self) -> bool {
        !matches!(self, Self::Io)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ExternalService(status) => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<&StorageErrorKind> for ErrorKind {
    fn from(kind: &StorageErrorKind) -> Self {
        match kind {
            StorageErrorKind::NotFound(_) => Self::NotFound,
            StorageErrorKind::ExternalService { status, .. } => Self::ExternalService(*status),
            StorageErrorKind::InvalidPath(_) => Self::Validation(kind.to_string()),
            StorageErrorKind::Io(_) | StorageErrorKind::Staging => Self::Io,
        }
    }
}

impl From<&StagingErrorKind> for ErrorKind {
    fn from(kind: &StagingErrorKind) -> Self {
        match kind {
            StagingErrorKind::InvalidKey(_) | StagingErrorKind::InvalidEntry(_) => Self::Validation(kind.to_string()),
            _ => Self::Io,
        }
    }
}

impl From<&JobsErrorKind> for ErrorKind {
    fn from(kind: &JobsErrorKind) -> Self {
        match kind {
            JobsErrorKind::Status(status) => Self::ExternalService(*status),
            JobsErrorKind::Transport | JobsErrorKind::Decode => Self::ExternalService(UNKNOWN_UPSTREAM_STATUS),
            JobsErrorKind::Config(_) => Self::Validation(kind.to_string()),
        }
    }
}

impl From<&ConfigErrorKind> for ErrorKind {
    fn from(kind: &ConfigErrorKind) -> Self {
        Self::Validation(kind.to_string())
    }
}

/// Raise a workspace crate's error into the ingestion error tree.
pub trait Classify<T> {
    fn classify(self) -> Result<T>;
}

impl<T, K> Classify<T> for std::result::Result<T, Exn<K>>
where
    K: std::error::Error + Send + Sync + 'static,
    for<'a> ErrorKind: From<&'a K>,
{
    fn classify(self) -> Result<T> {
        self.map_err(|err| {
            let kind = ErrorKind::from(&*err);
            err.raise(kind)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    #[rstest]
    #[case(StorageErrorKind::NotFound("m1".to_string()), ErrorKind::NotFound)]
    #[case(StorageErrorKind::ExternalService { status: 403, message: "AccessDenied".to_string() }, ErrorKind::ExternalService(403))]
    #[case(StorageErrorKind::Staging, ErrorKind::Io)]
    fn test_storage_classification(#[case] kind: StorageErrorKind, #[case] expected: ErrorKind) {
        let result: std::result::Result<(), _> = Err(Exn::from(kind));
        let err = result.classify().unwrap_err();
        assert_eq!(*err, expected);
    }

    #[test]
    fn test_invalid_path_is_validation() {
        let kind = ErrorKind::from(&StorageErrorKind::InvalidPath(PathBuf::from("../x")));
        assert!(matches!(kind, ErrorKind::Validation(_)));
        assert_eq!(kind.status_code(), 400);
    }

    #[rstest]
    #[case(StagingErrorKind::InvalidEntry("a\nb".to_string()), 400, true)]
    #[case(StagingErrorKind::InvalidKey(String::new()), 400, true)]
    #[case(StagingErrorKind::AlreadyExists("m1".to_string()), 500, false)]
    fn test_staging_classification(#[case] kind: StagingErrorKind, #[case] status: u16, #[case] operational: bool) {
        let kind = ErrorKind::from(&kind);
        assert_eq!(kind.status_code(), status);
        assert_eq!(kind.is_operational(), operational);
    }

    #[rstest]
    #[case(JobsErrorKind::Status(409), ErrorKind::ExternalService(409))]
    #[case(JobsErrorKind::Transport, ErrorKind::ExternalService(500))]
    #[case(JobsErrorKind::Decode, ErrorKind::ExternalService(500))]
    fn test_jobs_classification(#[case] kind: JobsErrorKind, #[case] expected: ErrorKind) {
        assert_eq!(ErrorKind::from(&kind), expected);
    }

    #[rstest]
    #[case(ErrorKind::NotFound, 404, true)]
    #[case(ErrorKind::ExternalService(502), 502, true)]
    #[case(ErrorKind::Io, 500, false)]
    #[case(ErrorKind::Validation("batch size".to_string()), 400, true)]
    fn test_status_code(#[case] kind: ErrorKind, #[case] status: u16, #[case] operational: bool) {
        assert_eq!(kind.status_code(), status);
        assert_eq!(kind.is_operational(), operational);
    }
}
