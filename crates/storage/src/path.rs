//! Path validation for model roots.
//!
//! Callers hand us the model's path relative to the storage root. It must
//! never be able to point outside of that root.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};
use exn::OptionExt;

/// Resolve `.` and `..` lexically. `None` if the path climbs above the root,
/// carries a Windows prefix or a null byte, or resolves to nothing.
fn normalize(path: &Path) -> Option<Vec<&OsStr>> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            // Null bytes pass through Path::components() on Unix but cause
            // truncation in C-based syscalls.
            Component::Normal(part) if part.as_encoded_bytes().contains(&0) => return None,
            Component::Normal(part) => parts.push(part),
            Component::CurDir | Component::RootDir => {},
            Component::ParentDir => {
                parts.pop()?;
            },
            Component::Prefix(_) => return None,
        }
    }
    (!parts.is_empty()).then_some(parts)
}

/// Validates and normalizes a model path relative to the storage root.
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use ingest3d_storage::validate_path;
/// assert!(validate_path("models/city/tileset").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert_eq!(validate_path("/models//./city/").unwrap(), Path::new("models/city"));
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    normalize(path)
        .map(|parts| parts.into_iter().collect())
        .ok_or_raise(|| ErrorKind::InvalidPath(path.to_path_buf()))
}

/// [`validate`], then render as a `/`-separated string for staging and object keys.
pub(crate) fn validate_str(path: &str) -> Result<String> {
    let invalid = || ErrorKind::InvalidPath(PathBuf::from(path));
    let parts = normalize(Path::new(path)).ok_or_raise(invalid)?;
    let parts: Option<Vec<&str>> = parts.into_iter().map(OsStr::to_str).collect();
    parts.map(|parts| parts.join("/")).ok_or_raise(invalid)
}
