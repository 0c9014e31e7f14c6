//! Networked filesystem provider.
//!
//! Models live in directories under a mounted volume (the persistent volume
//! path). Directories are walked breadth-first via `tokio::fs`; entries of
//! each directory are visited in name order so that staging order is
//! deterministic for a given tree.

use crate::error::{ErrorKind, Result};
use crate::path::validate_str;
use crate::provider::{StorageProvider, stage};
use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use ingest3d_staging::StagingHandle;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs::{self, DirEntry};
use tracing::instrument;

type PathStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

enum WalkEntry {
    File(String),
    Descend(String),
    Skip,
}

/// Filesystem provider rooted at a mounted volume.
///
/// Staged paths are relative to the volume root and always start with the
/// model's own path, e.g. `models/city/tiles/0/0.b3dm`.
///
/// # Examples
///
/// ```no_run
/// use ingest3d_staging::FileStagingStore;
/// use ingest3d_storage::provider::NfsProvider;
/// use std::sync::Arc;
///
/// # fn example() -> ingest3d_storage::error::Result<()> {
/// let staging = Arc::new(FileStagingStore::new("/tmp/ingest3d"));
/// let provider = NfsProvider::new("nfs", "/mnt/models", staging)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NfsProvider {
    name: String,
    /// Mount point that model paths are relative to.
    root: PathBuf,
    staging: StagingHandle,
}

impl NfsProvider {
    /// Create a provider for the volume mounted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPath`](ErrorKind::InvalidPath) if `root` is not
    /// absolute. The root itself is not required to exist yet; a missing
    /// model is reported by [`enumerate`](StorageProvider::enumerate).
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>, staging: StagingHandle) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { name: name.into(), root, staging })
    }

    fn classify(folder: &str, entry: &DirEntry, file_type: std::fs::FileType) -> Result<WalkEntry> {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            // Downstream workers address files by these strings; a lossy
            // conversion would point them at a file that doesn't exist.
            exn::bail!(ErrorKind::InvalidPath(entry.path()));
        };
        let relative = format!("{folder}/{name}");
        if file_type.is_dir() {
            return Ok(WalkEntry::Descend(relative));
        }
        if file_type.is_file() {
            return Ok(WalkEntry::File(relative));
        }
        // Symlinks (possibly cyclic) and special files are not model content.
        tracing::debug!(path = %relative, "Skipping non-regular file");
        Ok(WalkEntry::Skip)
    }

    /// Entries of one directory, sorted by name.
    async fn read_folder(&self, folder: &str) -> Result<Vec<WalkEntry>> {
        let absolute = self.root.join(folder);
        let mut entries = fs::read_dir(&absolute).await.map_err(ErrorKind::Io)?;
        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
            let file_type = entry.file_type().await.map_err(ErrorKind::Io)?;
            found.push((entry.file_name(), Self::classify(folder, &entry, file_type)?));
        }
        found.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(found.into_iter().map(|(_, entry)| entry).collect())
    }

    /// Breadth-first walk yielding every file below `start`. The stream ends
    /// after the first error.
    fn walk<'a>(&'a self, start: String) -> PathStream<'a> {
        Box::pin(stream! {
            let mut folders = VecDeque::from([start]);
            while let Some(folder) = folders.pop_front() {
                tracing::trace!(folder = %folder, "Listing folder");
                let entries = match self.read_folder(&folder).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                };
                for entry in entries {
                    match entry {
                        WalkEntry::File(path) => yield Ok(path),
                        WalkEntry::Descend(path) => folders.push_back(path),
                        WalkEntry::Skip => {},
                    }
                }
            }
        })
    }
}

#[async_trait]
impl StorageProvider for NfsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(provider = %self.name))]
    async fn enumerate(&self, model_id: &str, path_to_tileset: &str, model_name: &str) -> Result<u64> {
        let model_path = validate_str(path_to_tileset)?;
        let absolute = self.root.join(&model_path);
        match fs::metadata(&absolute).await {
            Ok(metadata) if metadata.is_dir() => {},
            Ok(_) => exn::bail!(ErrorKind::InvalidPath(absolute)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::error!(path = %absolute.display(), "Model folder does not exist");
                exn::bail!(ErrorKind::NotFound(format!("model {model_name} doesn't exist at {model_path}")));
            },
            Err(e) => exn::bail!(ErrorKind::Io(e)),
        }

        let mut files = self.walk(model_path.clone());
        let mut files_count: u64 = 0;
        while let Some(path) = files.try_next().await? {
            stage(self.staging.as_ref(), model_id, &path).await?;
            files_count += 1;
        }

        if files_count == 0 {
            exn::bail!(ErrorKind::NotFound(format!("model {model_name} at {model_path} contains no files")));
        }
        tracing::info!(files_count, model_path = %model_path, "Finished listing the files");
        Ok(files_count)
    }
}
