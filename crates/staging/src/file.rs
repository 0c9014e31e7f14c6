//! File-backed staging store.
//!
//! One newline-delimited file per model, all I/O through `tokio::fs`.

use crate::StagingStore;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};
use tokio::sync::Mutex;

const EXTENSION: &str = "staging";

enum Cursor {
    Writing(BufWriter<File>),
    Reading(Lines<BufReader<File>>),
    Exhausted,
}

type CursorHandle = Arc<Mutex<Cursor>>;

/// Staging store keeping one file per model under a root directory.
///
/// # Examples
///
/// ```no_run
/// use ingest3d_staging::{FileStagingStore, StagingStore};
///
/// # async fn example() -> ingest3d_staging::error::Result<()> {
/// let staging = FileStagingStore::new("/var/tmp/ingest3d");
/// staging.create("model-1").await?;
/// staging.append("model-1", "model-1/tileset.json").await?;
/// while let Some(path) = staging.read_next("model-1").await? {
///     println!("{path}");
/// }
/// staging.delete("model-1").await?;
/// # Ok(())
/// # }
/// ```
pub struct FileStagingStore {
    root: PathBuf,
    cursors: Mutex<HashMap<String, CursorHandle>>,
}

impl FileStagingStore {
    /// The root directory is created lazily on the first
    /// [`create`](StagingStore::create).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    /// Location of the staging file for `model_id`, whether or not it exists.
    ///
    /// Model ids are opaque, so they are percent-encoded into a single file
    /// name that always stays under the root.
    pub fn path(&self, model_id: &str) -> Result<PathBuf> {
        if model_id.is_empty() {
            exn::bail!(ErrorKind::InvalidKey(model_id.to_string()));
        }
        Ok(self.root.join(format!("{}.{EXTENSION}", urlencoding::encode(model_id))))
    }

    async fn cursor(&self, model_id: &str) -> Result<CursorHandle> {
        self.cursors
            .lock()
            .await
            .get(model_id)
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotCreated(model_id.to_string())))
    }

    fn map_io_error(e: std::io::Error, model_id: &str) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists(model_id.to_string()),
            std::io::ErrorKind::NotFound => ErrorKind::NotCreated(model_id.to_string()),
            _ => ErrorKind::Io(e),
        }
    }
}

#[async_trait]
impl StagingStore for FileStagingStore {
    async fn create(&self, model_id: &str) -> Result<()> {
        let path = self.path(model_id)?;
        fs::create_dir_all(&self.root).await.map_err(ErrorKind::Io)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| Self::map_io_error(e, model_id))?;
        let cursor = Arc::new(Mutex::new(Cursor::Writing(BufWriter::new(file))));
        self.cursors.lock().await.insert(model_id.to_string(), cursor);
        tracing::debug!(model_id, path = %path.display(), "Created staging file");
        Ok(())
    }

    async fn append(&self, model_id: &str, entry: &str) -> Result<()> {
        if entry.contains(['\n', '\r']) {
            exn::bail!(ErrorKind::InvalidEntry(entry.to_string()));
        }
        let cursor = self.cursor(model_id).await?;
        let mut guard = cursor.lock().await;
        let Cursor::Writing(writer) = &mut *guard else {
            exn::bail!(ErrorKind::Sealed(model_id.to_string()));
        };
        writer.write_all(entry.as_bytes()).await.map_err(ErrorKind::Io)?;
        writer.write_all(b"\n").await.map_err(ErrorKind::Io)?;
        Ok(())
    }

    async fn read_next(&self, model_id: &str) -> Result<Option<String>> {
        let cursor = self.cursor(model_id).await?;
        let mut guard = cursor.lock().await;
        if let Cursor::Writing(writer) = &mut *guard {
            writer.flush().await.map_err(ErrorKind::Io)?;
            let file = File::open(self.path(model_id)?).await.map_err(|e| Self::map_io_error(e, model_id))?;
            // Dropping the writer here closes the write cursor for good.
            *guard = Cursor::Reading(BufReader::new(file).lines());
        }
        let next = match &mut *guard {
            Cursor::Reading(lines) => lines.next_line().await.map_err(ErrorKind::Io)?,
            Cursor::Writing(_) | Cursor::Exhausted => None,
        };
        if next.is_none() {
            *guard = Cursor::Exhausted;
        }
        Ok(next)
    }

    async fn is_empty(&self, model_id: &str) -> Result<bool> {
        let cursor = self.cursor(model_id).await?;
        if let Cursor::Writing(writer) = &mut *cursor.lock().await {
            writer.flush().await.map_err(ErrorKind::Io)?;
        }
        let metadata = fs::metadata(self.path(model_id)?).await.map_err(|e| Self::map_io_error(e, model_id))?;
        Ok(metadata.len() == 0)
    }

    async fn delete(&self, model_id: &str) -> Result<()> {
        let path = self.path(model_id)?;
        // Drop any open cursor before the file goes away.
        self.cursors.lock().await.remove(model_id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(model_id, path = %path.display(), "Deleted staging file");
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ErrorKind::Io(e).into()),
        }
    }
}
