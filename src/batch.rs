//! Turning staged paths into task-sized batches.

use crate::error::{Classify, Result};
use async_stream::stream;
use futures::Stream;
use ingest3d_jobs::models::{Task, TaskParameters};
use ingest3d_staging::StagingStore;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::Path;
use std::pin::Pin;

pub type BatchStream<'a> = Pin<Box<dyn Stream<Item = Result<Vec<String>>> + Send + 'a>>;

/// Set of file extensions that never become part of a task.
///
/// Extensions are given without the leading dot and compared exactly
/// (case-sensitive) against the extension of a path's last component. Paths
/// without an extension, including dotfiles like `.gitignore`, are never
/// excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionPolicy {
    blacklist: HashSet<String>,
}

impl ExclusionPolicy {
    pub fn new(blacklist: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { blacklist: blacklist.into_iter().map(Into::into).collect() }
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.blacklist.contains(ext))
    }
}

/// Read every entry staged for `model_id` and group the non-excluded ones
/// into batches of `batch_size`.
///
/// Batches are emitted as soon as they fill up; whatever remains at the end
/// is emitted as a last, smaller batch. An empty (or fully excluded) staging
/// yields no batches at all.
pub fn batches<'a>(
    staging: &'a dyn StagingStore,
    model_id: &'a str,
    batch_size: NonZeroUsize,
    policy: &'a ExclusionPolicy,
) -> BatchStream<'a> {
    Box::pin(stream! {
        let mut pending = Vec::with_capacity(batch_size.get());
        loop {
            let path = match staging.read_next(model_id).await.classify() {
                Ok(Some(path)) => path,
                Ok(None) => break,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            if policy.is_excluded(&path) {
                tracing::warn!(model_id, path = %path, "Excluding blacklisted file from tasks");
                continue;
            }
            pending.push(path);
            if pending.len() == batch_size.get() {
                yield Ok(std::mem::replace(&mut pending, Vec::with_capacity(batch_size.get())));
            }
        }
        if !pending.is_empty() {
            yield Ok(pending);
        }
    })
}

/// Builds the task for one batch of a model's paths.
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    task_type: String,
    model_id: String,
}

impl TaskBuilder {
    pub fn new(task_type: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self { task_type: task_type.into(), model_id: model_id.into() }
    }

    pub fn build(&self, paths: Vec<String>) -> Task {
        Task {
            task_type: self.task_type.clone(),
            parameters: TaskParameters { paths, model_id: self.model_id.clone(), last_index_error: -1 },
        }
    }
}
