//! S3-compatible object store provider.
//!
//! Object stores have no real directories. A model is every object under the
//! key prefix `<path_to_tileset>/`; listing with a `/` delimiter returns one
//! "folder" level at a time, and each common prefix is queued up and listed
//! in turn until no folders remain.
//!
//! Because folders only exist as long as some object lives under them, an
//! empty listing is the only reliable signal that a model doesn't exist.

use crate::error::{ErrorKind, Result, UNKNOWN_UPSTREAM_STATUS};
use crate::path::validate_str;
use crate::provider::{StorageProvider, stage};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::DisplayErrorContext,
    operation::list_objects_v2::ListObjectsV2Output,
};
use exn::ResultExt;
use futures::{Stream, TryStreamExt};
use ingest3d_staging::StagingHandle;
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::instrument;

type KeyStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

const DELIMITER: &str = "/";

/// S3-compatible storage provider.
///
/// Works against AWS S3 as well as S3-compatible services such as MinIO or
/// Backblaze B2.
///
/// # Examples
///
/// ```no_run
/// use ingest3d_staging::FileStagingStore;
/// use ingest3d_storage::provider::S3Provider;
/// use std::sync::Arc;
///
/// let staging = Arc::new(FileStagingStore::new("/tmp/ingest3d"));
/// let provider = S3Provider::new(
///     "s3",
///     "models",
///     "us-east-1",
///     Some("http://localhost:9000"),
///     "access_key_id",
///     "secret_access_key",
///     true,
///     staging,
/// );
/// ```
#[derive(Clone)]
pub struct S3Provider {
    name: String,
    client: Client,
    bucket: String,
    staging: StagingHandle,
}

impl S3Provider {
    /// Create a new S3 provider with explicit credentials.
    ///
    /// # Arguments
    /// * `name` - A name for this provider (used in logging)
    /// * `bucket` - Bucket holding the models
    /// * `region` - AWS region or provider-specific region
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - Access key ID
    /// * `key_secret` - Secret access key
    /// * `force_path_style` - Use `endpoint/bucket/key` addressing (MinIO etc.)
    /// * `staging` - Where discovered keys are appended
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        force_path_style: bool,
        staging: StagingHandle,
    ) -> Self {
        let region = Region::new(region.into());
        let credentials = Credentials::new(key_id, key_secret, None, None, "ingest3d-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(region)
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            .force_path_style(force_path_style);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Self::with_client(name, Client::from_conf(config_builder.build()), bucket, staging)
    }

    /// Create a provider around an already configured client.
    pub fn with_client(
        name: impl Into<String>,
        client: Client,
        bucket: impl Into<String>,
        staging: StagingHandle,
    ) -> Self {
        Self { name: name.into(), client, bucket: bucket.into(), staging }
    }

    /// Fetch one page of a single folder level.
    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ListObjectsV2Output> {
        let request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .delimiter(DELIMITER)
            .prefix(prefix)
            .set_continuation_token(continuation);
        match request.send().await {
            Ok(output) => Ok(output),
            Err(err) => {
                let status = err.raw_response().map(|r| r.status().as_u16()).unwrap_or(UNKNOWN_UPSTREAM_STATUS);
                let message = DisplayErrorContext(&err).to_string();
                tracing::error!(bucket = %self.bucket, prefix, status, error = %message, "Failed to list objects");
                Err(err).or_raise(|| ErrorKind::ExternalService { status, message })
            },
        }
    }

    /// Yield every object key below `start`, folder by folder. The stream ends
    /// after the first error.
    fn walk<'a>(&'a self, start: String) -> KeyStream<'a> {
        Box::pin(stream! {
            let mut folders = VecDeque::from([start]);
            while let Some(folder) = folders.pop_front() {
                let mut continuation: Option<String> = None;
                loop {
                    tracing::trace!(prefix = %folder, continuation = ?continuation, "Listing objects");
                    let page = match self.list_page(&folder, continuation.take()).await {
                        Ok(page) => page,
                        Err(e) => {
                            yield Err(e);
                            return;
                        },
                    };
                    for object in page.contents() {
                        match object.key() {
                            // Zero-byte "folder" placeholders created by consoles and sync tools.
                            Some(key) if key.ends_with(DELIMITER) => {},
                            Some(key) => yield Ok(key.to_string()),
                            None => {
                                yield Err(exn::Exn::from(ErrorKind::ExternalService {
                                    status: UNKNOWN_UPSTREAM_STATUS,
                                    message: format!("object without a key listed under {folder}"),
                                }));
                                return;
                            },
                        }
                    }
                    for common in page.common_prefixes() {
                        if let Some(prefix) = common.prefix() {
                            folders.push_back(prefix.to_string());
                        }
                    }
                    match (page.is_truncated(), page.next_continuation_token()) {
                        (Some(true), Some(token)) => continuation = Some(token.to_string()),
                        // Stopping here would silently drop the rest of the folder.
                        (Some(true), None) => {
                            yield Err(exn::Exn::from(ErrorKind::ExternalService {
                                status: UNKNOWN_UPSTREAM_STATUS,
                                message: format!("truncated listing without continuation token under {folder}"),
                            }));
                            return;
                        },
                        _ => break,
                    }
                }
            }
        })
    }
}

#[async_trait]
impl StorageProvider for S3Provider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(provider = %self.name, bucket = %self.bucket))]
    async fn enumerate(&self, model_id: &str, path_to_tileset: &str, model_name: &str) -> Result<u64> {
        let prefix = format!("{}{DELIMITER}", validate_str(path_to_tileset)?);

        let mut keys = self.walk(prefix.clone());
        let mut files_count: u64 = 0;
        while let Some(key) = keys.try_next().await? {
            stage(self.staging.as_ref(), model_id, &key).await?;
            files_count += 1;
        }

        if files_count == 0 {
            tracing::error!(prefix = %prefix, "Model does not exist in bucket");
            exn::bail!(ErrorKind::NotFound(format!("model {model_name} doesn't exist at {prefix}")));
        }
        tracing::info!(files_count, prefix = %prefix, "Finished listing the files");
        Ok(files_count)
    }
}
