//! Choosing the storage provider from configuration.

use crate::error::{Classify, Result};
use ingest3d_config::ProviderConfig;
use ingest3d_staging::StagingHandle;
use ingest3d_storage::ProviderHandle;
use ingest3d_storage::provider::{NfsProvider, S3Provider};
use std::sync::Arc;

/// Build the configured provider, appending into `staging`.
pub fn provider_from_config(config: &ProviderConfig, staging: StagingHandle) -> Result<ProviderHandle> {
    let provider: ProviderHandle = match config {
        ProviderConfig::Nfs { pv_path } => Arc::new(NfsProvider::new("nfs", pv_path, staging).classify()?),
        ProviderConfig::S3(s3) => Arc::new(S3Provider::new(
            "s3",
            &s3.bucket,
            &s3.region,
            s3.endpoint.as_deref(),
            &s3.key_id,
            &s3.key_secret,
            s3.force_path_style,
            staging,
        )),
    };
    tracing::info!(provider = provider.name(), "Using storage provider");
    Ok(provider)
}
