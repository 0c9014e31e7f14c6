//! Configuration for ingest3d.
//!
//! Sources are layered, later ones overriding earlier ones:
//!
//! 1. Built-in defaults ([`Config::default`] for everything except the provider).
//! 2. A configuration file: the explicit path if one is given, otherwise
//!    `config.toml` in the platform configuration directory when it exists.
//!    TOML, YAML and JSON are picked by file extension.
//! 3. Environment variables prefixed with `INGEST3D_`, using `__` to reach
//!    into sections, e.g. `INGEST3D_INGESTION__BATCH_SIZE=50` or
//!    `INGEST3D_PROVIDER__KIND=s3`.
//!
//! The result is [validated](Config::validate) before it is handed out.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "INGEST3D_";
/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "INGEST3D_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub job_manager: JobManagerConfig,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Maximum number of file paths per task.
    pub batch_size: usize,
    /// Maximum number of task creation requests in flight at once.
    pub max_concurrency: usize,
    /// File extensions (without the leading dot) that never become tasks.
    pub blacklist: Vec<String>,
    /// Directory holding the per-model staging files.
    pub staging_dir: PathBuf,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_concurrency: 5,
            blacklist: Vec::new(),
            staging_dir: default_staging_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobManagerConfig {
    pub url: String,
    pub job_type: String,
    pub task_type: String,
    pub domain: String,
    pub timeout_secs: u64,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            job_type: "Ingestion".to_string(),
            task_type: "Ingestion".to_string(),
            domain: "3D".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Where models are read from. Exactly one provider is active per process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Mounted (networked) filesystem.
    Nfs { pv_path: PathBuf },
    /// S3-compatible object store.
    S3(S3Config),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_staging_dir() -> PathBuf {
    match ProjectDirs::from("", "", "ingest3d") {
        Some(dirs) => dirs.cache_dir().join("staging"),
        None => std::env::temp_dir().join("ingest3d"),
    }
}

/// Default location of the configuration file, if the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "ingest3d").map(|dirs| dirs.config_dir().join("config.toml"))
}

impl Config {
    /// Load and validate configuration from all sources.
    ///
    /// `path` is an explicitly requested file and must exist. Without one,
    /// the default file location is used if a file is present there.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Serialized::default("ingestion", IngestionConfig::default()))
            .merge(Serialized::default("job_manager", JobManagerConfig::default()));

        match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::FileNotFound(path.to_path_buf())),
            Some(path) => figment = merge_file(figment, path),
            None => {
                if let Some(path) = default_config_path().filter(|p| p.is_file()) {
                    figment = merge_file(figment, &path);
                }
            },
        }

        let figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"));
        let config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(provider = config.provider.kind(), "Loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let ingestion = &self.ingestion;
        if ingestion.batch_size == 0 {
            exn::bail!(ErrorKind::Validation("ingestion.batch_size must be positive".to_string()));
        }
        if ingestion.max_concurrency == 0 {
            exn::bail!(ErrorKind::Validation("ingestion.max_concurrency must be positive".to_string()));
        }
        if let Some(ext) = ingestion.blacklist.iter().find(|e| e.is_empty() || e.contains(['.', '/'])) {
            exn::bail!(ErrorKind::Validation(format!(
                "ingestion.blacklist entries are bare extensions like \"zip\", got {ext:?}"
            )));
        }
        let jobs = &self.job_manager;
        for (key, value) in [("url", &jobs.url), ("job_type", &jobs.job_type), ("task_type", &jobs.task_type)] {
            if value.trim().is_empty() {
                exn::bail!(ErrorKind::Validation(format!("job_manager.{key} must not be empty")));
            }
        }
        if jobs.timeout_secs == 0 {
            exn::bail!(ErrorKind::Validation("job_manager.timeout_secs must be positive".to_string()));
        }
        match &self.provider {
            ProviderConfig::Nfs { pv_path } if !pv_path.is_absolute() => {
                exn::bail!(ErrorKind::Validation(format!(
                    "provider.pv_path must be absolute, got {}",
                    pv_path.display()
                )));
            },
            ProviderConfig::S3(s3) if s3.bucket.trim().is_empty() => {
                exn::bail!(ErrorKind::Validation("provider.bucket must not be empty".to_string()));
            },
            _ => Ok(()),
        }
    }
}

impl ProviderConfig {
    /// Short name of the provider kind, as written in configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Nfs { .. } => "nfs",
            Self::S3(_) => "s3",
        }
    }
}

fn merge_file(figment: Figment, path: &Path) -> Figment {
    tracing::debug!(path = %path.display(), "Reading configuration file");
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => figment.merge(Toml::file(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn nfs_config() -> Config {
        Config {
            ingestion: IngestionConfig::default(),
            job_manager: JobManagerConfig::default(),
            provider: ProviderConfig::Nfs { pv_path: PathBuf::from("/mnt/models") },
        }
    }

    #[test]
    fn test_load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest3d.toml");
        std::fs::write(
            &path,
            r#"
                [ingestion]
                batch_size = 10
                blacklist = ["zip", "rar"]

                [provider]
                kind = "s3"
                bucket = "models"
                region = "us-east-1"
                endpoint = "http://localhost:9000"
                key_id = "minio"
                key_secret = "minio123"
                force_path_style = true
            "#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.ingestion.batch_size, 10);
        assert_eq!(config.ingestion.max_concurrency, IngestionConfig::default().max_concurrency);
        assert_eq!(config.ingestion.blacklist, vec!["zip", "rar"]);
        assert_eq!(config.job_manager, JobManagerConfig::default());
        let ProviderConfig::S3(s3) = config.provider else {
            panic!("expected an S3 provider");
        };
        assert_eq!(s3.bucket, "models");
        assert!(s3.force_path_style);
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest3d.yaml");
        std::fs::write(&path, "provider:\n  kind: nfs\n  pv_path: /mnt/models\njob_manager:\n  url: http://jobs:8080\n")
            .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.provider, ProviderConfig::Nfs { pv_path: PathBuf::from("/mnt/models") });
        assert_eq!(config.job_manager.url, "http://jobs:8080");
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::FileNotFound(_)));
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[ingestion]\nbatch_size = 10\n[provider]\nkind = \"nfs\"\npv_path = \"/mnt/a\"\n")?;
            jail.set_env("INGEST3D_INGESTION__BATCH_SIZE", "25");
            jail.set_env("INGEST3D_PROVIDER__PV_PATH", "/mnt/b");
            jail.set_env("INGEST3D_CONFIG", "ignored.toml");

            let config = Config::load(Some(Path::new("config.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.ingestion.batch_size, 25);
            assert_eq!(config.provider, ProviderConfig::Nfs { pv_path: PathBuf::from("/mnt/b") });
            Ok(())
        });
    }

    #[test]
    fn test_missing_provider_fails_to_load() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[ingestion]\nbatch_size = 10\n")?;
            let err = Config::load(Some(Path::new("config.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Load));
            Ok(())
        });
    }

    #[test]
    fn test_valid_config() {
        assert!(nfs_config().validate().is_ok());
    }

    #[rstest]
    #[case::zero_batch(|c: &mut Config| c.ingestion.batch_size = 0)]
    #[case::zero_concurrency(|c: &mut Config| c.ingestion.max_concurrency = 0)]
    #[case::dotted_extension(|c: &mut Config| c.ingestion.blacklist = vec![".zip".to_string()])]
    #[case::empty_extension(|c: &mut Config| c.ingestion.blacklist = vec![String::new()])]
    #[case::empty_task_type(|c: &mut Config| c.job_manager.task_type = " ".to_string())]
    #[case::zero_timeout(|c: &mut Config| c.job_manager.timeout_secs = 0)]
    #[case::relative_pv_path(|c: &mut Config| c.provider = ProviderConfig::Nfs { pv_path: PathBuf::from("models") })]
    fn test_invalid_config(#[case] mutate: fn(&mut Config)) {
        let mut config = nfs_config();
        mutate(&mut config);
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(_)));
    }

    #[test]
    fn test_empty_bucket_is_invalid() {
        let mut config = nfs_config();
        config.provider = ProviderConfig::S3(S3Config {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            key_id: "id".to_string(),
            key_secret: "secret".to_string(),
            force_path_style: false,
        });
        assert!(matches!(&*config.validate().unwrap_err(), ErrorKind::Validation(_)));
    }
}
