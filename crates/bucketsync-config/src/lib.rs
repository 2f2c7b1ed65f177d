//! Configuration management system for bucketsync
//!
//! This crate provides layered configuration for bucketsync: built-in defaults,
//! an optional YAML/TOML/JSON file, and environment variable overrides, merged
//! and validated into a single immutable [`Config`] value that is passed
//! explicitly to every component.
//!
//! # Features
//!
//! - **Multiple formats**: Support for YAML, TOML and JSON configuration files
//! - **Validation**: Type-safe configuration with range-checked chunk size and concurrency
//! - **Environment overrides**: `BUCKETSYNC__SECTION__KEY` variables override file values
//! - **Defaults**: Sensible default values for all configuration options
//!
//! # Examples
//!
//! ```rust,no_run
//! use bucketsync_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("bucketsync.yaml")
//!     .add_env_prefix("BUCKETSYNC")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Chunk size: {}", config.sync.chunk_size.get());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use bucketsync_types::{ChunkSize, Concurrency};
use serde::{Deserialize, Serialize};

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Main configuration structure for bucketsync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Bucket and connection settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Sync behaviour
    #[serde(default)]
    pub sync: SyncConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Progress reporting configuration
    #[serde(default)]
    pub progress: ProgressConfig,
}

/// Bucket and connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bucket name
    pub bucket: Option<String>,
    /// Key prefix that acts as the remote sync root
    pub prefix: String,
    /// Region of the bucket
    pub region: String,
    /// Custom endpoint for S3-compatible services
    pub endpoint: Option<String>,
    /// Static access key; the default credential chain is used when unset
    pub access_key: Option<String>,
    /// Static secret key
    pub secret_key: Option<String>,
    /// Use path-style addressing instead of virtual-hosted buckets
    pub force_path_style: bool,
    /// Talk plain http to the endpoint
    pub disable_ssl: bool,
    /// Canned ACL applied to uploaded objects
    pub acl: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: String::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            force_path_style: false,
            disable_ssl: false,
            acl: None,
        }
    }
}

impl StorageConfig {
    /// The configured bucket, or `MissingRequired` when none is set
    pub fn require_bucket(&self) -> ConfigResult<&str> {
        match self.bucket.as_deref() {
            Some(bucket) if !bucket.trim().is_empty() => Ok(bucket),
            _ => Err(ConfigError::missing_required("storage.bucket")),
        }
    }

    /// Whether both halves of a static credential pair are present
    pub fn has_static_credentials(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some()
    }
}

/// Sync behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Fingerprint chunk size; must equal the multipart part size used for uploads
    pub chunk_size: ChunkSize,
    /// Plan and report without transferring or deleting anything
    pub dry_run: bool,
    /// Delete destination objects that have no source counterpart
    pub delete_extra: bool,
    /// Objects transferred at the same time
    pub concurrency: Concurrency,
    /// List the remote prefix non-recursively
    pub delimiter: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: ChunkSize::default(),
            dry_run: false,
            delete_extra: true,
            concurrency: Concurrency::default(),
            delimiter: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Enable JSON formatting
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Progress reporting configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Hide the progress bar
    pub disable_progress_bar: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.sync.chunk_size.get(), 5 * 1024 * 1024);
        assert_eq!(config.sync.concurrency.get(), 1);
        assert!(config.sync.delete_extra);
        assert!(!config.sync.dry_run);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_require_bucket() {
        let mut storage = StorageConfig::default();
        assert!(matches!(
            storage.require_bucket(),
            Err(ConfigError::MissingRequired { .. })
        ));

        storage.bucket = Some("   ".to_string());
        assert!(storage.require_bucket().is_err());

        storage.bucket = Some("backups".to_string());
        assert_eq!(storage.require_bucket().unwrap(), "backups");
    }

    #[test]
    fn test_static_credentials_need_both_halves() {
        let mut storage = StorageConfig::default();
        storage.access_key = Some("AKIA".to_string());
        assert!(!storage.has_static_credentials());

        storage.secret_key = Some("secret".to_string());
        assert!(storage.has_static_credentials());
    }
}
