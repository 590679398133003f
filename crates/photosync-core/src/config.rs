//! Configuration module for PhotoSync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! Every section falls back to its defaults, so a partial file is valid.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for PhotoSync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub retry: RetryConfig,
    pub staging: StagingConfig,
    pub storage: StorageConfig,
    pub library: LibraryConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

/// Sync engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds the scheduler waits between passes when nothing wakes it.
    pub polling_period_seconds: u64,
    /// Maximum number of records selected per pass.
    pub batch_size: u32,
    /// Maximum number of uploads in flight at once.
    pub max_concurrent_uploads: u32,
    /// Seconds before a single upload is abandoned as failed.
    pub upload_timeout_seconds: u64,
}

/// Retry and backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry of a failed record.
    pub base_delay_seconds: u64,
    /// Upper bound for the exponential backoff.
    pub max_delay_seconds: u64,
    /// Attempts for each record store write before giving up on the batch.
    pub store_attempts: u32,
}

/// Staging area settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Directory that holds payloads while they are uploaded.
    pub dir: PathBuf,
}

/// Record store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the SQLite database file.
    pub database: PathBuf,
}

/// Local media library settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Directory whose files make up the local library.
    pub root: PathBuf,
}

/// Remote store settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL payloads are uploaded to. `None` until configured.
    pub endpoint: Option<String>,
    /// Optional bearer token sent with every upload.
    pub access_token: Option<String>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Using default configuration");
                Self::default()
            }
        }
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/photosync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("photosync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            polling_period_seconds: 5,
            batch_size: 300,
            max_concurrent_uploads: 30,
            upload_timeout_seconds: 120,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_seconds: 30,
            max_delay_seconds: 3600,
            store_attempts: 3,
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("~/.cache"))
                .join("photosync")
                .join("staging"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("photosync")
                .join("records.db"),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: dirs::picture_dir()
                .unwrap_or_else(|| {
                    dirs::home_dir()
                        .unwrap_or_else(|| PathBuf::from("~"))
                        .join("Pictures")
                }),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.batch_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        let positive: [(&str, u64); 4] = [
            ("sync.polling_period_seconds", self.sync.polling_period_seconds),
            ("sync.batch_size", u64::from(self.sync.batch_size)),
            (
                "sync.max_concurrent_uploads",
                u64::from(self.sync.max_concurrent_uploads),
            ),
            ("sync.upload_timeout_seconds", self.sync.upload_timeout_seconds),
        ];
        for (field, value) in positive {
            if value == 0 {
                errors.push(ValidationError::new(field, "must be greater than 0"));
            }
        }

        // --- retry ---
        if self.retry.base_delay_seconds == 0 {
            errors.push(ValidationError::new(
                "retry.base_delay_seconds",
                "must be greater than 0",
            ));
        }
        if self.retry.max_delay_seconds < self.retry.base_delay_seconds {
            errors.push(ValidationError::new(
                "retry.max_delay_seconds",
                format!(
                    "must be at least retry.base_delay_seconds ({})",
                    self.retry.base_delay_seconds
                ),
            ));
        }
        if self.retry.store_attempts == 0 {
            errors.push(ValidationError::new(
                "retry.store_attempts",
                "must be greater than 0",
            ));
        }

        // --- staging / storage ---
        if self.staging.dir.as_os_str().is_empty() {
            errors.push(ValidationError::new("staging.dir", "must not be empty"));
        }
        if self.storage.database.as_os_str().is_empty() {
            errors.push(ValidationError::new("storage.database", "must not be empty"));
        }

        // --- remote ---
        if let Some(ref endpoint) = self.remote.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                errors.push(ValidationError::new(
                    "remote.endpoint",
                    format!("must be an http(s) URL, got {endpoint:?}"),
                ));
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError::new(
                "logging.level",
                format!(
                    "invalid level {:?}, expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Config`], starting from defaults.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from [`Config::default`].
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn polling_period_seconds(mut self, seconds: u64) -> Self {
        self.config.sync.polling_period_seconds = seconds;
        self
    }

    pub fn batch_size(mut self, n: u32) -> Self {
        self.config.sync.batch_size = n;
        self
    }

    pub fn max_concurrent_uploads(mut self, n: u32) -> Self {
        self.config.sync.max_concurrent_uploads = n;
        self
    }

    pub fn upload_timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.sync.upload_timeout_seconds = seconds;
        self
    }

    // --- retry ---

    pub fn retry_base_delay_seconds(mut self, seconds: u64) -> Self {
        self.config.retry.base_delay_seconds = seconds;
        self
    }

    pub fn retry_max_delay_seconds(mut self, seconds: u64) -> Self {
        self.config.retry.max_delay_seconds = seconds;
        self
    }

    pub fn retry_store_attempts(mut self, n: u32) -> Self {
        self.config.retry.store_attempts = n;
        self
    }

    // --- paths ---

    pub fn staging_dir(mut self, dir: PathBuf) -> Self {
        self.config.staging.dir = dir;
        self
    }

    pub fn database(mut self, path: PathBuf) -> Self {
        self.config.storage.database = path;
        self
    }

    pub fn library_root(mut self, root: PathBuf) -> Self {
        self.config.library.root = root;
        self
    }

    // --- remote ---

    pub fn remote_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.remote.endpoint = Some(endpoint.into());
        self
    }

    pub fn remote_access_token(mut self, token: impl Into<String>) -> Self {
        self.config.remote.access_token = Some(token.into());
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.sync.polling_period_seconds, 5);
        assert_eq!(cfg.sync.batch_size, 300);
        assert_eq!(cfg.sync.max_concurrent_uploads, 30);
        assert_eq!(cfg.sync.upload_timeout_seconds, 120);
        assert_eq!(cfg.retry.base_delay_seconds, 30);
        assert_eq!(cfg.retry.max_delay_seconds, 3600);
        assert_eq!(cfg.retry.store_attempts, 3);
        assert!(cfg.staging.dir.ends_with("photosync/staging"));
        assert!(cfg.storage.database.ends_with("photosync/records.db"));
        assert!(cfg.remote.endpoint.is_none());
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
sync:
  polling_period_seconds: 10
  batch_size: 50
  max_concurrent_uploads: 4
  upload_timeout_seconds: 30
retry:
  base_delay_seconds: 5
  max_delay_seconds: 600
  store_attempts: 2
staging:
  dir: /tmp/photosync-staging
storage:
  database: /tmp/photosync.db
library:
  root: /tmp/photos
remote:
  endpoint: https://media.example.com/upload
  access_token: secret
logging:
  level: debug
  json: true
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.sync.polling_period_seconds, 10);
        assert_eq!(cfg.sync.batch_size, 50);
        assert_eq!(cfg.sync.max_concurrent_uploads, 4);
        assert_eq!(cfg.retry.store_attempts, 2);
        assert_eq!(cfg.staging.dir, PathBuf::from("/tmp/photosync-staging"));
        assert_eq!(cfg.library.root, PathBuf::from("/tmp/photos"));
        assert_eq!(
            cfg.remote.endpoint.as_deref(),
            Some("https://media.example.com/upload")
        );
        assert_eq!(cfg.remote.access_token.as_deref(), Some("secret"));
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.json);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let yaml = "sync:\n  batch_size: 10\n";
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(yaml.as_bytes()).unwrap();

        let cfg = Config::load(tmp.path()).unwrap();
        assert_eq!(cfg.sync.batch_size, 10);
        assert_eq!(cfg.sync.max_concurrent_uploads, 30);
        assert_eq!(cfg.retry, RetryConfig::default());
    }

    #[test]
    fn load_or_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/photosync/config.yaml"));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn load_rejects_malformed_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"sync: [not, a, map").unwrap();
        assert!(Config::load(tmp.path()).is_err());
    }

    #[test]
    fn default_path_ends_with_photosync_config() {
        assert!(Config::default_path().ends_with("photosync/config.yaml"));
    }

    // -- Validation --

    #[test]
    fn validate_rejects_zero_values() {
        let cfg = ConfigBuilder::new()
            .polling_period_seconds(0)
            .batch_size(0)
            .max_concurrent_uploads(0)
            .upload_timeout_seconds(0)
            .retry_store_attempts(0)
            .build();
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        for field in [
            "sync.polling_period_seconds",
            "sync.batch_size",
            "sync.max_concurrent_uploads",
            "sync.upload_timeout_seconds",
            "retry.store_attempts",
        ] {
            assert!(fields.iter().any(|f| f == field), "missing {field}");
        }
    }

    #[test]
    fn validate_rejects_inverted_backoff_bounds() {
        let errors = ConfigBuilder::new()
            .retry_base_delay_seconds(100)
            .retry_max_delay_seconds(10)
            .build()
            .validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "retry.max_delay_seconds");
    }

    #[test]
    fn validate_rejects_bad_log_level_and_endpoint() {
        let errors = ConfigBuilder::new()
            .logging_level("verbose")
            .remote_endpoint("ftp://example.com")
            .build()
            .validate();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].to_string().starts_with("remote.endpoint:"));
        assert!(errors[1].to_string().contains("verbose"));
    }

    #[test]
    fn builder_validated() {
        assert!(ConfigBuilder::new().batch_size(10).build_validated().is_ok());
        assert!(ConfigBuilder::new().batch_size(0).build_validated().is_err());
    }
}
