//! Engine-facing configuration
//!
//! [`EngineConfig`] is a read-only projection of the user [`Config`] with
//! durations already converted. It is cloned into every component and never
//! mutated after construction.

use std::path::PathBuf;
use std::time::Duration;

use photosync_core::config::Config;

/// Settings consumed by the reconciliation engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Wait between passes when nothing wakes the scheduler earlier
    pub polling_period: Duration,
    /// Maximum records per batch
    pub batch_size: u32,
    /// Maximum tasks staging or uploading at once
    pub max_concurrent_uploads: usize,
    /// Deadline for a single upload call
    pub upload_timeout: Duration,
    /// First retry delay after a failed upload
    pub retry_base_delay: Duration,
    /// Upper bound on the retry delay
    pub retry_max_delay: Duration,
    /// Tries for each record store write before giving up
    pub store_attempts: u32,
    /// Directory holding staged payloads
    pub staging_dir: PathBuf,
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            polling_period: Duration::from_secs(config.sync.polling_period_seconds),
            batch_size: config.sync.batch_size,
            max_concurrent_uploads: config.sync.max_concurrent_uploads as usize,
            upload_timeout: Duration::from_secs(config.sync.upload_timeout_seconds),
            retry_base_delay: Duration::from_secs(config.retry.base_delay_seconds),
            retry_max_delay: Duration::from_secs(config.retry.max_delay_seconds),
            store_attempts: config.retry.store_attempts.max(1),
            staging_dir: config.staging.dir.clone(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photosync_core::config::ConfigBuilder;

    #[test]
    fn test_defaults_match_user_config() {
        let config = EngineConfig::default();
        assert_eq!(config.polling_period, Duration::from_secs(5));
        assert_eq!(config.batch_size, 300);
        assert_eq!(config.max_concurrent_uploads, 30);
        assert_eq!(config.upload_timeout, Duration::from_secs(120));
        assert_eq!(config.store_attempts, 3);
    }

    #[test]
    fn test_from_config_converts_durations() {
        let config = ConfigBuilder::new()
            .polling_period_seconds(2)
            .batch_size(10)
            .max_concurrent_uploads(4)
            .retry_base_delay_seconds(1)
            .retry_max_delay_seconds(8)
            .staging_dir(PathBuf::from("/tmp/stage"))
            .build();

        let engine = EngineConfig::from_config(&config);
        assert_eq!(engine.polling_period, Duration::from_secs(2));
        assert_eq!(engine.batch_size, 10);
        assert_eq!(engine.max_concurrent_uploads, 4);
        assert_eq!(engine.retry_base_delay, Duration::from_secs(1));
        assert_eq!(engine.retry_max_delay, Duration::from_secs(8));
        assert_eq!(engine.staging_dir, PathBuf::from("/tmp/stage"));
    }
}
