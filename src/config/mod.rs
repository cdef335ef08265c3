mod defaults;
mod types;

pub use types::*;

use crate::error::ConfigError;
use defaults::*;
use std::path::Path;
use std::time::Duration;

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            concurrency: default_concurrency(),
            label_batch_size: default_label_batch_size(),
            request_timeout_sec: default_request_timeout_sec(),
            run_timeout_sec: default_run_timeout_sec(),
            secrets_file: default_secrets_file(),
            retry: RetryConfig::default(),
            reddit: RedditConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.label_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "label_batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.backoff_base_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.backoff_base_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(1..=100).contains(&self.reddit.page_size) {
            return Err(ConfigError::Invalid {
                field: "reddit.page_size",
                reason: format!("{} is outside [1, 100]", self.reddit.page_size),
            });
        }
        if self.request_timeout_sec == 0 || self.run_timeout_sec == 0 {
            return Err(ConfigError::Invalid {
                field: "timeouts",
                reason: "timeouts must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_sec)
    }
}
