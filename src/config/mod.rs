//! Configuration module for Blockblob Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.

use crate::blob::{RetryConfig, API_VERSION, DEFAULT_USER_AGENT};
use crate::upload::coordinator::{DEFAULT_CHUNK_SIZE, DEFAULT_WORKERS};
use crate::upload::{EmptyInputPolicy, FailurePolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Largest block the storage service accepts (100MB)
pub const MAX_CHUNK_SIZE: usize = 100 * 1024 * 1024;

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref url) = self.target.url {
            if !is_valid_http_url(url) {
                return Err(ConfigError::ValidationError(
                    "Invalid target URL: must start with http:// or https://".into(),
                ));
            }
        }

        if self.upload.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.chunk_size must be greater than 0".into(),
            ));
        }
        if self.upload.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "upload.chunk_size {} exceeds the maximum block size {}",
                self.upload.chunk_size, MAX_CHUNK_SIZE
            )));
        }
        if self.upload.workers == 0 {
            return Err(ConfigError::ValidationError(
                "upload.workers must be greater than 0".into(),
            ));
        }

        let retry = &self.client.retry;
        if retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid backoff multiplier {}: must be at least 1.0",
                retry.backoff_multiplier
            )));
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            return Err(ConfigError::ValidationError(
                "client.retry.initial_backoff_ms must not exceed max_backoff_ms".into(),
            ));
        }

        if self.client.timeout_seconds == Some(0) {
            return Err(ConfigError::ValidationError(
                "client.timeout_seconds must be greater than 0".into(),
            ));
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format '{}': must be 'text' or 'json'",
                    other
                )))
            }
        }

        Ok(())
    }
}

/// Upload target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Blob URL carrying its write authorization (SAS)
    #[serde(default)]
    pub url: Option<String>,
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            api_version: default_api_version(),
            timeout_seconds: default_timeout_seconds(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_timeout_seconds() -> Option<u64> {
    Some(300)
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub empty_input: EmptyInputPolicy,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            workers: default_workers(),
            failure_policy: FailurePolicy::default(),
            empty_input: EmptyInputPolicy::default(),
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set. Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "text" or "json". Default: "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}
