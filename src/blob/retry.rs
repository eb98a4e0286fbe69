//! Retrying request transport
//!
//! Transient failures (connection errors, timeouts, `5xx`, `408`, `429`) are
//! retried with exponential backoff. Every attempt and every backoff sleep
//! races the cancellation token so a cancelled upload returns promptly.

use super::BlobClientError;
use crate::metrics;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry policy for block and block list requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt. Default: 3
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry. Default: 100
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any single delay. Default: 10000
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Growth factor between consecutive delays. Default: 2.0
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl RetryConfig {
    /// Policy that never retries
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let millis = (self.initial_backoff_ms as f64 * factor).min(self.max_backoff_ms as f64);
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

/// Whether a response status is worth another attempt
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Whether a transport error is worth another attempt.
///
/// Request errors cover connections dropped or reset mid-exchange; block
/// and block list writes are idempotent, so resending them is safe.
fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// Send a request, rebuilding it for each attempt.
///
/// Returns the last response once it is non-retryable or retries are
/// exhausted; the caller decides whether its status is a success.
/// Transport errors are returned without the request URL.
pub(crate) async fn send_with_retry<F>(
    policy: &RetryConfig,
    cancel: &CancellationToken,
    operation: &'static str,
    build: F,
) -> Result<Response, BlobClientError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0u32;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BlobClientError::Cancelled),
            result = build().send() => result,
        };
        // The URL carries the SAS signature; keep it out of errors and logs.
        let result = result.map_err(reqwest::Error::without_url);

        let reason = match &result {
            Ok(response) if is_retryable_status(response.status()) => {
                Some(format!("status {}", response.status().as_u16()))
            }
            Err(e) if is_retryable_error(e) => Some(e.to_string()),
            _ => None,
        };

        match reason {
            Some(reason) if attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                attempt += 1;
                metrics::record_retry(operation);

                tracing::warn!(
                    operation = operation,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "Retrying request"
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(BlobClientError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            _ => return result.map_err(BlobClientError::Request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff_ms, 100);
        assert_eq!(config.max_backoff_ms, 10_000);
        assert_eq!(config.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
            backoff_multiplier: 2.0,
        };

        assert_eq!(config.backoff(0), Duration::from_millis(10));
        assert_eq!(config.backoff(1), Duration::from_millis(20));
        assert_eq!(config.backoff(2), Duration::from_millis(40));
        assert_eq!(config.backoff(3), Duration::from_millis(80));
        assert_eq!(config.backoff(4), Duration::from_millis(100));
        assert_eq!(config.backoff(30), Duration::from_millis(100));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::CREATED));
    }

    #[test]
    fn test_disabled_policy() {
        assert_eq!(RetryConfig::disabled().max_retries, 0);
    }
}
