// Named retry configurations for common call sites
use std::time::Duration;

use crate::retry::config::RetryConfig;
use crate::retry::constants::{
    DATABASE_RETRYABLE_ERRORS, EXTERNAL_API_RETRYABLE_ERRORS, FILE_OPERATION_RETRYABLE_ERRORS,
};

/// Ready-made [`RetryConfig`] values
///
/// Each preset is a plain value; adjust fields or attach a hook on the
/// returned config as needed.
#[derive(Debug, Clone, Copy)]
pub struct RetryPresets;

impl RetryPresets {
    /// Fast interactive calls: 3 attempts, 100ms growing to at most 1s
    pub fn quick() -> RetryConfig {
        Self::exponential(3, Duration::from_millis(100), Duration::from_secs(1))
    }

    /// Alias of [`quick`](Self::quick) for request/response API calls
    pub fn api_call() -> RetryConfig {
        Self::quick()
    }

    /// General purpose: 3 attempts, 1s growing to at most 10s
    pub fn standard() -> RetryConfig {
        Self::exponential(3, Duration::from_secs(1), Duration::from_secs(10))
    }

    /// Background work that can afford to wait: 5 attempts, 500ms up to 30s
    pub fn aggressive() -> RetryConfig {
        Self::exponential(5, Duration::from_millis(500), Duration::from_secs(30))
    }

    /// Database connectivity failures only
    pub fn database() -> RetryConfig {
        RetryConfig {
            retryable_errors: to_owned(DATABASE_RETRYABLE_ERRORS),
            operation: Some("database".to_string()),
            ..Self::exponential(5, Duration::from_secs(1), Duration::from_secs(10))
        }
    }

    /// Remote HTTP APIs, including throttling responses
    pub fn external_api() -> RetryConfig {
        RetryConfig {
            retryable_errors: to_owned(EXTERNAL_API_RETRYABLE_ERRORS),
            operation: Some("external_api".to_string()),
            ..Self::exponential(4, Duration::from_secs(1), Duration::from_secs(30))
        }
    }

    /// Local file access contention, retried on a fixed schedule without jitter
    pub fn file_operation() -> RetryConfig {
        RetryConfig {
            jitter: false,
            retryable_errors: to_owned(FILE_OPERATION_RETRYABLE_ERRORS),
            operation: Some("file_operation".to_string()),
            ..Self::exponential(3, Duration::from_millis(100), Duration::from_secs(1))
        }
    }

    fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier: 2.0,
            jitter: true,
            ..RetryConfig::default()
        }
    }
}

fn to_owned(identifiers: &[&str]) -> Vec<String> {
    identifiers.iter().map(|s| s.to_string()).collect()
}
