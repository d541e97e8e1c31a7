// Error and outcome types for retry module
use std::time::Duration;

use faultline_common::{CommonError, ErrorClassification, ErrorSeverity};
use thiserror::Error;

use crate::error::ConfigError;

/// Errors that end a retry loop without a value
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Every attempt failed with a retryable error
    #[error("Operation failed after {attempts} attempts: {last_error}")]
    Exhausted {
        attempts: u32,
        #[source]
        last_error: E,
    },

    /// The operation failed with an error that is not worth retrying
    #[error(transparent)]
    NonRetryable(E),

    /// The whole loop ran past its deadline
    #[error("Retry operation timed out after {timeout:?}")]
    TimedOut { timeout: Duration },

    /// The retry configuration is invalid
    #[error("Invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl<E> RetryError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Number of attempts made, when the loop ran to exhaustion
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Exhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// The operation error that ended the loop, if any
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { last_error, .. } => Some(last_error),
            Self::NonRetryable(e) => Some(e),
            _ => None,
        }
    }

    /// Consume into the operation error that ended the loop, if any
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Exhausted { last_error, .. } => Some(last_error),
            Self::NonRetryable(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

impl<E> From<ConfigError> for RetryError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Invalid { message } => Self::InvalidConfiguration { message },
        }
    }
}

impl<E> ErrorClassification for RetryError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn is_retryable(&self) -> bool {
        match self {
            Self::Exhausted { .. } => false, // Already exhausted all attempts
            Self::NonRetryable(_) => false,
            Self::TimedOut { .. } => true,
            Self::InvalidConfiguration { .. } => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Exhausted { .. } | Self::NonRetryable(_) => ErrorSeverity::Error,
            Self::TimedOut { .. } => ErrorSeverity::Warning,
            Self::InvalidConfiguration { .. } => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::InvalidConfiguration { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

// Cross-module conversion for callers that funnel everything into CommonError
impl<E> From<RetryError<E>> for CommonError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: RetryError<E>) -> Self {
        match err {
            RetryError::Exhausted { attempts, last_error } => CommonError::internal_with_context(
                format!("Retry attempts exhausted after {attempts} attempts"),
                last_error.to_string(),
            ),
            RetryError::NonRetryable(e) => CommonError::internal(e.to_string()),
            RetryError::TimedOut { timeout } => CommonError::timeout("retry_operation", timeout),
            RetryError::InvalidConfiguration { message } => CommonError::config(message),
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<RetryOutcome<T>, RetryError<E>>;

/// Value produced by a successful retry loop, with summary statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T> {
    pub value: T,
    /// 1-based attempt that succeeded
    pub attempts: u32,
    /// Sum of the delays slept before the successful attempt
    pub total_delay: Duration,
}

impl<T> RetryOutcome<T> {
    /// Consume the outcome and return only the value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Get the average delay between attempts (excludes operation execution
    /// time).
    pub fn average_delay(&self) -> Duration {
        if self.attempts <= 1 {
            return Duration::ZERO;
        }
        self.total_delay / (self.attempts - 1)
    }

    /// True if the first attempt succeeded
    pub fn first_try(&self) -> bool {
        self.attempts == 1
    }
}
