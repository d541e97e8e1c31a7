//! Error types for circuit breakers and their configuration

use std::time::Duration;

use chrono::{DateTime, Utc};
use faultline_common::{CommonError, ErrorClassification, ErrorSeverity};
use thiserror::Error;

/// Configuration validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<ConfigError> for CommonError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Invalid { message } => CommonError::config(message),
        }
    }
}

/// A call was rejected because the breaker for `name` is open
///
/// This says nothing about the request itself; the dependency is currently
/// circuit-broken and the caller should try again after `retry_after`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Circuit breaker is OPEN for '{name}', next attempt at {}", .next_attempt_at.to_rfc3339())]
pub struct CircuitOpenError {
    /// Name of the protected dependency
    pub name: String,
    /// Wall-clock time at which the breaker admits a probe call
    pub next_attempt_at: DateTime<Utc>,
    /// Time left until `next_attempt_at`, measured on the breaker's clock
    pub retry_after: Duration,
}

impl CircuitOpenError {
    /// Identifier used when matching this error against retryable error sets
    pub const CODE: &'static str = "CIRCUIT_OPEN";

    pub fn code(&self) -> &'static str {
        Self::CODE
    }
}

impl ErrorClassification for CircuitOpenError {
    fn is_retryable(&self) -> bool {
        true
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Warning
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        Some(self.retry_after)
    }
}

impl From<CircuitOpenError> for CommonError {
    fn from(err: CircuitOpenError) -> Self {
        CommonError::circuit_breaker_with_retry(err.name, err.retry_after)
    }
}

/// Outcome of a failed [`CircuitBreaker::execute`](crate::CircuitBreaker::execute)
///
/// `Operation` carries the operation's own error untouched, so callers can
/// tell a rejection apart from a real failure of the dependency.
#[derive(Debug, Error)]
pub enum BreakerError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The breaker rejected the call without invoking the operation
    #[error(transparent)]
    Open(#[from] CircuitOpenError),

    /// The operation ran and failed
    #[error(transparent)]
    Operation(E),
}

impl<E> BreakerError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// True if the call was rejected by an open breaker
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// The operation error, if the operation actually ran
    pub fn as_operation(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Open(_) => None,
        }
    }

    /// Consume into the operation error, if the operation actually ran
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Open(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn open_error() -> CircuitOpenError {
        CircuitOpenError {
            name: "payments".to_string(),
            next_attempt_at: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
            retry_after: Duration::from_secs(42),
        }
    }

    #[test]
    fn test_circuit_open_error_display_and_code() {
        let err = open_error();
        assert_eq!(
            err.to_string(),
            "Circuit breaker is OPEN for 'payments', next attempt at 2023-11-14T22:13:20+00:00"
        );
        assert_eq!(err.code(), "CIRCUIT_OPEN");
    }

    /// Validates the classification of an open-circuit rejection.
    ///
    /// Assertions:
    /// - Ensures it is retryable in the general "try later" sense.
    /// - Confirms the retry hint equals the remaining cooldown.
    #[test]
    fn test_circuit_open_error_classification() {
        let err = open_error();
        assert!(err.is_retryable());
        assert!(!err.is_critical());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));
    }

    #[test]
    fn test_circuit_open_error_into_common() {
        let common: CommonError = open_error().into();
        assert!(matches!(
            common,
            CommonError::CircuitBreakerOpen { ref service, retry_after: Some(_) } if service == "payments"
        ));
    }

    #[test]
    fn test_breaker_error_accessors() {
        let rejected: BreakerError<std::io::Error> = open_error().into();
        assert!(rejected.is_open());
        assert!(rejected.as_operation().is_none());

        let failed: BreakerError<std::io::Error> =
            BreakerError::Operation(std::io::Error::other("smtp 421"));
        assert!(!failed.is_open());
        assert_eq!(failed.to_string(), "smtp 421");
        assert_eq!(failed.into_operation().map(|e| e.to_string()), Some("smtp 421".to_string()));
    }

    #[test]
    fn test_config_error_into_common() {
        let common: CommonError = ConfigError::invalid("success_threshold must be > 0").into();
        assert!(matches!(common, CommonError::Config { .. }));
    }
}
