// Retry configuration and builder
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::retry::classify;
use crate::retry::constants::*;

/// Callback invoked before each retry sleep with the failed attempt's error,
/// its 1-based attempt number and the delay about to be slept
pub type RetryHook = Arc<dyn Fn(&dyn Error, u32, Duration) + Send + Sync>;

/// Configuration for one retry loop
///
/// Immutable once built. Cloning is cheap; the hook is shared.
#[derive(Clone)]
pub struct RetryConfig {
    /// Total attempts including the first call
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,
    /// Draw each delay uniformly from zero to the exponential delay
    pub jitter: bool,
    /// Identifiers treated as retryable; empty selects the default set
    pub retryable_errors: Vec<String>,
    /// Hook called before each retry sleep
    pub on_retry: Option<RetryHook>,
    /// Label attached to log events
    pub operation: Option<String>,
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("jitter", &self.jitter)
            .field("retryable_errors", &self.retryable_errors)
            .field("on_retry", &self.on_retry.as_ref().map(|_| "<function>"))
            .field("operation", &self.operation)
            .finish()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: true,
            retryable_errors: Vec::new(),
            on_retry: None,
            operation: None,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts < MIN_MAX_ATTEMPTS {
            return Err(ConfigError::invalid(format!(
                "max_attempts must be at least {MIN_MAX_ATTEMPTS}, got {}",
                self.max_attempts
            )));
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(format!(
                "backoff_multiplier must be at least 1.0, got {}",
                self.backoff_multiplier
            )));
        }

        if self.initial_delay > self.max_delay {
            return Err(ConfigError::invalid(format!(
                "initial_delay ({:?}) cannot be greater than max_delay ({:?})",
                self.initial_delay, self.max_delay
            )));
        }

        Ok(())
    }

    /// Classify `error` against this config's retryable set
    pub fn is_retryable_error(&self, error: &(dyn Error + 'static)) -> bool {
        classify::is_retryable_error(error, &self.retryable_errors)
    }

    /// Label used in log events
    pub fn operation_name(&self) -> &str {
        self.operation.as_deref().unwrap_or(UNNAMED_OPERATION)
    }
}

/// Builder for RetryConfig
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.backoff_multiplier = multiplier;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.jitter = enabled;
        self
    }

    pub fn no_jitter(self) -> Self {
        self.jitter(false)
    }

    /// Replace the retryable identifier list
    pub fn retryable_errors<I, S>(mut self, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.retryable_errors = identifiers.into_iter().map(Into::into).collect();
        self
    }

    /// Append one retryable identifier
    pub fn retry_on(mut self, identifier: impl Into<String>) -> Self {
        self.config.retryable_errors.push(identifier.into());
        self
    }

    pub fn on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&dyn Error, u32, Duration) + Send + Sync + 'static,
    {
        self.config.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn operation(mut self, name: impl Into<String>) -> Self {
        self.config.operation = Some(name.into());
        self
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
