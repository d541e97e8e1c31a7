//! Structured log events for one retry loop
//!
//! Uses the `tracing` crate directly; each [`RetrySpan`] tags its events with
//! the operation label and the attempt budget.

use std::time::Duration;

use tracing::{debug, error, info, warn};

/// Log events for a single run of the retry loop
#[derive(Debug)]
pub struct RetrySpan {
    operation_name: String,
    max_attempts: u32,
}

impl RetrySpan {
    /// Start a retry span
    pub fn start(operation_name: &str, max_attempts: u32) -> Self {
        debug!(operation = operation_name, max_attempts, "Starting retry operation");

        Self { operation_name: operation_name.to_string(), max_attempts }
    }

    /// Record an attempt about to run
    pub fn record_attempt(&self, attempt: u32) {
        debug!(
            operation = %self.operation_name,
            attempt,
            max_attempts = self.max_attempts,
            "Retry attempt"
        );
    }

    /// Record a retryable failure and the delay before the next attempt
    pub fn record_failure(&self, attempt: u32, error: &dyn std::error::Error, delay: Duration) {
        warn!(
            operation = %self.operation_name,
            attempt,
            max_attempts = self.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retry attempt failed, backing off"
        );
    }

    /// Record a failure that ends the loop without retrying
    pub fn record_non_retryable(&self, attempt: u32, error: &dyn std::error::Error) {
        warn!(
            operation = %self.operation_name,
            attempt,
            error = %error,
            "Non-retryable error, giving up"
        );
    }

    /// Record a successful attempt
    pub fn record_success(&self, attempts: u32, total_delay: Duration) {
        if attempts > 1 {
            info!(
                operation = %self.operation_name,
                attempts,
                total_delay_ms = total_delay.as_millis() as u64,
                "Retry operation succeeded"
            );
        } else {
            debug!(operation = %self.operation_name, "Operation succeeded on first attempt");
        }
    }

    /// Record that all attempts have been exhausted
    pub fn record_exhausted(&self, error: &dyn std::error::Error, total_delay: Duration) {
        error!(
            operation = %self.operation_name,
            max_attempts = self.max_attempts,
            total_delay_ms = total_delay.as_millis() as u64,
            error = %error,
            "All retry attempts exhausted"
        );
    }

    /// Record timeout
    pub fn record_timeout(&self, timeout: Duration) {
        warn!(
            operation = %self.operation_name,
            timeout_ms = timeout.as_millis() as u64,
            "Retry operation timed out"
        );
    }

    /// Record a rejection by an open circuit breaker
    pub fn record_circuit_open(&self, breaker: &str, retry_after: Duration) {
        warn!(
            operation = %self.operation_name,
            breaker,
            retry_after_ms = retry_after.as_millis() as u64,
            "Circuit breaker is open, aborting retry"
        );
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }
}
