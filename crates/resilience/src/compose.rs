//! Retry through a circuit breaker
//!
//! Every attempt of the retry loop goes through [`CircuitBreaker::execute`],
//! so each failure is counted by the breaker and an open breaker cuts the loop
//! short. A rejection is only retried when the config lists
//! [`CircuitOpenError::CODE`](crate::CircuitOpenError::CODE).

use std::error::Error;
use std::future::Future;

use faultline_common::time::Clock;

use crate::circuit_breaker::CircuitBreaker;
use crate::error::BreakerError;
use crate::retry::{RetryConfig, RetryExecutor, RetryResult, RetrySpan};

impl<C: Clock> RetryExecutor<C> {
    /// Retry `operation`, sending every attempt through `breaker`
    ///
    /// Operation errors are classified by `config` as in
    /// [`run`](Self::run). A [`BreakerError::Open`] rejection ends the loop as
    /// [`RetryError::NonRetryable`](crate::RetryError::NonRetryable) unless
    /// `CIRCUIT_OPEN` is listed in `config.retryable_errors`.
    pub async fn run_with_circuit_breaker<F, Fut, T, E, BC>(
        &self,
        operation: F,
        breaker: &CircuitBreaker<BC>,
        config: &RetryConfig,
    ) -> RetryResult<T, BreakerError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + Send + Sync + 'static,
        BC: Clock,
    {
        let span = RetrySpan::start(config.operation_name(), config.max_attempts);
        let operation = &operation;

        let should_retry = |error: &BreakerError<E>| match error {
            BreakerError::Open(open) => {
                let retry = config.is_retryable_error(open);
                if !retry {
                    span.record_circuit_open(&open.name, open.retry_after);
                }
                retry
            }
            BreakerError::Operation(e) => config.is_retryable_error(e),
        };

        self.run_loop(move || breaker.execute(operation), should_retry, config, &span).await
    }
}
