// Retry executor with exponential backoff and full jitter
use std::error::Error;
use std::future::Future;
use std::time::Duration;

use faultline_common::time::{Clock, SystemClock};
use futures::future::join_all;
use rand::Rng;
use tracing::instrument;

use crate::retry::config::RetryConfig;
use crate::retry::constants::MAX_BACKOFF_EXPONENT;
use crate::retry::error::{RetryError, RetryOutcome, RetryResult};
use crate::retry::tracing::RetrySpan;

/// Runs operations in a retry loop, sleeping on its [`Clock`] between attempts
///
/// The executor itself is stateless apart from the clock; every call takes the
/// [`RetryConfig`] to apply, so one executor can serve many call sites.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor<C: Clock = SystemClock> {
    clock: C,
}

impl RetryExecutor<SystemClock> {
    pub fn new() -> Self {
        Self { clock: SystemClock }
    }
}

impl<C: Clock> RetryExecutor<C> {
    /// Create an executor that sleeps on a custom clock (useful for testing)
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Delay before the attempt following `attempt`, without jitter
    ///
    /// `min(initial_delay * multiplier^(attempt - 1), max_delay)`
    pub fn exponential_delay(attempt: u32, config: &RetryConfig) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let initial_ns = config.initial_delay.as_nanos() as f64;
        let max_ns = config.max_delay.as_nanos() as f64;

        let delay_ns = (initial_ns * config.backoff_multiplier.powi(exponent as i32)).min(max_ns);
        Duration::from_nanos(delay_ns.max(0.0) as u64)
    }

    /// Delay to sleep after the 1-based `attempt` failed
    ///
    /// With jitter enabled the delay is drawn uniformly from
    /// `[0, exponential_delay]`.
    pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
        let exponential = Self::exponential_delay(attempt, config);
        if !config.jitter {
            return exponential;
        }

        let max_ns = u64::try_from(exponential.as_nanos()).unwrap_or(u64::MAX);
        Duration::from_nanos(rand::thread_rng().gen_range(0..=max_ns))
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// runs out of attempts
    ///
    /// Retryability follows [`RetryConfig::is_retryable_error`].
    pub async fn run<F, Fut, T, E>(&self, operation: F, config: &RetryConfig) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + Send + Sync + 'static,
    {
        self.run_with_predicate(operation, |error: &E| config.is_retryable_error(error), config)
            .await
    }

    /// Same loop as [`run`](Self::run) with the caller deciding retryability
    #[instrument(skip_all, fields(operation = %config.operation_name()))]
    pub async fn run_with_predicate<F, Fut, T, E, P>(
        &self,
        operation: F,
        should_retry: P,
        config: &RetryConfig,
    ) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + Send + Sync + 'static,
        P: Fn(&E) -> bool,
    {
        let span = RetrySpan::start(config.operation_name(), config.max_attempts);
        self.run_loop(operation, should_retry, config, &span).await
    }

    pub(crate) async fn run_loop<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        should_retry: P,
        config: &RetryConfig,
        span: &RetrySpan,
    ) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + Send + Sync + 'static,
        P: Fn(&E) -> bool,
    {
        config.validate()?;

        let mut total_delay = Duration::ZERO;
        let mut attempt = 0;

        loop {
            attempt += 1;
            span.record_attempt(attempt);

            let error = match operation().await {
                Ok(value) => {
                    span.record_success(attempt, total_delay);
                    return Ok(RetryOutcome { value, attempts: attempt, total_delay });
                }
                Err(error) => error,
            };

            if !should_retry(&error) {
                span.record_non_retryable(attempt, &error);
                return Err(RetryError::NonRetryable(error));
            }

            if attempt >= config.max_attempts {
                span.record_exhausted(&error, total_delay);
                return Err(RetryError::Exhausted { attempts: attempt, last_error: error });
            }

            let delay = Self::calculate_delay(attempt, config);
            span.record_failure(attempt, &error, delay);
            if let Some(hook) = &config.on_retry {
                hook(&error, attempt, delay);
            }

            self.clock.sleep(delay).await;
            total_delay += delay;
        }
    }

    /// Race the whole retry loop against `timeout`
    ///
    /// The deadline bounds waiting only; an in-flight attempt is dropped, not
    /// cancelled downstream.
    pub async fn run_with_timeout<F, Fut, T, E>(
        &self,
        operation: F,
        config: &RetryConfig,
        timeout: Duration,
    ) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + Send + Sync + 'static,
    {
        match tokio::time::timeout(timeout, self.run(operation, config)).await {
            Ok(result) => result,
            Err(_) => {
                RetrySpan::start(config.operation_name(), config.max_attempts)
                    .record_timeout(timeout);
                Err(RetryError::TimedOut { timeout })
            }
        }
    }

    /// Run every operation concurrently with one shared config
    ///
    /// Results come back in input order.
    pub async fn run_batch<I, F, Fut, T, E>(
        &self,
        operations: I,
        config: &RetryConfig,
    ) -> Vec<RetryResult<T, E>>
    where
        I: IntoIterator<Item = F>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + Send + Sync + 'static,
    {
        join_all(operations.into_iter().map(|operation| self.run(operation, config))).await
    }
}
