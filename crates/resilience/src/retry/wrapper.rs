// Higher-order retry wrapper
use std::error::Error;
use std::future::Future;

use faultline_common::time::{Clock, SystemClock};

use crate::retry::config::RetryConfig;
use crate::retry::error::RetryResult;
use crate::retry::executor::RetryExecutor;

/// An operation bound to the retry policy it always runs under
///
/// Build one per call site and invoke it like a function:
///
/// ```
/// use std::io;
/// use std::time::Duration;
///
/// use faultline_resilience::{RetryConfig, Retryable};
///
/// # tokio_test::block_on(async {
/// let config = RetryConfig::builder()
///     .max_attempts(2)
///     .initial_delay(Duration::from_millis(1))
///     .build()
///     .unwrap();
/// let fetch = Retryable::new(config, |id: u32| async move { Ok::<_, io::Error>(id * 2) });
///
/// let outcome = fetch.call_with(21).await.unwrap();
/// assert_eq!(outcome.value, 42);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Retryable<F, C: Clock = SystemClock> {
    executor: RetryExecutor<C>,
    config: RetryConfig,
    operation: F,
}

impl<F> Retryable<F> {
    pub fn new(config: RetryConfig, operation: F) -> Self {
        Self { executor: RetryExecutor::new(), config, operation }
    }
}

impl<F, C: Clock> Retryable<F, C> {
    pub fn with_executor(executor: RetryExecutor<C>, config: RetryConfig, operation: F) -> Self {
        Self { executor, config, operation }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run the bound operation under the retry loop
    pub async fn call<Fut, T, E>(&self) -> RetryResult<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + Send + Sync + 'static,
    {
        self.executor.run(&self.operation, &self.config).await
    }

    /// Run the bound operation with `arg`, cloned into every attempt
    pub async fn call_with<A, Fut, T, E>(&self, arg: A) -> RetryResult<T, E>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + Send + Sync + 'static,
    {
        self.executor.run(|| (self.operation)(arg.clone()), &self.config).await
    }
}
