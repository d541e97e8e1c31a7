//! Retry with exponential backoff and full jitter
//!
//! [`RetryExecutor`] runs an async operation up to `max_attempts` times,
//! sleeping `min(initial_delay * multiplier^(attempt - 1), max_delay)` between
//! attempts, or a uniform draw below that when jitter is on. Errors are
//! classified before every retry; anything not retryable ends the loop at
//! once.

pub mod classify;
pub mod config;
pub mod constants;
pub mod error;
pub mod executor;
pub mod presets;
pub mod tracing;
pub mod wrapper;

pub use classify::{io_error_code, is_retryable_error};
pub use config::{RetryConfig, RetryConfigBuilder, RetryHook};
pub use error::{RetryError, RetryOutcome, RetryResult};
pub use executor::RetryExecutor;
pub use presets::RetryPresets;
pub use self::tracing::RetrySpan;
pub use wrapper::Retryable;
