//! Fault tolerance for calls to unreliable downstream dependencies.
//!
//! # Components
//!
//! - [`CircuitBreaker`]: per-dependency state machine that stops calling a
//!   failing dependency and probes it again after a cooldown
//! - [`CircuitBreakerRegistry`]: one breaker per dependency name, with
//!   aggregate stats and a health report
//! - [`RetryExecutor`]: retry loop with exponential backoff, full jitter and
//!   error classification; [`RetryPresets`] and [`Retryable`] build on it
//! - [`RetryExecutor::run_with_circuit_breaker`]: every retry attempt goes
//!   through a breaker
//! - [`settings`]: breaker and retry defaults from the environment or a file
//!
//! # Example
//!
//! ```
//! use std::io;
//! use std::time::Duration;
//!
//! use faultline_resilience::{
//!     CircuitBreakerConfig, CircuitBreakerRegistry, RetryConfig, RetryExecutor,
//! };
//!
//! # tokio_test::block_on(async {
//! let registry = CircuitBreakerRegistry::new();
//! let breaker = registry.get_or_create(CircuitBreakerConfig::new("email")).unwrap();
//! let config = RetryConfig::builder()
//!     .max_attempts(3)
//!     .initial_delay(Duration::from_millis(1))
//!     .build()
//!     .unwrap();
//!
//! let outcome = RetryExecutor::new()
//!     .run_with_circuit_breaker(|| async { Ok::<_, io::Error>("sent") }, &breaker, &config)
//!     .await
//!     .unwrap();
//!
//! assert_eq!(outcome.value, "sent");
//! assert!(registry.is_all_healthy());
//! # });
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod circuit_breaker;
pub mod compose;
pub mod error;
pub mod registry;
pub mod retry;
pub mod settings;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerBuilderWithClock, CircuitBreakerConfig,
    CircuitBreakerConfigBuilder, CircuitBreakerStats, CircuitState,
};
pub use error::{BreakerError, CircuitOpenError, ConfigError, ConfigResult};
pub use registry::{BreakerHealthReport, CircuitBreakerRegistry, HealthStatus};
pub use retry::{
    is_retryable_error, RetryConfig, RetryConfigBuilder, RetryError, RetryExecutor, RetryHook,
    RetryOutcome, RetryPresets, RetryResult, Retryable,
};
pub use settings::{ResilienceSettings, SettingsError, SettingsResult};

// Clock types breakers and executors are generic over
pub use faultline_common::time::{Clock, MockClock, SystemClock};
