//! Circuit breaker state machine
//!
//! A breaker guards one downstream dependency. While `Closed` it lets calls
//! through and counts failures inside a sliding window of length
//! `monitoring_period`. Once enough calls have been observed
//! (`volume_threshold`) and the window holds `failure_threshold` failures,
//! the breaker opens and rejects calls until `timeout` has passed. The first
//! call after the cooldown moves it to `HalfOpen`, where a single failure
//! reopens it and `success_threshold` consecutive successes close it again.
//!
//! All counters live behind one mutex so every transition is decided from a
//! consistent snapshot. The lock is never held while the protected operation
//! runs. Each call remembers the state generation it was admitted under; an
//! outcome that arrives after a state change only updates the last-seen
//! timestamps. Half-open admits every caller that arrives during the probe
//! phase, and the first failure among them reopens the circuit.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use faultline_common::duration_millis;
use faultline_common::time::{Clock, SystemClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{BreakerError, CircuitOpenError, ConfigError, ConfigResult};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, letting calls through to probe recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Name of the protected dependency, unique within a registry
    pub name: String,
    /// Failures inside the monitoring window needed to open the circuit
    pub failure_threshold: u32,
    /// Consecutive half-open successes needed to close the circuit
    pub success_threshold: u32,
    /// Cooldown before an open circuit admits a probe call
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Length of the sliding window in which failures are counted
    #[serde(with = "duration_millis")]
    pub monitoring_period: Duration,
    /// Minimum number of admitted calls before the circuit may open
    pub volume_threshold: u32,
}

impl CircuitBreakerConfig {
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
    pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_MONITORING_PERIOD: Duration = Duration::from_secs(120);
    pub const DEFAULT_VOLUME_THRESHOLD: u32 = 10;

    /// Default configuration for the dependency `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure_threshold: Self::DEFAULT_FAILURE_THRESHOLD,
            success_threshold: Self::DEFAULT_SUCCESS_THRESHOLD,
            timeout: Self::DEFAULT_TIMEOUT,
            monitoring_period: Self::DEFAULT_MONITORING_PERIOD,
            volume_threshold: Self::DEFAULT_VOLUME_THRESHOLD,
        }
    }

    /// Create a configuration builder for the dependency `name`
    pub fn builder(name: impl Into<String>) -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder { config: Self::new(name) }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name must not be empty"));
        }

        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be greater than 0"));
        }

        if self.success_threshold == 0 {
            return Err(ConfigError::invalid("success_threshold must be greater than 0"));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::invalid("timeout must be greater than 0"));
        }

        if self.monitoring_period.is_zero() {
            return Err(ConfigError::invalid("monitoring_period must be greater than 0"));
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn monitoring_period(mut self, period: Duration) -> Self {
        self.config.monitoring_period = period;
        self
    }

    pub fn volume_threshold(mut self, threshold: u32) -> Self {
        self.config.volume_threshold = threshold;
        self
    }

    /// Set a custom clock for the circuit breaker (useful for testing)
    pub fn clock<C: Clock>(self, clock: C) -> CircuitBreakerBuilderWithClock<C> {
        CircuitBreakerBuilderWithClock { config: self.config, clock }
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Builder with custom clock that builds a CircuitBreaker directly
#[derive(Debug)]
pub struct CircuitBreakerBuilderWithClock<C: Clock> {
    config: CircuitBreakerConfig,
    clock: C,
}

impl<C: Clock> CircuitBreakerBuilderWithClock<C> {
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn monitoring_period(mut self, period: Duration) -> Self {
        self.config.monitoring_period = period;
        self
    }

    pub fn volume_threshold(mut self, threshold: u32) -> Self {
        self.config.volume_threshold = threshold;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreaker<C>> {
        CircuitBreaker::with_clock(self.config, self.clock)
    }
}

/// Read-only snapshot of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    /// Failures since the circuit last closed
    pub failures: u64,
    /// Successes since the circuit last closed
    pub successes: u64,
    pub consecutive_failures: u64,
    pub consecutive_successes: u64,
    /// Failures currently inside the monitoring window
    pub window_failures: u64,
    /// Calls admitted to the operation over the breaker's lifetime
    pub total_calls: u64,
    /// Calls rejected while open over the breaker's lifetime
    pub rejected_calls: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    /// When an open circuit will admit its next probe
    pub next_attempt_time: Option<DateTime<Utc>>,
}

impl fmt::Display for CircuitBreakerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] failures={} (window={}) successes={} total_calls={} rejected={}",
            self.name,
            self.state,
            self.failures,
            self.window_failures,
            self.successes,
            self.total_calls,
            self.rejected_calls
        )
    }
}

/// A state change decided inside the critical section, logged after it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
}

/// Mutable breaker state, guarded by a single mutex
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u64,
    successes: u64,
    consecutive_failures: u64,
    consecutive_successes: u64,
    total_calls: u64,
    rejected_calls: u64,
    failure_window: VecDeque<Instant>,
    next_attempt: Option<Instant>,
    next_attempt_at: Option<DateTime<Utc>>,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
    /// Bumped on every state change; outcomes carry the value they were
    /// admitted under
    generation: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_calls: 0,
            rejected_calls: 0,
            failure_window: VecDeque::new(),
            next_attempt: None,
            next_attempt_at: None,
            last_failure_time: None,
            last_success_time: None,
            generation: 0,
        }
    }

    /// Drop window entries older than `period`
    fn prune(&mut self, now: Instant, period: Duration) {
        while let Some(&oldest) = self.failure_window.front() {
            if now.saturating_duration_since(oldest) > period {
                self.failure_window.pop_front();
            } else {
                break;
            }
        }
    }

    fn window_failures(&self, now: Instant, period: Duration) -> u64 {
        self.failure_window.iter().filter(|&&t| now.saturating_duration_since(t) <= period).count()
            as u64
    }

    fn set_state(&mut self, to: CircuitState) -> Option<Transition> {
        let from = self.state;
        if from == to {
            return None;
        }
        self.state = to;
        self.generation += 1;
        Some(Transition { from, to })
    }

    fn open(&mut self, now: Instant, wall: DateTime<Utc>, timeout: Duration) -> Option<Transition> {
        self.next_attempt = Some(now + timeout);
        self.next_attempt_at = Some(wall + chrono_duration(timeout));
        self.consecutive_successes = 0;
        self.set_state(CircuitState::Open)
    }

    /// Clean slate: lifetime totals and last-seen timestamps survive
    fn close(&mut self) -> Option<Transition> {
        self.failures = 0;
        self.successes = 0;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.failure_window.clear();
        self.next_attempt = None;
        self.next_attempt_at = None;
        self.set_state(CircuitState::Closed)
    }
}

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Circuit breaker protecting a single named dependency
///
/// Generic over [`Clock`] so tests can drive cooldowns and the monitoring
/// window with a `MockClock`.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    clock: C,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("failures", &inner.failures)
            .field("total_calls", &inner.total_calls)
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker with the given configuration using system
    /// clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;

        Ok(Self { config, inner: Mutex::new(BreakerState::new()), clock })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn wall_now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.clock.system_time())
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// Returns [`BreakerError::Open`] without invoking `operation` while the
    /// cooldown is running. Otherwise the operation runs and its outcome is
    /// recorded; a failure comes back as [`BreakerError::Operation`] with the
    /// original error.
    #[instrument(skip_all, fields(breaker = %self.config.name))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let admitted = self.try_acquire()?;

        match operation().await {
            Ok(value) => {
                self.on_success(admitted);
                Ok(value)
            }
            Err(error) => {
                debug!(error = %error, "Protected operation failed");
                self.on_failure(admitted);
                Err(BreakerError::Operation(error))
            }
        }
    }

    /// Execute an operation, substituting `fallback` for any failure
    ///
    /// The fallback runs both when the call is rejected by an open circuit and
    /// when the operation itself fails. Bookkeeping happens before the
    /// fallback is invoked.
    pub async fn execute_with_fallback<F, Fut, T, E, FB, FbFut>(
        &self,
        operation: F,
        fallback: FB,
    ) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = T>,
    {
        match self.execute(operation).await {
            Ok(value) => value,
            Err(BreakerError::Open(err)) => {
                debug!(breaker = %self.config.name, retry_after = ?err.retry_after, "Circuit open, using fallback");
                fallback().await
            }
            Err(BreakerError::Operation(err)) => {
                debug!(breaker = %self.config.name, error = %err, "Operation failed, using fallback");
                fallback().await
            }
        }
    }

    /// Admit a call or reject it with [`CircuitOpenError`]
    ///
    /// An open circuit whose cooldown has elapsed moves to half-open and
    /// admits the call. Returns the generation the call was admitted under.
    fn try_acquire(&self) -> Result<u64, CircuitOpenError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let mut transition = None;
        if inner.state == CircuitState::Open {
            match inner.next_attempt {
                Some(next_attempt) if now < next_attempt => {
                    inner.rejected_calls += 1;
                    let err = CircuitOpenError {
                        name: self.config.name.clone(),
                        next_attempt_at: inner.next_attempt_at.unwrap_or_else(|| self.wall_now()),
                        retry_after: next_attempt.saturating_duration_since(now),
                    };
                    drop(inner);
                    debug!(breaker = %self.config.name, retry_after = ?err.retry_after, "Circuit breaker rejecting call");
                    return Err(err);
                }
                _ => {
                    inner.consecutive_successes = 0;
                    inner.consecutive_failures = 0;
                    transition = inner.set_state(CircuitState::HalfOpen);
                }
            }
        }

        inner.total_calls += 1;
        let generation = inner.generation;
        drop(inner);

        if let Some(transition) = transition {
            self.log_transition(transition, "cooldown elapsed, probing dependency");
        }
        Ok(generation)
    }

    fn on_success(&self, admitted: u64) {
        let now = self.clock.now();
        let wall = self.wall_now();
        let mut inner = self.inner.lock();

        inner.last_success_time = Some(wall);
        if admitted != inner.generation {
            let state = inner.state;
            drop(inner);
            debug!(breaker = %self.config.name, state = %state, "Ignoring success admitted before a state change");
            return;
        }

        inner.successes += 1;
        inner.consecutive_successes += 1;
        inner.consecutive_failures = 0;
        inner.prune(now, self.config.monitoring_period);

        let transition = if inner.state == CircuitState::HalfOpen
            && inner.consecutive_successes >= u64::from(self.config.success_threshold)
        {
            inner.close()
        } else {
            None
        };
        let consecutive = inner.consecutive_successes;
        drop(inner);

        if let Some(transition) = transition {
            self.log_transition(transition, "dependency recovered");
        } else {
            debug!(breaker = %self.config.name, consecutive_successes = consecutive, "Recorded success");
        }
    }

    fn on_failure(&self, admitted: u64) {
        let now = self.clock.now();
        let wall = self.wall_now();
        let mut inner = self.inner.lock();

        inner.last_failure_time = Some(wall);
        if admitted != inner.generation {
            let state = inner.state;
            drop(inner);
            debug!(breaker = %self.config.name, state = %state, "Ignoring failure admitted before a state change");
            return;
        }

        inner.failures += 1;
        inner.consecutive_failures += 1;
        inner.consecutive_successes = 0;
        inner.failure_window.push_back(now);
        inner.prune(now, self.config.monitoring_period);

        let window_failures = inner.failure_window.len() as u64;
        let transition = match inner.state {
            CircuitState::HalfOpen => inner.open(now, wall, self.config.timeout),
            CircuitState::Closed
                if inner.total_calls >= u64::from(self.config.volume_threshold)
                    && window_failures >= u64::from(self.config.failure_threshold) =>
            {
                inner.open(now, wall, self.config.timeout)
            }
            _ => None,
        };
        drop(inner);

        match transition {
            Some(t) if t.from == CircuitState::HalfOpen => {
                self.log_transition(t, "probe failed, restarting cooldown");
            }
            Some(t) => self.log_transition(t, "failure threshold reached"),
            None => {
                debug!(breaker = %self.config.name, window_failures, "Recorded failure");
            }
        }
    }

    fn log_transition(&self, transition: Transition, reason: &str) {
        let Transition { from, to } = transition;
        match to {
            CircuitState::Open => warn!(
                breaker = %self.config.name,
                from = %from,
                to = %to,
                timeout_ms = self.config.timeout.as_millis() as u64,
                reason,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => info!(
                breaker = %self.config.name,
                from = %from,
                to = %to,
                reason,
                "Circuit breaker half-open"
            ),
            CircuitState::Closed => info!(
                breaker = %self.config.name,
                from = %from,
                to = %to,
                reason,
                "Circuit breaker closed"
            ),
        }
    }

    /// Get the current state of the circuit breaker
    pub fn get_state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// True iff the circuit is closed
    pub fn is_healthy(&self) -> bool {
        self.get_state() == CircuitState::Closed
    }

    /// Read-only snapshot of the counters
    pub fn get_stats(&self) -> CircuitBreakerStats {
        let now = self.clock.now();
        let inner = self.inner.lock();
        CircuitBreakerStats {
            name: self.config.name.clone(),
            state: inner.state,
            failures: inner.failures,
            successes: inner.successes,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            window_failures: inner.window_failures(now, self.config.monitoring_period),
            total_calls: inner.total_calls,
            rejected_calls: inner.rejected_calls,
            last_failure_time: inner.last_failure_time,
            last_success_time: inner.last_success_time,
            next_attempt_time: inner.next_attempt_at,
        }
    }

    /// Open the circuit now, scheduling the next probe after `timeout`
    pub fn force_open(&self) {
        let now = self.clock.now();
        let wall = self.wall_now();
        let transition = self.inner.lock().open(now, wall, self.config.timeout);
        warn!(breaker = %self.config.name, "Circuit breaker forced open");
        if let Some(transition) = transition {
            self.log_transition(transition, "forced open");
        }
    }

    /// Close the circuit now with the same reset as a natural recovery
    pub fn force_close(&self) {
        let transition = self.inner.lock().close();
        info!(breaker = %self.config.name, "Circuit breaker forced closed");
        if let Some(transition) = transition {
            self.log_transition(transition, "forced closed");
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the breaker state machine
    //!
    //! Tests cover configuration validation, volume and window gating, the
    //! open/half-open/closed cycle, fallbacks and administrative overrides.

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use faultline_common::time::MockClock;
    use tokio::sync::oneshot;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct UpstreamError(&'static str);

    impl fmt::Display for UpstreamError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "upstream error: {}", self.0)
        }
    }

    impl std::error::Error for UpstreamError {}

    fn breaker(clock: &MockClock) -> CircuitBreaker<MockClock> {
        CircuitBreakerConfig::builder("sms")
            .failure_threshold(3)
            .success_threshold(2)
            .volume_threshold(3)
            .timeout(Duration::from_millis(1000))
            .monitoring_period(Duration::from_millis(5000))
            .clock(clock.clone())
            .build()
            .expect("valid breaker config")
    }

    async fn fail(cb: &CircuitBreaker<MockClock>) -> Result<(), BreakerError<UpstreamError>> {
        cb.execute(|| async { Err::<(), _>(UpstreamError("503")) }).await
    }

    async fn succeed(cb: &CircuitBreaker<MockClock>) -> Result<u32, BreakerError<UpstreamError>> {
        cb.execute(|| async { Ok::<_, UpstreamError>(7) }).await
    }

    // =========================================================================
    // Config Tests
    // =========================================================================

    /// Validates `CircuitState` display and serialization names.
    ///
    /// Assertions:
    /// - Confirms `CircuitState::HalfOpen.to_string()` equals `"HALF_OPEN"`.
    /// - Confirms the JSON form matches the display form.
    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
        assert_eq!(serde_json::to_string(&CircuitState::HalfOpen).unwrap(), "\"HALF_OPEN\"");
    }

    #[test]
    fn test_config_defaults() {
        let config = CircuitBreakerConfig::new("email");
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.success_threshold, 2);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.monitoring_period, Duration::from_secs(120));
        assert_eq!(config.volume_threshold, 10);
        assert!(config.validate().is_ok());
    }

    /// Validates the circuit breaker config validation scenario.
    ///
    /// Assertions:
    /// - Ensures each invalid field produces a `ConfigError::Invalid` naming
    ///   it.
    #[test]
    fn test_config_validation() {
        let cases = [
            (CircuitBreakerConfig::builder("").build(), "name"),
            (CircuitBreakerConfig::builder("a").failure_threshold(0).build(), "failure_threshold"),
            (CircuitBreakerConfig::builder("a").success_threshold(0).build(), "success_threshold"),
            (CircuitBreakerConfig::builder("a").timeout(Duration::ZERO).build(), "timeout"),
            (
                CircuitBreakerConfig::builder("a").monitoring_period(Duration::ZERO).build(),
                "monitoring_period",
            ),
        ];

        for (result, field) in cases {
            match result {
                Err(ConfigError::Invalid { message }) => {
                    assert!(message.contains(field), "{message} should mention {field}")
                }
                Ok(config) => panic!("expected {field} to be rejected, got {config:?}"),
            }
        }
    }

    #[test]
    fn test_config_serde_uses_millis() {
        let config = CircuitBreakerConfig::builder("storage")
            .timeout(Duration::from_millis(1500))
            .build()
            .unwrap();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["timeout"], 1500);
        assert_eq!(json["monitoring_period"], 120_000);
    }

    // =========================================================================
    // State Machine Tests
    // =========================================================================

    /// Validates that the circuit never opens below the volume threshold.
    ///
    /// Assertions:
    /// - Confirms the state stays `Closed` after `V - 1` failures even though
    ///   the failure threshold is lower.
    #[tokio::test]
    async fn test_volume_threshold_blocks_opening() {
        let clock = MockClock::new();
        let cb = CircuitBreakerConfig::builder("push")
            .failure_threshold(2)
            .volume_threshold(5)
            .clock(clock.clone())
            .build()
            .unwrap();

        for _ in 0..4 {
            assert!(cb.execute(|| async { Err::<(), _>(UpstreamError("x")) }).await.is_err());
        }
        assert_eq!(cb.get_state(), CircuitState::Closed);

        let _ = cb.execute(|| async { Err::<(), _>(UpstreamError("x")) }).await;
        assert_eq!(cb.get_state(), CircuitState::Open);
    }

    /// Validates the open transition and the fast rejection that follows.
    ///
    /// Assertions:
    /// - Confirms the breaker is `Open` after three failures.
    /// - Ensures the next call is rejected without invoking the operation.
    /// - Confirms the rejection reports the remaining cooldown.
    #[tokio::test]
    async fn test_opens_and_rejects_without_invoking() {
        let clock = MockClock::new();
        let cb = breaker(&clock);

        for _ in 0..3 {
            assert!(matches!(fail(&cb).await, Err(BreakerError::Operation(_))));
        }
        assert_eq!(cb.get_state(), CircuitState::Open);
        assert!(!cb.is_healthy());

        clock.advance_millis(400);
        let invoked = AtomicU32::new(0);
        let result = cb
            .execute(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, UpstreamError>(())
            })
            .await;

        match result {
            Err(BreakerError::Open(err)) => {
                assert_eq!(err.name, "sms");
                assert_eq!(err.retry_after, Duration::from_millis(600));
            }
            other => panic!("expected open rejection, got {other:?}"),
        }
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        let stats = cb.get_stats();
        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.rejected_calls, 1);
        assert!(stats.next_attempt_time.is_some());
    }

    /// Validates that failures older than the monitoring period stop counting.
    ///
    /// Assertions:
    /// - Confirms the breaker is still `Closed` after `F - 1` stale failures
    ///   and one fresh failure.
    #[tokio::test]
    async fn test_stale_failures_do_not_count() {
        let clock = MockClock::new();
        let cb = breaker(&clock);

        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        clock.advance_millis(5001);
        let _ = fail(&cb).await;

        assert_eq!(cb.get_state(), CircuitState::Closed);
        let stats = cb.get_stats();
        assert_eq!(stats.failures, 3);
        assert_eq!(stats.window_failures, 1);
    }

    #[tokio::test]
    async fn test_window_boundary_is_inclusive() {
        let clock = MockClock::new();
        let cb = breaker(&clock);

        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        clock.advance_millis(5000);
        let _ = fail(&cb).await;

        assert_eq!(cb.get_state(), CircuitState::Open);
    }

    /// Validates the half-open probe cycle.
    ///
    /// Assertions:
    /// - Confirms the first call after the cooldown runs and leaves the
    ///   breaker `HalfOpen`.
    /// - Confirms the second consecutive success closes it and clears the
    ///   failure counters.
    #[tokio::test]
    async fn test_half_open_closes_after_success_threshold() {
        let clock = MockClock::new();
        let cb = breaker(&clock);
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }

        clock.advance_millis(1100);
        assert_eq!(succeed(&cb).await.unwrap(), 7);
        assert_eq!(cb.get_state(), CircuitState::HalfOpen);

        assert_eq!(succeed(&cb).await.unwrap(), 7);
        let stats = cb.get_stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.window_failures, 0);
        assert_eq!(stats.next_attempt_time, None);
        assert_eq!(stats.total_calls, 5);
        assert!(stats.last_failure_time.is_some());
    }

    /// Validates that one half-open failure reopens with a fresh cooldown.
    ///
    /// Assertions:
    /// - Confirms the breaker is `Open` right after the failed probe.
    /// - Ensures a call 999ms later is still rejected.
    /// - Ensures a call 1000ms later is admitted.
    #[tokio::test]
    async fn test_half_open_failure_reopens_with_new_cooldown() {
        let clock = MockClock::new();
        let cb = breaker(&clock);
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }

        clock.advance_millis(1000);
        assert!(matches!(fail(&cb).await, Err(BreakerError::Operation(_))));
        assert_eq!(cb.get_state(), CircuitState::Open);

        clock.advance_millis(999);
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open(_))));

        clock.advance_millis(1);
        assert!(succeed(&cb).await.is_ok());
        assert_eq!(cb.get_state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_consecutive_counters_are_exclusive() {
        let clock = MockClock::new();
        let cb = breaker(&clock);

        let _ = succeed(&cb).await;
        let _ = succeed(&cb).await;
        let _ = fail(&cb).await;
        let stats = cb.get_stats();
        assert_eq!(stats.consecutive_failures, 1);
        assert_eq!(stats.consecutive_successes, 0);

        let _ = succeed(&cb).await;
        let stats = cb.get_stats();
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.consecutive_successes, 1);
    }

    // =========================================================================
    // Fallback and Override Tests
    // =========================================================================

    #[tokio::test]
    async fn test_fallback_on_operation_failure() {
        let clock = MockClock::new();
        let cb = breaker(&clock);

        let value = cb
            .execute_with_fallback(
                || async { Err::<&str, _>(UpstreamError("timeout")) },
                || async { "queued" },
            )
            .await;

        assert_eq!(value, "queued");
        assert_eq!(cb.get_stats().failures, 1);
    }

    /// Validates that a rejection routes to the fallback.
    ///
    /// Assertions:
    /// - Confirms the fallback value is returned.
    /// - Ensures the operation was not invoked.
    #[tokio::test]
    async fn test_fallback_on_open_circuit() {
        let clock = MockClock::new();
        let cb = breaker(&clock);
        cb.force_open();

        let invoked = AtomicU32::new(0);
        let value = cb
            .execute_with_fallback(
                || async {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, UpstreamError>("sent")
                },
                || async { "cached" },
            )
            .await;

        assert_eq!(value, "cached");
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_force_open_schedules_cooldown() {
        let clock = MockClock::new();
        let cb = breaker(&clock);

        cb.force_open();
        assert_eq!(cb.get_state(), CircuitState::Open);
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open(_))));

        clock.advance_millis(1000);
        assert!(succeed(&cb).await.is_ok());
        assert_eq!(cb.get_state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_force_close_resets_window() {
        let clock = MockClock::new();
        let cb = breaker(&clock);
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }

        cb.force_close();
        let stats = cb.get_stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.window_failures, 0);
        assert_eq!(stats.total_calls, 3);

        // A fresh failure must not re-open on stale window entries.
        let _ = fail(&cb).await;
        assert_eq!(cb.get_state(), CircuitState::Closed);
    }

    /// Validates that concurrent callers never lose counter updates.
    ///
    /// Assertions:
    /// - Confirms `total_calls` equals the number of spawned calls.
    /// - Confirms successes plus failures equal the number of calls.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_keep_counters_consistent() {
        let cb = Arc::new(
            CircuitBreakerConfig::builder("storage")
                .failure_threshold(1000)
                .volume_threshold(1000)
                .clock(MockClock::new())
                .build()
                .unwrap(),
        );

        let handles: Vec<_> = (0..64u32)
            .map(|i| {
                let cb = Arc::clone(&cb);
                tokio::spawn(async move {
                    cb.execute(|| async move {
                        if i % 4 == 0 {
                            Err(UpstreamError("flaky"))
                        } else {
                            Ok(i)
                        }
                    })
                    .await
                })
            })
            .collect();
        for handle in handles {
            let _ = handle.await.unwrap();
        }

        let stats = cb.get_stats();
        assert_eq!(stats.total_calls, 64);
        assert_eq!(stats.failures, 16);
        assert_eq!(stats.successes, 48);
        assert_eq!(stats.state, CircuitState::Closed);
    }

    /// Call whose outcome is decided later through `rx`
    async fn held_call(
        cb: &CircuitBreaker<MockClock>,
        rx: oneshot::Receiver<Result<u32, UpstreamError>>,
    ) -> Result<u32, BreakerError<UpstreamError>> {
        cb.execute(|| async move { rx.await.unwrap_or(Err(UpstreamError("sender dropped"))) }).await
    }

    /// Validates that a success admitted before the circuit opened cannot
    /// shorten the half-open phase.
    ///
    /// Assertions:
    /// - Ensures the late success leaves `consecutive_successes` at zero.
    /// - Ensures one half-open success does not close the circuit.
    /// - Confirms the second half-open success closes it.
    #[tokio::test]
    async fn test_late_success_while_open_is_not_counted() {
        let clock = MockClock::new();
        let cb = breaker(&clock);
        let (tx, rx) = oneshot::channel();

        let held = held_call(&cb, rx);
        tokio::pin!(held);
        assert!(futures::poll!(held.as_mut()).is_pending());

        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.get_state(), CircuitState::Open);

        tx.send(Ok(7)).unwrap();
        assert_eq!(held.await.unwrap(), 7);
        let stats = cb.get_stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.consecutive_successes, 0);
        assert_eq!(stats.successes, 0);
        assert!(stats.last_success_time.is_some());

        clock.advance_millis(1100);
        succeed(&cb).await.unwrap();
        assert_eq!(cb.get_state(), CircuitState::HalfOpen);
        succeed(&cb).await.unwrap();
        assert_eq!(cb.get_state(), CircuitState::Closed);
    }

    /// Validates that a failure admitted while closed does not reopen a
    /// half-open circuit.
    ///
    /// Assertions:
    /// - Confirms the circuit stays half-open with its probe success intact.
    /// - Confirms the failure counter ignores the late failure.
    #[tokio::test]
    async fn test_late_failure_while_half_open_is_not_counted() {
        let clock = MockClock::new();
        let cb = breaker(&clock);
        let (tx, rx) = oneshot::channel();

        let held = held_call(&cb, rx);
        tokio::pin!(held);
        assert!(futures::poll!(held.as_mut()).is_pending());

        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        clock.advance_millis(1100);
        succeed(&cb).await.unwrap();
        assert_eq!(cb.get_state(), CircuitState::HalfOpen);

        tx.send(Err(UpstreamError("gateway timeout"))).unwrap();
        assert!(matches!(held.await, Err(BreakerError::Operation(_))));

        let stats = cb.get_stats();
        assert_eq!(stats.state, CircuitState::HalfOpen);
        assert_eq!(stats.consecutive_successes, 1);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.failures, 3);
        assert!(stats.last_failure_time.is_some());

        succeed(&cb).await.unwrap();
        assert_eq!(cb.get_state(), CircuitState::Closed);
    }

    /// Validates concurrent half-open probes.
    ///
    /// Assertions:
    /// - Ensures every caller arriving after the cooldown is admitted.
    /// - Ensures the first probe failure reopens the circuit.
    /// - Ensures a probe success arriving after the reopen is ignored.
    #[tokio::test]
    async fn test_half_open_admits_concurrent_probes() {
        let clock = MockClock::new();
        let cb = breaker(&clock);
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        clock.advance_millis(1100);

        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        let first = held_call(&cb, first_rx);
        let second = held_call(&cb, second_rx);
        tokio::pin!(first, second);
        assert!(futures::poll!(first.as_mut()).is_pending());
        assert!(futures::poll!(second.as_mut()).is_pending());

        let stats = cb.get_stats();
        assert_eq!(stats.state, CircuitState::HalfOpen);
        assert_eq!(stats.total_calls, 5);
        assert_eq!(stats.rejected_calls, 0);

        first_tx.send(Err(UpstreamError("503"))).unwrap();
        assert!(first.await.is_err());
        assert_eq!(cb.get_state(), CircuitState::Open);

        second_tx.send(Ok(1)).unwrap();
        assert_eq!(second.await.unwrap(), 1);
        assert_eq!(cb.get_state(), CircuitState::Open);
        assert_eq!(cb.get_stats().consecutive_successes, 0);
    }

    #[test]
    fn test_stats_display() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::new("email")).unwrap();
        let line = cb.get_stats().to_string();
        assert!(line.starts_with("email [CLOSED]"));
    }
}
