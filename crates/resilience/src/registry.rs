//! Named circuit breakers, one per downstream dependency
//!
//! The registry is an explicit value: build one at startup, share it behind
//! an `Arc`, and look breakers up by dependency name. The first registration
//! of a name fixes its configuration for the life of the registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use faultline_common::time::{Clock, SystemClock};
use serde::Serialize;
use tracing::{info, warn};

use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
};
use crate::error::ConfigResult;

/// Registry of circuit breakers keyed by dependency name
pub struct CircuitBreakerRegistry<C: Clock + Clone = SystemClock> {
    breakers: DashMap<String, Arc<CircuitBreaker<C>>>,
    clock: C,
}

impl<C: Clock + Clone> fmt::Debug for CircuitBreakerRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry").field("names", &self.names()).finish()
    }
}

impl Default for CircuitBreakerRegistry<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerRegistry<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<C: Clock + Clone> CircuitBreakerRegistry<C> {
    /// Registry whose breakers all read time from `clock`
    pub fn with_clock(clock: C) -> Self {
        Self { breakers: DashMap::new(), clock }
    }

    /// Breaker for `config.name`, created on first use
    ///
    /// A later call with a different configuration for the same name keeps
    /// the original breaker and logs a warning.
    pub fn get_or_create(&self, config: CircuitBreakerConfig) -> ConfigResult<Arc<CircuitBreaker<C>>> {
        let (breaker, created) = match self.breakers.entry(config.name.clone()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let breaker = Arc::new(CircuitBreaker::with_clock(config.clone(), self.clock.clone())?);
                entry.insert(Arc::clone(&breaker));
                (breaker, true)
            }
        };

        if created {
            info!(
                breaker = %config.name,
                failure_threshold = config.failure_threshold,
                volume_threshold = config.volume_threshold,
                timeout_ms = config.timeout.as_millis() as u64,
                "Registered circuit breaker"
            );
        } else if breaker.config() != &config {
            warn!(
                breaker = %config.name,
                existing = ?breaker.config(),
                requested = ?config,
                "Circuit breaker already registered with a different configuration, keeping the original"
            );
        }

        Ok(breaker)
    }

    /// Breaker registered under `name`, if any
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker<C>>> {
        self.breakers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Stats snapshot of every breaker, keyed by name
    pub fn get_all_stats(&self) -> BTreeMap<String, CircuitBreakerStats> {
        self.breakers.iter().map(|entry| (entry.key().clone(), entry.value().get_stats())).collect()
    }

    /// True iff every registered breaker is closed
    pub fn is_all_healthy(&self) -> bool {
        self.breakers.iter().all(|entry| entry.value().is_healthy())
    }

    /// Summary for health endpoints
    ///
    /// The report is degraded while any breaker is open. Half-open breakers
    /// are probing and do not degrade it.
    pub fn health_report(&self) -> BreakerHealthReport {
        let stats = self.get_all_stats();
        let open_breakers: Vec<String> = stats
            .values()
            .filter(|s| s.state == CircuitState::Open)
            .map(|s| s.name.clone())
            .collect();

        let status =
            if open_breakers.is_empty() { HealthStatus::Healthy } else { HealthStatus::Degraded };

        if status == HealthStatus::Degraded {
            warn!(open_breakers = ?open_breakers, "Circuit breakers open, service degraded");
        }

        BreakerHealthReport { status, breaker_count: stats.len(), open_breakers, stats }
    }
}

/// Aggregate breaker health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
        }
    }
}

/// Health of every registered breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerHealthReport {
    pub status: HealthStatus,
    pub breaker_count: usize,
    /// Names of open breakers, sorted
    pub open_breakers: Vec<String>,
    pub stats: BTreeMap<String, CircuitBreakerStats>,
}

impl BreakerHealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
