//! Name-keyed registry of circuit breakers
//!
//! Call sites protecting the same dependency fetch the breaker by name and
//! therefore share its health. The registry is an ordinary value owned by the
//! application's composition root; there is no process-global instance.

use crate::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

/// Overall health derived from all registered breakers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// At least one breaker is Open
    Degraded,
}

/// Health of every registered breaker
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub breakers: BTreeMap<String, BreakerSnapshot>,
}

/// Shared registry of named circuit breakers
#[derive(Debug, Clone, Default)]
pub struct BreakerRegistry {
    breakers: Arc<RwLock<HashMap<String, CircuitBreaker>>>,
    default_config: CircuitBreakerConfig,
}

impl BreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: Arc::new(RwLock::new(HashMap::new())),
            default_config,
        }
    }

    /// Get the breaker called `name`, creating it with the default config
    pub fn breaker(&self, name: &str) -> CircuitBreaker {
        self.get_or_insert(name, self.default_config.clone())
    }

    /// Get the breaker called `name`, creating it with `config` if missing
    ///
    /// An existing breaker keeps the configuration it was created with.
    pub fn get_or_insert(&self, name: &str, config: CircuitBreakerConfig) -> CircuitBreaker {
        if let Some(existing) = self.get(name) {
            return existing;
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(breaker = name, "registering circuit breaker");
                CircuitBreaker::new(name, config)
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Force the named breaker back to Closed; false if no such breaker
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn health(&self) -> HealthReport {
        let breakers: BTreeMap<String, BreakerSnapshot> = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.snapshot()))
            .collect();

        let status = if breakers.values().any(|b| b.state == CircuitState::Open) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport { status, breakers }
    }
}
