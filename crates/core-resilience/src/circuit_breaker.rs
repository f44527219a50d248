//! Circuit Breaker implementation for fault tolerance
//!
//! The circuit breaker prevents cascading failures by failing fast when a
//! dependency is experiencing issues. It has three states:
//! - Closed: Normal operation, calls pass through
//! - Open: Dependency is unhealthy, calls fail immediately
//! - HalfOpen: A single probe call tests whether the dependency recovered
//!
//! Transitions happen only on the call path. An Open breaker whose
//! `recovery_timeout` has elapsed since the last failure moves to HalfOpen
//! when the next call arrives, and that same call becomes the probe.

use crate::error::ResilienceError;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, calls pass through normally
    Closed,
    /// Circuit is open, calls fail immediately
    Open,
    /// Circuit is half-open, one probe call is allowed through
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
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive counted failures before opening the circuit
    pub failure_threshold: u32,
    /// Time since the last failure after which an Open circuit admits a probe
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// Point-in-time view of a breaker, used for health reporting
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Time elapsed since the most recent counted failure
    pub since_last_failure: Option<Duration>,
}

/// Internal state of the circuit breaker
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    /// Consecutive counted failures
    failure_count: u32,
    last_failure: Option<Instant>,
    /// Set while the single HalfOpen probe is running
    probe_in_flight: bool,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            probe_in_flight: false,
        }
    }
}

/// How a call was admitted through the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

/// Named circuit breaker protecting one dependency
///
/// Clones share state, so every call site holding a clone (or fetching the
/// breaker from a [`BreakerRegistry`](crate::BreakerRegistry) by name) sees
/// the same health.
///
/// # Example
/// ```no_run
/// use warden_core_resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceError};
///
/// # async fn example() -> Result<(), ResilienceError<String>> {
/// let breaker = CircuitBreaker::new("graph_store", CircuitBreakerConfig::default());
///
/// let result = breaker
///     .call(|| async { Ok::<_, ResilienceError<String>>(42) })
///     .await?;
/// assert_eq!(result, 42);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<BreakerState>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: Arc::from(name.into()),
            config: Arc::new(config),
            state: Arc::new(Mutex::new(BreakerState::new())),
        }
    }

    /// Create a new circuit breaker with default configuration
    pub fn new_default(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Get current consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.lock();
        BreakerSnapshot {
            name: self.name.to_string(),
            state: state.state,
            failure_count: state.failure_count,
            since_last_failure: state.last_failure.map(|at| at.elapsed()),
        }
    }

    /// Force the breaker back to Closed (operational recovery)
    pub fn reset(&self) {
        let mut state = self.lock();
        *state = BreakerState::new();
        tracing::info!(breaker = %self.name, "circuit manually reset to CLOSED");
    }

    /// Execute `op` under breaker protection, counting every failure
    ///
    /// Open-circuit and cancellation errors coming out of `op` (from a nested
    /// breaker or retry) are never counted.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
    {
        self.call_counting(|_: &E| true, op).await
    }

    /// Execute `op`, counting only failures whose operation error matches
    /// `is_failure`
    ///
    /// Non-matching errors propagate unchanged and leave the breaker state
    /// untouched. Timeouts always count.
    pub async fn call_counting<T, E, P, F, Fut>(
        &self,
        is_failure: P,
        op: F,
    ) -> Result<T, ResilienceError<E>>
    where
        P: Fn(&E) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
    {
        let admission = self.admit::<E>()?;
        let probe = ProbeGuard {
            breaker: self,
            armed: admission == Admission::Probe,
        };

        let result = op().await;
        probe.disarm();

        match &result {
            Ok(_) => self.on_success(admission),
            Err(e) if counts_as_failure(e, &is_failure) => self.on_failure(admission),
            Err(_) => self.on_ignored(admission),
        }

        result
    }

    /// Check circuit state and decide whether this call may proceed
    fn admit<E>(&self) -> Result<Admission, ResilienceError<E>> {
        let mut state = self.lock();

        match state.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let recovered = state
                    .last_failure
                    .map_or(true, |at| at.elapsed() > self.config.recovery_timeout);

                if recovered {
                    tracing::info!(
                        breaker = %self.name,
                        from = %CircuitState::Open,
                        to = %CircuitState::HalfOpen,
                        "circuit transitioning"
                    );
                    state.state = CircuitState::HalfOpen;
                    state.probe_in_flight = true;
                    Ok(Admission::Probe)
                } else {
                    tracing::warn!(breaker = %self.name, "circuit is OPEN, fast-failing call");
                    Err(self.open_error())
                }
            }
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    tracing::debug!(breaker = %self.name, "probe already in flight, fast-failing call");
                    Err(self.open_error())
                } else {
                    state.probe_in_flight = true;
                    Ok(Admission::Probe)
                }
            }
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut state = self.lock();

        match state.state {
            CircuitState::Closed => {
                state.failure_count = 0;
            }
            CircuitState::HalfOpen if admission == Admission::Probe => {
                tracing::info!(
                    breaker = %self.name,
                    from = %CircuitState::HalfOpen,
                    to = %CircuitState::Closed,
                    "circuit transitioning"
                );
                state.state = CircuitState::Closed;
                state.failure_count = 0;
                state.probe_in_flight = false;
            }
            // A call admitted before the circuit opened; it does not close it
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn on_failure(&self, admission: Admission) {
        let mut state = self.lock();
        state.last_failure = Some(Instant::now());
        state.failure_count = state.failure_count.saturating_add(1);

        match state.state {
            CircuitState::Closed => {
                if state.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        breaker = %self.name,
                        from = %CircuitState::Closed,
                        to = %CircuitState::Open,
                        failures = state.failure_count,
                        "circuit transitioning"
                    );
                    state.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen if admission == Admission::Probe => {
                tracing::warn!(
                    breaker = %self.name,
                    from = %CircuitState::HalfOpen,
                    to = %CircuitState::Open,
                    "circuit transitioning after failed probe"
                );
                state.state = CircuitState::Open;
                state.probe_in_flight = false;
            }
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn on_ignored(&self, admission: Admission) {
        if admission == Admission::Probe {
            self.lock().probe_in_flight = false;
        }
    }

    fn open_error<E>(&self) -> ResilienceError<E> {
        ResilienceError::CircuitOpen {
            name: self.name.to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the HalfOpen probe slot if the probe future is dropped mid-call
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl ProbeGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.lock().probe_in_flight = false;
        }
    }
}

fn counts_as_failure<E, P>(error: &ResilienceError<E>, is_failure: &P) -> bool
where
    P: Fn(&E) -> bool,
{
    match error {
        ResilienceError::Operation(e) => is_failure(e),
        ResilienceError::RetriesExhausted { last, .. } => counts_as_failure(last, is_failure),
        ResilienceError::TimedOut { .. } => true,
        ResilienceError::CircuitOpen { .. } | ResilienceError::Cancelled { .. } => false,
    }
}
