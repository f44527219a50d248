/*!
 * Composition root
 *
 * `Warden` owns the one ledger and the one breaker registry of the process
 * and hands them to whatever needs them. The core crates stay independent:
 * this is the only place where a protected call's outcome is written to the
 * ledger.
 */

use serde_json::json;
use std::fmt;
use std::future::Future;
use tracing::{info, warn};
use warden_core_ledger::{flush_blocking, EventLedger, FlushTask};
use warden_core_resilience::{
    fallback, with_timeout, BreakerRegistry, CircuitBreaker, HealthReport, ResilienceError, Retry,
};

use crate::config::AppConfig;
use crate::error::Result;

/// Event type recorded when a substitute result is served
pub const FALLBACK_EVENT: &str = "FALLBACK_ACTIVATED";

/// Actor recorded for events written by the resilience layer
pub const RESILIENCE_ACTOR: &str = "resilience";

/// Process-wide services, explicitly constructed and passed around
#[derive(Debug)]
pub struct Warden {
    config: AppConfig,
    ledger: EventLedger,
    breakers: BreakerRegistry,
    flusher: Option<FlushTask>,
}

impl Warden {
    /// Open the ledger and register the configured breakers
    ///
    /// No background flushing; callers flush explicitly or use [`Warden::start`].
    pub fn open(config: AppConfig) -> Result<Self> {
        let ledger = EventLedger::open(config.ledger.clone())?;
        let breakers = BreakerRegistry::new(config.default_breaker.to_breaker_config());
        for (name, settings) in &config.breakers {
            breakers.get_or_insert(name, settings.to_breaker_config());
        }

        Ok(Self {
            config,
            ledger,
            breakers,
            flusher: None,
        })
    }

    /// Like [`Warden::open`], plus the periodic flush task
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: AppConfig) -> Result<Self> {
        let mut warden = Self::open(config)?;
        warden.flusher = Some(FlushTask::spawn(warden.ledger.clone()));
        info!(
            storage = %warden.ledger.storage_path().display(),
            breakers = warden.breakers.names().len(),
            "Warden started"
        );
        Ok(warden)
    }

    /// Stop background work and persist everything still pending
    pub async fn shutdown(self) -> bool {
        let flushed = match self.flusher {
            Some(flusher) => flusher.shutdown().await,
            None => {
                let ledger = self.ledger.clone();
                tokio::task::spawn_blocking(move || ledger.flush())
                    .await
                    .unwrap_or(false)
            }
        };
        info!(flushed, "Warden stopped");
        flushed
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn ledger(&self) -> &EventLedger {
        &self.ledger
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Breaker shared by every call site protecting `dependency`
    pub fn breaker(&self, dependency: &str) -> CircuitBreaker {
        self.breakers
            .get_or_insert(dependency, self.config.breaker_config(dependency))
    }

    /// Configured retry policy, retrying every operation error
    pub fn retry_policy<E: fmt::Display>(&self, dependency: &str) -> Retry<E> {
        Retry::new(self.config.retry.to_retry_config()).named(dependency)
    }

    pub fn health(&self) -> HealthReport {
        self.breakers.health()
    }

    /// Call `op` through the dependency's breaker and the default retry policy
    pub async fn protected<T, E, F, Fut>(
        &self,
        dependency: &str,
        op: F,
    ) -> std::result::Result<T, ResilienceError<E>>
    where
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let retry = self.retry_policy(dependency);
        self.protected_with(dependency, &retry, op).await
    }

    /// Call `op` as `breaker(retry(timeout(op)))` with a caller-supplied retry policy
    pub async fn protected_with<T, E, F, Fut>(
        &self,
        dependency: &str,
        retry: &Retry<E>,
        mut op: F,
    ) -> std::result::Result<T, ResilienceError<E>>
    where
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let attempt_timeout = self.config.retry.attempt_timeout();
        let attempt = move || {
            let pending = op();
            async move {
                let attempt = async move { pending.await.map_err(ResilienceError::Operation) };
                match attempt_timeout {
                    Some(after) => with_timeout(after, attempt).await,
                    None => attempt.await,
                }
            }
        };

        self.breaker(dependency).call(|| retry.run(attempt)).await
    }

    /// Protected call that never fails: on terminal failure the substitute
    /// is returned and a fallback event is written to the ledger
    pub async fn protected_or<T, E, F, Fut, S, SF>(&self, dependency: &str, op: F, substitute: S) -> T
    where
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        S: FnOnce() -> SF,
        SF: Future<Output = T>,
    {
        fallback(
            || async {
                let result = self.protected(dependency, op).await;
                if let Err(e) = &result {
                    self.record_fallback(dependency, e).await;
                }
                result
            },
            substitute,
        )
        .await
    }

    /// Size-triggered flushes run on the blocking pool, not on this task
    async fn record_fallback<E: fmt::Display>(&self, dependency: &str, error: &ResilienceError<E>) {
        let breaker = self.breaker(dependency);
        warn!(dependency, error = %error, "Serving degraded result");
        let (_, flush_due) = self.ledger.append(
            FALLBACK_EVENT,
            json!({
                "dependency": dependency,
                "error": error.to_string(),
                "circuit_state": breaker.state().to_string(),
                "circuit_open": error.is_circuit_open(),
            }),
            Some(RESILIENCE_ACTOR),
        );
        if flush_due {
            flush_blocking(&self.ledger).await;
        }
    }
}
