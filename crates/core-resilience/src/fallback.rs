//! Fallback: substitute result when the primary fails
//!
//! Fallback is the outermost safety net. It never retries the primary and
//! does not look at the error kind; any failure yields the substitute's
//! result. The conventional stack is
//! `fallback(breaker(retry(operation)), substitute)`.

use std::fmt;
use std::future::Future;

/// Run `primary`; on any error, run `substitute` and return its value instead
///
/// # Example
/// ```no_run
/// use warden_core_resilience::{fallback, ResilienceError};
///
/// # async fn example() {
/// let value = fallback(
///     || async { Err::<&str, _>(ResilienceError::Operation("connection refused")) },
///     || async { "in-memory stand-in" },
/// )
/// .await;
/// assert_eq!(value, "in-memory stand-in");
/// # }
/// ```
pub async fn fallback<T, E, P, PF, S, SF>(primary: P, substitute: S) -> T
where
    E: fmt::Display,
    P: FnOnce() -> PF,
    PF: Future<Output = Result<T, E>>,
    S: FnOnce() -> SF,
    SF: Future<Output = T>,
{
    match primary().await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "primary operation failed, using fallback");
            substitute().await
        }
    }
}

/// Reusable fallback wrapper holding the substitute
///
/// Useful when the same degraded result is offered at several call sites.
#[derive(Debug, Clone)]
pub struct Fallback<S> {
    name: String,
    substitute: S,
}

impl<S> Fallback<S> {
    pub fn new(name: impl Into<String>, substitute: S) -> Self {
        Self {
            name: name.into(),
            substitute,
        }
    }

    /// Run `primary`, falling back to the stored substitute on error
    pub async fn call<T, E, P, PF, SF>(&self, primary: P) -> T
    where
        E: fmt::Display,
        S: Fn() -> SF,
        P: FnOnce() -> PF,
        PF: Future<Output = Result<T, E>>,
        SF: Future<Output = T>,
    {
        match primary().await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(operation = %self.name, error = %e, "primary operation failed, using fallback");
                (self.substitute)().await
            }
        }
    }
}
