//! Deadline wrapper for a single protected call

use crate::error::ResilienceError;
use std::future::Future;
use std::time::Duration;

/// Fail with [`ResilienceError::TimedOut`] if `fut` does not finish within `after`
///
/// The timed-out future is dropped. Retry treats timeouts as retryable and
/// the circuit breaker counts them as failures.
pub async fn with_timeout<T, E, F>(after: Duration, fut: F) -> Result<T, ResilienceError<E>>
where
    F: Future<Output = Result<T, ResilienceError<E>>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_ms = after.as_millis() as u64, "operation timed out");
            Err(ResilienceError::TimedOut { after })
        }
    }
}
