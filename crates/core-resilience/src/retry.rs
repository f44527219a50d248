//! Retry with exponential backoff
//!
//! `Retry` re-invokes a fallible async operation until it succeeds or the
//! attempt budget is spent. The delay before attempt `n + 1` is
//! `initial_delay * backoff_multiplier^(n - 1)`; growth is unbounded, so
//! callers that need a ceiling bound `max_attempts` instead.
//!
//! Every retry is reported through `tracing` with the attempt number and the
//! cause. Retry never talks to the ledger directly.

use crate::error::ResilienceError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one (minimum 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Factor applied to the delay after each retry (>= 1.0)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

type Classifier<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Retry policy for operations failing with `E`
///
/// # Example
/// ```no_run
/// use warden_core_resilience::{ResilienceError, Retry, RetryConfig};
///
/// # async fn example() -> Result<u32, ResilienceError<std::io::Error>> {
/// let retry = Retry::new(RetryConfig::default())
///     .named("graph_store")
///     .retry_when(|e: &std::io::Error| e.kind() == std::io::ErrorKind::ConnectionRefused);
///
/// retry
///     .run(|| async { Ok::<_, ResilienceError<std::io::Error>>(7) })
///     .await
/// # }
/// ```
pub struct Retry<E> {
    config: RetryConfig,
    name: String,
    retry_if: Option<Classifier<E>>,
}

impl<E> Clone for Retry<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            name: self.name.clone(),
            retry_if: self.retry_if.clone(),
        }
    }
}

impl<E> fmt::Debug for Retry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

impl<E: fmt::Display> Retry<E> {
    /// Create a retry policy that treats every operation error as retryable
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            name: "operation".to_string(),
            retry_if: None,
        }
    }

    /// Label used in log output
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Restrict retries to operation errors matching `predicate`
    ///
    /// Non-matching errors propagate immediately and do not consume budget.
    /// Timeouts are always retryable; open circuits, cancellations and
    /// already-exhausted inner retries never are.
    pub fn retry_when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether `error` should be retried under this policy
    pub fn is_retryable(&self, error: &ResilienceError<E>) -> bool {
        match error {
            ResilienceError::Operation(e) => self.retry_if.as_ref().map_or(true, |f| f(e)),
            ResilienceError::TimedOut { .. } => true,
            ResilienceError::RetriesExhausted { .. }
            | ResilienceError::CircuitOpen { .. }
            | ResilienceError::Cancelled { .. } => false,
        }
    }

    /// Run `op` until it succeeds or the attempt budget is exhausted
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
    {
        self.run_inner(op, None).await
    }

    /// Like [`Retry::run`], but stops early when `token` is cancelled
    ///
    /// Cancellation is checked before each attempt and while sleeping between
    /// attempts. A cancelled retry is a terminal failure
    /// (`ResilienceError::Cancelled`), never a silent success.
    pub async fn run_cancellable<T, F, Fut>(
        &self,
        op: F,
        token: &CancellationToken,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
    {
        self.run_inner(op, Some(token)).await
    }

    async fn run_inner<T, F, Fut>(
        &self,
        mut op: F,
        token: Option<&CancellationToken>,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.initial_delay;
        let mut attempt = 0;

        loop {
            if token.is_some_and(|t| t.is_cancelled()) {
                return Err(ResilienceError::Cancelled { attempts: attempt });
            }

            attempt += 1;

            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !self.is_retryable(&e) => return Err(e),
                Err(e) => e,
            };

            if attempt >= max_attempts {
                tracing::error!(
                    operation = %self.name,
                    max_attempts,
                    error = %error,
                    "max retry attempts exceeded"
                );
                return Err(ResilienceError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            tracing::warn!(
                operation = %self.name,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after failure"
            );

            match token {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            return Err(ResilienceError::Cancelled { attempts: attempt });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }

            delay = next_delay(delay, self.config.backoff_multiplier);
        }
    }
}

/// Multiply `delay` by `multiplier`, saturating instead of panicking
fn next_delay(delay: Duration, multiplier: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * multiplier.max(1.0)).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Unavailable,
        BadRequest,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_is_invoked_max_attempts_times() {
        let retry = Retry::new(config(4));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = retry
            .run(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ResilienceError::Operation(TestError::Unavailable))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(ResilienceError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last.operation(), Some(&TestError::Unavailable));
            }
            other => panic!("Expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_attempt_k_stops_retrying() {
        let retry = Retry::new(config(5));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let result = retry
            .run(move || {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(ResilienceError::Operation(TestError::Unavailable))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_performs_no_retries() {
        let retry = Retry::new(config(1));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let start = Instant::now();
        let result: Result<(), _> = retry
            .run(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ResilienceError::Operation(TestError::Unavailable))
                }
            })
            .await;

        assert!(result.unwrap_err().is_exhausted());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_propagates_immediately() {
        let retry = Retry::<TestError>::new(config(5)).retry_when(|e| *e == TestError::Unavailable);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = retry
            .run(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ResilienceError::Operation(TestError::BadRequest))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(ResilienceError::Operation(TestError::BadRequest))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_exponentially() {
        let retry = Retry::new(config(4));
        let start = Instant::now();

        let _: Result<(), _> = retry
            .run(|| async { Err(ResilienceError::Operation(TestError::Unavailable)) })
            .await;

        // 100ms + 200ms + 400ms between the four attempts
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_is_not_retried() {
        let retry: Retry<TestError> = Retry::new(config(3));
        let result: Result<(), _> = retry
            .run(|| async {
                Err(ResilienceError::CircuitOpen {
                    name: "graph_store".to_string(),
                })
            })
            .await;

        assert!(result.unwrap_err().is_circuit_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_is_terminal_failure() {
        let retry = Retry::new(RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_secs(60),
            backoff_multiplier: 1.0,
        });
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(90)).await;
            canceller.cancel();
        });

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = retry
            .run_cancellable(
                move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(ResilienceError::Operation(TestError::Unavailable))
                    }
                },
                &token,
            )
            .await;

        // Attempts at t=0 and t=60; cancelled while sleeping towards t=120
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            result,
            Err(ResilienceError::Cancelled { attempts: 2 })
        ));
    }

    #[tokio::test]
    async fn test_already_cancelled_token_makes_no_attempt() {
        let retry = Retry::new(config(3));
        let token = CancellationToken::new();
        token.cancel();

        let result: Result<(), ResilienceError<TestError>> =
            retry.run_cancellable(|| async { Ok(()) }, &token).await;

        assert!(matches!(
            result,
            Err(ResilienceError::Cancelled { attempts: 0 })
        ));
    }

    #[test]
    fn test_next_delay_saturates() {
        assert_eq!(
            next_delay(Duration::from_millis(100), 2.0),
            Duration::from_millis(200)
        );
        assert_eq!(next_delay(Duration::MAX, 10.0), Duration::MAX);
    }
}
