//! Error type shared by every resilience layer
//!
//! `ResilienceError<E>` wraps the error type `E` of the protected operation.
//! Layers compose by accepting operations that already return
//! `Result<T, ResilienceError<E>>`, so `fallback(breaker(retry(op)))` keeps a
//! single flat error type from the innermost call to the outermost wrapper.

use std::time::Duration;
use thiserror::Error;

/// Errors produced by (or passed through) the resilience layers
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    /// The protected operation itself failed
    #[error("operation failed: {0}")]
    Operation(E),

    /// Retry budget exhausted; carries the last underlying failure
    #[error("max attempts ({attempts}) exceeded: {}", inner(.last))]
    RetriesExhausted {
        attempts: u32,
        last: Box<ResilienceError<E>>,
    },

    /// The circuit breaker is open and the call was not attempted
    #[error("circuit '{name}' is open")]
    CircuitOpen { name: String },

    /// A cancellable retry was cancelled before it could succeed
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// The operation did not complete within its deadline
    #[error("timed out after {after:?}")]
    TimedOut { after: Duration },
}

/// Result alias for protected calls
pub type Result<T, E> = std::result::Result<T, ResilienceError<E>>;

impl<E> ResilienceError<E> {
    /// Returns true if this is a fast-fail from an open circuit
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    /// Returns true if a retry loop gave up on this call
    pub fn is_exhausted(&self) -> bool {
        matches!(self, ResilienceError::RetriesExhausted { .. })
    }

    /// The innermost operation error, looking through exhausted retries
    pub fn operation(&self) -> Option<&E> {
        match self {
            ResilienceError::Operation(e) => Some(e),
            ResilienceError::RetriesExhausted { last, .. } => last.operation(),
            _ => None,
        }
    }

    /// Consume the error, yielding the innermost operation error if any
    pub fn into_operation(self) -> Option<E> {
        match self {
            ResilienceError::Operation(e) => Some(e),
            ResilienceError::RetriesExhausted { last, .. } => last.into_operation(),
            _ => None,
        }
    }
}

// Boxed errors are formatted through a plain reference so the derived
// `Display` only requires `E: Display`.
fn inner<E>(last: &ResilienceError<E>) -> &ResilienceError<E> {
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_looks_through_exhaustion() {
        let err: ResilienceError<&str> = ResilienceError::RetriesExhausted {
            attempts: 3,
            last: Box::new(ResilienceError::Operation("connection refused")),
        };

        assert!(err.is_exhausted());
        assert_eq!(err.operation(), Some(&"connection refused"));
        assert_eq!(err.into_operation(), Some("connection refused"));
    }

    #[test]
    fn test_display_messages() {
        let open: ResilienceError<String> = ResilienceError::CircuitOpen {
            name: "graph_store".to_string(),
        };
        assert_eq!(open.to_string(), "circuit 'graph_store' is open");
        assert!(open.is_circuit_open());
        assert!(open.operation().is_none());

        let exhausted: ResilienceError<String> = ResilienceError::RetriesExhausted {
            attempts: 2,
            last: Box::new(ResilienceError::Operation("boom".to_string())),
        };
        assert_eq!(
            exhausted.to_string(),
            "max attempts (2) exceeded: operation failed: boom"
        );
    }

    #[test]
    fn test_derived_error_impl() {
        let cancelled: ResilienceError<String> = ResilienceError::Cancelled { attempts: 2 };
        let err: &dyn std::error::Error = &cancelled;
        assert_eq!(err.to_string(), "cancelled after 2 attempt(s)");
        assert!(err.source().is_none());

        let timed_out: ResilienceError<String> = ResilienceError::TimedOut {
            after: Duration::from_millis(500),
        };
        assert_eq!(timed_out.to_string(), "timed out after 500ms");
    }
}
