//! Warden Core Resilience: Pure-logic call protection primitives
//!
//! # Overview
//!
//! This crate provides building blocks for calling unreliable external
//! backends (a graph database, an LLM API) without letting their outages
//! cascade into the caller. It includes:
//!
//! - **Retry**: Re-invokes a failing operation with exponential backoff
//! - **Circuit Breaker**: Fails fast once a dependency is unhealthy
//! - **Breaker Registry**: Name-keyed breakers shared across call sites, with health reporting
//! - **Fallback**: Returns a degraded substitute when everything inside it failed
//! - **Timeout**: Bounds how long a single call may take
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - The audit ledger (callers record outcomes themselves)
//! - Business semantics of the protected call (only success or failure matters)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Your Application                │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Fallback                          │  ← Degraded result, never fails
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Circuit Breaker                   │  ← Fail-fast protection
//! │  (Closed → Open → HalfOpen probe)       │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Retry                             │  ← Absorb transient blips
//! │  (Exponential backoff, attempt budget)  │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!         External Service
//!       (Graph store, LLM API)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use warden_core_resilience::{
//!     fallback, BreakerRegistry, CircuitBreakerConfig, ResilienceError, Retry, RetryConfig,
//! };
//!
//! # async fn connect() -> Result<&'static str, std::io::Error> { Ok("live") }
//! # async fn example() {
//! let registry = BreakerRegistry::new(CircuitBreakerConfig::default());
//! let breaker = registry.breaker("graph_store");
//! let retry = Retry::new(RetryConfig::default()).named("graph_store");
//!
//! let store = fallback(
//!     || breaker.call(|| retry.run(|| async { connect().await.map_err(ResilienceError::Operation) })),
//!     || async { "in-memory stand-in" },
//! )
//! .await;
//! # let _ = store;
//! # }
//! ```

pub mod circuit_breaker;
pub mod error;
pub mod fallback;
pub mod registry;
pub mod retry;
pub mod timeout;

// Re-export main types for convenience
pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::ResilienceError;
pub use fallback::{fallback, Fallback};
pub use registry::{BreakerRegistry, HealthReport, HealthStatus};
pub use retry::{Retry, RetryConfig};
pub use timeout::with_timeout;

pub use tokio_util::sync::CancellationToken;

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use warden_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use super::error::ResilienceError;
    pub use super::fallback::{fallback, Fallback};
    pub use super::registry::{BreakerRegistry, HealthStatus};
    pub use super::retry::{Retry, RetryConfig};
    pub use super::timeout::with_timeout;
}
