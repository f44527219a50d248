/*!
 * Warden - tamper-evident auditing and resilient calls
 *
 * Ties together:
 * - A hash-chained, append-only audit ledger with encryption at rest
 * - Retry with exponential backoff, circuit breakers and fallbacks for
 *   calls into unreliable backends
 * - TOML configuration with environment overrides
 * - Structured logging
 */

pub mod cli_style;
pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-export commonly used types
pub use config::{AppConfig, BreakerSettings, LogLevel, LoggingConfig, RetrySettings};
pub use error::{Result, WardenError};
pub use runtime::Warden;

pub use warden_core_ledger as ledger;
pub use warden_core_resilience as resilience;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
