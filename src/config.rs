/*!
 * Configuration types for Warden
 *
 * One TOML file configures the ledger, logging and the resilience layer.
 * Durations are written as plain seconds or milliseconds so the file stays
 * readable; they are converted into the core crates' typed configs here.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use warden_core_ledger::LedgerConfig;
use warden_core_resilience::{CircuitBreakerConfig, RetryConfig};

use crate::error::{Result, WardenError};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Event ledger persistence
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Diagnostic logging
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Retry policy for protected calls
    #[serde(default)]
    pub retry: RetrySettings,

    /// Breaker settings for dependencies without their own entry
    #[serde(default)]
    pub default_breaker: BreakerSettings,

    /// Per-dependency breaker settings, keyed by dependency name
    #[serde(default)]
    pub breakers: BTreeMap<String, BreakerSettings>,
}

impl AppConfig {
    /// Load configuration from a TOML file
    ///
    /// A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load, apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.ledger.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(WardenError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        let multiplier = self.retry.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(WardenError::Config(format!(
                "retry.backoff_multiplier must be >= 1.0, got {}",
                multiplier
            )));
        }

        let named = self.breakers.iter().map(|(name, b)| (name.as_str(), b));
        for (name, breaker) in std::iter::once(("default_breaker", &self.default_breaker)).chain(named) {
            if breaker.failure_threshold == 0 {
                return Err(WardenError::Config(format!(
                    "breaker '{}': failure_threshold must be at least 1",
                    name
                )));
            }
        }

        self.ledger
            .validate()
            .map_err(|e| WardenError::Config(e.to_string()))
    }

    /// Breaker config for `name`, falling back to `default_breaker`
    pub fn breaker_config(&self, name: &str) -> CircuitBreakerConfig {
        self.breakers
            .get(name)
            .unwrap_or(&self.default_breaker)
            .to_breaker_config()
    }
}

/// Retry policy as written in TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Per-attempt timeout in milliseconds (unbounded when unset)
    #[serde(default)]
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            attempt_timeout_ms: None,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }
}

/// Circuit breaker settings as written in TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds an open breaker waits before admitting a probe
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
        }
    }
}

impl BreakerSettings {
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
        }
    }
}

/// Diagnostic logging settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum level (overridden by `RUST_LOG`)
    #[serde(default)]
    pub level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Shorthand for level = debug
    #[serde(default)]
    pub verbose: bool,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_secs() -> u64 {
    60
}
