/*!
 * Configuration for the event ledger
 */

use crate::cipher::EncryptionKey;
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding `storage_path`
pub const ENV_STORAGE_PATH: &str = "AUDIT_LOG_PATH";

/// Environment variable supplying `encryption_key`
pub const ENV_ENCRYPTION_KEY: &str = "AUDIT_ENCRYPTION_KEY";

/// Ledger persistence and flushing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Directory holding persisted units
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    /// Encrypt units at rest
    #[serde(default)]
    pub encryption_enabled: bool,

    /// Secret the encryption key is derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<EncryptionKey>,

    /// Flush once this many events are waiting to be persisted
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Seconds between periodic flushes
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Keep at most this many persisted units (all when unset)
    #[serde(default)]
    pub retention_units: Option<usize>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            encryption_enabled: false,
            encryption_key: None,
            flush_threshold: default_flush_threshold(),
            flush_interval_secs: default_flush_interval_secs(),
            retention_units: None,
        }
    }
}

impl LedgerConfig {
    /// Config rooted at `storage_path` with all other settings defaulted
    pub fn with_storage_path(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            ..Self::default()
        }
    }

    /// Enable encryption with the given secret
    pub fn encrypted(mut self, secret: impl Into<String>) -> Self {
        self.encryption_enabled = true;
        self.encryption_key = Some(EncryptionKey::new(secret));
        self
    }

    /// Apply `AUDIT_LOG_PATH` and `AUDIT_ENCRYPTION_KEY` if set
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var(ENV_STORAGE_PATH) {
            if !path.is_empty() {
                self.storage_path = PathBuf::from(path);
            }
        }
        if let Ok(secret) = std::env::var(ENV_ENCRYPTION_KEY) {
            if !secret.is_empty() {
                self.encryption_key = Some(EncryptionKey::new(secret));
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.flush_threshold == 0 {
            return Err(LedgerError::Config(
                "flush_threshold must be at least 1".to_string(),
            ));
        }
        if self.flush_interval_secs == 0 {
            return Err(LedgerError::Config(
                "flush_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.retention_units == Some(0) {
            return Err(LedgerError::Config(
                "retention_units must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// The key to encrypt with, if encryption is enabled and a key is present
    pub fn active_key(&self) -> Option<&EncryptionKey> {
        if !self.encryption_enabled {
            return None;
        }
        self.encryption_key.as_ref().filter(|key| !key.is_empty())
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("audit_logs")
}

fn default_flush_threshold() -> usize {
    100
}

fn default_flush_interval_secs() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.storage_path, PathBuf::from("audit_logs"));
        assert!(!config.encryption_enabled);
        assert_eq!(config.flush_threshold, 100);
        assert_eq!(config.flush_interval(), Duration::from_secs(300));
        assert_eq!(config.retention_units, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: LedgerConfig = serde_json::from_str(r#"{"encryption_enabled": true}"#).unwrap();
        assert!(config.encryption_enabled);
        assert_eq!(config.flush_threshold, 100);
        assert_eq!(config.active_key(), None);
    }

    #[test]
    fn test_active_key_requires_enabled_and_non_empty() {
        let config = LedgerConfig::default().encrypted("secret");
        assert!(config.active_key().is_some());

        let mut disabled = config.clone();
        disabled.encryption_enabled = false;
        assert!(disabled.active_key().is_none());

        let empty = LedgerConfig::default().encrypted("");
        assert!(empty.active_key().is_none());
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let config = LedgerConfig {
            flush_threshold: 0,
            ..LedgerConfig::default()
        };
        assert!(matches!(config.validate(), Err(LedgerError::Config(_))));

        let config = LedgerConfig {
            retention_units: Some(0),
            ..LedgerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_env() {
        std::env::set_var(ENV_STORAGE_PATH, "/var/lib/warden/audit");
        std::env::set_var(ENV_ENCRYPTION_KEY, "from_env");

        let mut config = LedgerConfig::default();
        config.apply_env();

        std::env::remove_var(ENV_STORAGE_PATH);
        std::env::remove_var(ENV_ENCRYPTION_KEY);

        assert_eq!(config.storage_path, PathBuf::from("/var/lib/warden/audit"));
        assert_eq!(config.encryption_key, Some(EncryptionKey::new("from_env")));
        assert!(!config.encryption_enabled);
    }

    #[test]
    fn test_key_not_in_debug_output() {
        let config = LedgerConfig::default().encrypted("hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
