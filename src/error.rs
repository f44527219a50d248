/*!
 * Error types for Warden
 */

use std::fmt;
use std::io;
use warden_core_ledger::LedgerError;

pub type Result<T> = std::result::Result<T, WardenError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_FATAL: i32 = 2;
pub const EXIT_INTEGRITY: i32 = 3;

#[derive(Debug)]
pub enum WardenError {
    /// Configuration error
    Config(String),

    /// I/O error
    Io(io::Error),

    /// Ledger operation failed
    Ledger(LedgerError),

    /// TOML parse or render error
    Toml(String),

    /// JSON parse or render error
    Json(serde_json::Error),

    /// Requested item does not exist
    NotFound(String),

    /// Hash chain verification failed
    Integrity { index: usize, message: String },
}

impl WardenError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            WardenError::Config(_) | WardenError::Toml(_) => EXIT_FATAL,
            WardenError::Integrity { .. } => EXIT_INTEGRITY,
            WardenError::Ledger(LedgerError::Config(_)) => EXIT_FATAL,
            _ => EXIT_FAILURE,
        }
    }
}

impl fmt::Display for WardenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WardenError::Config(msg) => write!(f, "Configuration error: {}", msg),
            WardenError::Io(err) => write!(f, "I/O error: {}", err),
            WardenError::Ledger(err) => write!(f, "Ledger error: {}", err),
            WardenError::Toml(msg) => write!(f, "TOML error: {}", msg),
            WardenError::Json(err) => write!(f, "JSON error: {}", err),
            WardenError::NotFound(what) => write!(f, "Not found: {}", what),
            WardenError::Integrity { index, message } => {
                write!(f, "Integrity check failed at event {}: {}", index, message)
            }
        }
    }
}

impl std::error::Error for WardenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WardenError::Io(err) => Some(err),
            WardenError::Ledger(err) => Some(err),
            WardenError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for WardenError {
    fn from(err: io::Error) -> Self {
        WardenError::Io(err)
    }
}

impl From<LedgerError> for WardenError {
    fn from(err: LedgerError) -> Self {
        WardenError::Ledger(err)
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(err: serde_json::Error) -> Self {
        WardenError::Json(err)
    }
}

impl From<toml::de::Error> for WardenError {
    fn from(err: toml::de::Error) -> Self {
        WardenError::Toml(err.to_string())
    }
}

impl From<toml::ser::Error> for WardenError {
    fn from(err: toml::ser::Error) -> Self {
        WardenError::Toml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(WardenError::Config("bad".to_string()).exit_code(), EXIT_FATAL);
        assert_eq!(
            WardenError::Integrity {
                index: 4,
                message: "hash mismatch".to_string()
            }
            .exit_code(),
            EXIT_INTEGRITY
        );
        assert_eq!(
            WardenError::NotFound("event abc".to_string()).exit_code(),
            EXIT_FAILURE
        );
        assert_eq!(
            WardenError::Ledger(LedgerError::Config("zero".to_string())).exit_code(),
            EXIT_FATAL
        );
    }

    #[test]
    fn test_error_display() {
        let err = WardenError::Integrity {
            index: 2,
            message: "broken link".to_string(),
        };
        assert_eq!(err.to_string(), "Integrity check failed at event 2: broken link");
        assert_eq!(
            WardenError::NotFound("event 42".to_string()).to_string(),
            "Not found: event 42"
        );
    }

    #[test]
    fn test_io_source() {
        use std::error::Error;
        let err = WardenError::from(io::Error::other("disk gone"));
        assert!(err.source().is_some());
        assert!(WardenError::Config("x".to_string()).source().is_none());
    }
}
