//! Persisted unit storage
//!
//! Every flush writes one self-contained snapshot of the ledger into a new
//! file named `audit_log_<YYYYmmdd_HHMMSS_ffffff>_<generation>.json`. Names
//! sort chronologically, so the latest unit is the greatest name. Writes go
//! through a temporary file and a rename, so a crash mid-write never leaves
//! a truncated unit behind.

use crate::cipher::LedgerCipher;
use crate::error::{LedgerError, Result};
use crate::event::LedgerEvent;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const UNIT_PREFIX: &str = "audit_log_";
const UNIT_SUFFIX: &str = ".json";

/// Directory of persisted ledger units
#[derive(Debug, Clone)]
pub struct UnitStore {
    dir: PathBuf,
}

impl UnitStore {
    /// Use `dir` for units, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a unit written at `at` by flush number `generation`
    pub fn unit_name(at: &DateTime<Utc>, generation: u64) -> String {
        format!(
            "{}{}_{:06}{}",
            UNIT_PREFIX,
            at.format("%Y%m%d_%H%M%S_%6f"),
            generation,
            UNIT_SUFFIX
        )
    }

    /// Atomically write a unit and return its path
    pub fn write_unit(&self, contents: &str, at: &DateTime<Utc>, generation: u64) -> Result<PathBuf> {
        let path = self.dir.join(Self::unit_name(at, generation));
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, contents)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!(unit = %path.display(), bytes = contents.len(), "Wrote ledger unit");
        Ok(path)
    }

    /// Units in chronological order
    pub fn list_units(&self) -> Result<Vec<PathBuf>> {
        list_units(&self.dir)
    }

    /// Most recently written unit, if any
    pub fn latest_unit(&self) -> Result<Option<PathBuf>> {
        Ok(self.list_units()?.pop())
    }

    /// Remove the oldest units so that at most `keep` remain
    ///
    /// Returns the number of units removed.
    pub fn prune(&self, keep: usize) -> Result<usize> {
        let units = self.list_units()?;
        if units.len() <= keep {
            return Ok(0);
        }

        let excess = units.len() - keep;
        for unit in &units[..excess] {
            fs::remove_file(unit)?;
        }

        info!(removed = excess, kept = keep, "Pruned old ledger units");
        Ok(excess)
    }
}

/// Ledger units found in `dir`, oldest first
///
/// A missing directory holds no units.
pub fn list_units(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut units = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(UNIT_PREFIX) && name.ends_with(UNIT_SUFFIX) && entry.file_type()?.is_file() {
            units.push(entry.path());
        }
    }

    units.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(units)
}

/// Read the events stored in a unit
///
/// Plaintext units are JSON arrays. Anything else is treated as ciphertext
/// and requires `cipher`.
pub fn read_unit(path: &Path, cipher: Option<&LedgerCipher>) -> Result<Vec<LedgerEvent>> {
    let text = fs::read_to_string(path)?;
    let trimmed = text.trim_start();

    let plaintext = if trimmed.starts_with('[') {
        trimmed.as_bytes().to_vec()
    } else {
        match cipher {
            Some(cipher) => cipher.decrypt(trimmed)?,
            None => {
                return Err(LedgerError::CorruptUnit {
                    path: path.to_path_buf(),
                    reason: "unit is encrypted and no key is configured".to_string(),
                })
            }
        }
    };

    serde_json::from_slice(&plaintext).map_err(|e| LedgerError::CorruptUnit {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Serialize events as the pretty JSON array used by unit files
pub fn render_events(events: &[LedgerEvent]) -> Result<String> {
    Ok(serde_json::to_string_pretty(events)?)
}

/// Write events as plaintext JSON to an arbitrary path
pub fn write_events_json(path: &Path, events: &[LedgerEvent]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render_events(events)?)?;
    Ok(())
}
