//! The append-only event ledger
//!
//! `EventLedger` owns the in-memory chain and its persistence. One mutex
//! guards the chain state so that reading the predecessor hash, sealing the
//! new event and appending it happen as a single step. Persistence runs
//! under a separate write lock, with file I/O performed after the chain
//! state has been snapshotted and released, so appends never wait on disk.
//!
//! The ledger is a cheap `Clone` handle; all clones share one chain.

use crate::chain::{verify_events, IntegrityReport};
use crate::cipher::LedgerCipher;
use crate::config::LedgerConfig;
use crate::error::Result;
use crate::event::{capture_time, into_payload, LedgerEvent, SYSTEM_ACTOR};
use crate::query::EventFilter;
use crate::store::{self, UnitStore};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Chain state guarded by the ledger mutex
#[derive(Debug, Default)]
struct LedgerState {
    events: Vec<LedgerEvent>,
    index_by_id: HashMap<String, usize>,
    previous_hash: Option<String>,
    /// Events appended since the last successful flush
    unflushed: usize,
    /// Flush counter, part of each unit name
    generation: u64,
}

impl LedgerState {
    fn from_events(events: Vec<LedgerEvent>) -> Self {
        let index_by_id = events
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
        let previous_hash = events.last().map(|e| e.hash.clone());
        Self {
            events,
            index_by_id,
            previous_hash,
            unflushed: 0,
            generation: 0,
        }
    }
}

struct Inner {
    config: LedgerConfig,
    store: UnitStore,
    cipher: Option<LedgerCipher>,
    state: Mutex<LedgerState>,
    /// Serializes unit writes; never held together with `state` during I/O
    write_lock: Mutex<()>,
}

/// Tamper-evident, hash-chained audit ledger
///
/// ## Example
///
/// ```no_run
/// use warden_core_ledger::{EventFilter, EventLedger, LedgerConfig};
/// use serde_json::json;
///
/// let ledger = EventLedger::open(LedgerConfig::with_storage_path("audit_logs"))?;
/// let id = ledger.log_event("DOCUMENT_PROCESSED", json!({"pages": 12}), Some("analyst"));
///
/// assert!(ledger.get_event_by_id(&id).is_some());
/// assert!(ledger.verify_integrity().verified);
/// let recent = ledger.get_events(&EventFilter::new().event_type("DOCUMENT_PROCESSED"));
/// # let _ = recent;
/// ledger.flush();
/// # Ok::<(), warden_core_ledger::LedgerError>(())
/// ```
#[derive(Clone)]
pub struct EventLedger {
    inner: Arc<Inner>,
}

impl EventLedger {
    /// Open the ledger at `config.storage_path` and replay the latest unit
    ///
    /// Encryption enabled without a usable key is logged and disabled. An
    /// unreadable latest unit yields an empty history, and a broken chain
    /// is replayed only up to the first bad event.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the storage directory
    /// cannot be created.
    pub fn open(config: LedgerConfig) -> Result<Self> {
        config.validate()?;

        let cipher = resolve_cipher(&config);
        let store = UnitStore::open(&config.storage_path)?;
        let events = replay_latest(&store, cipher.as_ref());

        info!(
            storage = %config.storage_path.display(),
            encrypted = cipher.is_some(),
            events = events.len(),
            "Event ledger opened"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                cipher,
                state: Mutex::new(LedgerState::from_events(events)),
                write_lock: Mutex::new(()),
            }),
        })
    }

    /// Append an event and return its id
    ///
    /// The payload is normalized with [`into_payload`]. `actor` defaults to
    /// `"system"`. Reaching the flush threshold persists the ledger before
    /// returning; a failed flush is logged and never surfaces here.
    pub fn log_event(&self, event_type: &str, payload: Value, actor: Option<&str>) -> String {
        let (id, flush_due) = self.append(event_type, payload, actor);
        if flush_due {
            self.flush();
        }
        id
    }

    /// Append an event without flushing on the calling thread
    ///
    /// Returns the new id and whether the flush threshold has been reached.
    /// Async callers hand the flush to [`crate::flusher::flush_blocking`].
    pub fn append(&self, event_type: &str, payload: Value, actor: Option<&str>) -> (String, bool) {
        let mut state = self.state();

        let id = Uuid::new_v4().to_string();
        let event = LedgerEvent::seal(
            id.clone(),
            capture_time(),
            event_type,
            actor.unwrap_or(SYSTEM_ACTOR),
            into_payload(payload),
            state.previous_hash.clone(),
        );

        debug!(
            event_id = %id,
            event_type = %event.event_type,
            actor = %event.actor,
            "Appended ledger event"
        );

        state.previous_hash = Some(event.hash.clone());
        let position = state.events.len();
        state.index_by_id.insert(id.clone(), position);
        state.events.push(event);
        state.unflushed += 1;

        (id, state.unflushed >= self.inner.config.flush_threshold)
    }

    /// Persist the whole chain as a new unit
    ///
    /// Returns `true` on success or when there is nothing new to persist.
    /// Failures are logged and reported as `false`.
    pub fn flush(&self) -> bool {
        let _write = self
            .inner
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let (snapshot, pending, generation) = {
            let mut state = self.state();
            if state.unflushed == 0 {
                return true;
            }
            let generation = state.generation;
            state.generation += 1;
            (state.events.clone(), state.unflushed, generation)
        };

        match self.write_snapshot(&snapshot, generation) {
            Ok(path) => {
                {
                    let mut state = self.state();
                    state.unflushed = state.unflushed.saturating_sub(pending);
                }
                info!(
                    events = snapshot.len(),
                    unit = %path.display(),
                    "Flushed ledger events"
                );
                self.apply_retention();
                true
            }
            Err(e) => {
                error!(error = %e, events = snapshot.len(), "Failed to flush ledger events");
                false
            }
        }
    }

    fn write_snapshot(&self, events: &[LedgerEvent], generation: u64) -> Result<std::path::PathBuf> {
        let json = store::render_events(events)?;
        let contents = match &self.inner.cipher {
            Some(cipher) => cipher.encrypt(json.as_bytes())?,
            None => json,
        };
        self.inner.store.write_unit(&contents, &Utc::now(), generation)
    }

    fn apply_retention(&self) {
        if let Some(keep) = self.inner.config.retention_units {
            if let Err(e) = self.inner.store.prune(keep) {
                warn!(error = %e, "Failed to prune old ledger units");
            }
        }
    }

    /// Matching events, newest first, capped at the filter limit
    pub fn get_events(&self, filter: &EventFilter) -> Vec<LedgerEvent> {
        filter.select_newest_first(&self.state().events)
    }

    pub fn get_event_by_id(&self, id: &str) -> Option<LedgerEvent> {
        let state = self.state();
        state
            .index_by_id
            .get(id)
            .and_then(|&i| state.events.get(i))
            .cloned()
    }

    /// Verify the in-memory chain
    pub fn verify_integrity(&self) -> IntegrityReport {
        let report = verify_events(&self.state().events);
        if !report.verified {
            warn!(
                index = ?report.first_broken_index,
                reason = ?report.reason,
                "Ledger integrity check failed"
            );
        }
        report
    }

    /// Write matching events, oldest first, as plaintext JSON to `path`
    ///
    /// Independent of flushing. Failures are logged and reported as `false`.
    pub fn export_events(&self, path: &Path, filter: &EventFilter) -> bool {
        let selected = filter.select_in_order(&self.state().events);

        match store::write_events_json(path, &selected) {
            Ok(()) => {
                info!(events = selected.len(), path = %path.display(), "Exported ledger events");
                true
            }
            Err(e) => {
                error!(error = %e, path = %path.display(), "Failed to export ledger events");
                false
            }
        }
    }

    /// Drop the entire in-memory chain
    ///
    /// Erases history without trace. Only for tests and administrative
    /// resets; persisted units are left untouched.
    pub fn clear(&self) {
        warn!("Clearing all ledger events; the chain is erased without trace");
        let mut state = self.state();
        let generation = state.generation;
        *state = LedgerState {
            generation,
            ..LedgerState::default()
        };
    }

    /// All events in chain order
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.state().events.clone()
    }

    pub fn len(&self) -> usize {
        self.state().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().events.is_empty()
    }

    /// Hash of the newest event
    pub fn last_hash(&self) -> Option<String> {
        self.state().previous_hash.clone()
    }

    /// Events appended since the last successful flush
    pub fn unflushed(&self) -> usize {
        self.state().unflushed
    }

    pub fn is_encrypted(&self) -> bool {
        self.inner.cipher.is_some()
    }

    pub fn cipher(&self) -> Option<&LedgerCipher> {
        self.inner.cipher.as_ref()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.inner.config
    }

    pub fn storage_path(&self) -> &Path {
        self.inner.store.dir()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for EventLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLedger")
            .field("storage_path", &self.inner.store.dir())
            .field("encrypted", &self.inner.cipher.is_some())
            .field("events", &self.len())
            .finish()
    }
}

fn resolve_cipher(config: &LedgerConfig) -> Option<LedgerCipher> {
    if !config.encryption_enabled {
        return None;
    }

    let Some(key) = config.active_key() else {
        warn!("Encryption enabled but no key provided; disabling encryption");
        return None;
    };

    match LedgerCipher::from_secret(key) {
        Ok(cipher) => Some(cipher),
        Err(e) => {
            warn!(error = %e, "Failed to initialize ledger cipher; disabling encryption");
            None
        }
    }
}

fn replay_latest(store: &UnitStore, cipher: Option<&LedgerCipher>) -> Vec<LedgerEvent> {
    let latest = match store.latest_unit() {
        Ok(Some(path)) => path,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(error = %e, "Could not list ledger units; starting with empty history");
            return Vec::new();
        }
    };

    let mut events = match store::read_unit(&latest, cipher) {
        Ok(events) => events,
        Err(e) => {
            warn!(
                unit = %latest.display(),
                error = %e,
                "Could not load ledger unit; starting with empty history"
            );
            return Vec::new();
        }
    };

    let report = verify_events(&events);
    if !report.verified {
        warn!(
            unit = %latest.display(),
            index = ?report.first_broken_index,
            reason = ?report.reason,
            "Hash chain broken during replay; ledger may be compromised"
        );
        events.truncate(report.valid_prefix_len());
    }

    debug!(unit = %latest.display(), events = events.len(), "Replayed ledger unit");
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::BreakKind;
    use serde_json::json;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> EventLedger {
        EventLedger::open(LedgerConfig::with_storage_path(dir.path())).unwrap()
    }

    fn ledger_with(dir: &TempDir, n: usize) -> EventLedger {
        let ledger = open(dir);
        for i in 0..n {
            ledger.log_event("STEP", json!({ "step": i }), None);
        }
        ledger
    }

    fn tamper(ledger: &EventLedger, index: usize, edit: impl FnOnce(&mut LedgerEvent)) {
        let mut state = ledger.state();
        edit(&mut state.events[index]);
    }

    #[test]
    fn test_log_event_links_chain() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_with(&dir, 3);
        let events = ledger.events();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].previous_hash, None);
        assert_eq!(events[1].previous_hash.as_ref(), Some(&events[0].hash));
        assert_eq!(events[2].previous_hash.as_ref(), Some(&events[1].hash));
        assert_eq!(ledger.last_hash(), Some(events[2].hash.clone()));
        assert_eq!(events[0].actor, SYSTEM_ACTOR);
    }

    #[test]
    fn test_verified_after_appends() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_with(&dir, 10);

        let report = ledger.verify_integrity();
        assert!(report.verified);
        assert_eq!(report.events_checked, 10);
    }

    #[test]
    fn test_get_event_by_id() {
        let dir = TempDir::new().unwrap();
        let ledger = open(&dir);
        let id = ledger.log_event("LOGIN", json!({"ip": "10.0.0.1"}), Some("alice"));

        let event = ledger.get_event_by_id(&id).unwrap();
        assert_eq!(event.actor, "alice");
        assert_eq!(event.payload["ip"], json!("10.0.0.1"));
        assert!(ledger.get_event_by_id("missing").is_none());
    }

    #[test]
    fn test_query_scenario_newest_first() {
        let dir = TempDir::new().unwrap();
        let ledger = open(&dir);
        let a = ledger.log_event("X", json!({}), None);
        let _b = ledger.log_event("Y", json!({}), None);
        let c = ledger.log_event("X", json!({}), None);

        let by_type: Vec<String> = ledger
            .get_events(&EventFilter::new().event_type("X"))
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(by_type, vec![c.clone(), a]);

        let newest: Vec<String> = ledger
            .get_events(&EventFilter::new().limit(1))
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(newest, vec![c]);
    }

    #[test]
    fn test_tamper_id() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_with(&dir, 4);
        tamper(&ledger, 2, |e| e.id = "forged".to_string());

        let report = ledger.verify_integrity();
        assert!(!report.verified);
        assert_eq!(report.first_broken_index, Some(2));
    }

    #[test]
    fn test_tamper_timestamp() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_with(&dir, 4);
        tamper(&ledger, 1, |e| e.timestamp = e.timestamp + chrono::Duration::seconds(1));

        assert_eq!(ledger.verify_integrity().first_broken_index, Some(1));
    }

    #[test]
    fn test_tamper_timestamp_below_microsecond() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_with(&dir, 3);
        tamper(&ledger, 1, |e| e.timestamp = e.timestamp + chrono::Duration::nanoseconds(500));

        let report = ledger.verify_integrity();
        assert!(!report.verified);
        assert_eq!(report.first_broken_index, Some(1));
    }

    #[test]
    fn test_tamper_event_type() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_with(&dir, 4);
        tamper(&ledger, 3, |e| e.event_type = "ERASED".to_string());

        assert_eq!(ledger.verify_integrity().first_broken_index, Some(3));
    }

    #[test]
    fn test_tamper_actor() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_with(&dir, 4);
        tamper(&ledger, 0, |e| e.actor = "mallory".to_string());

        let report = ledger.verify_integrity();
        assert_eq!(report.first_broken_index, Some(0));
        assert_eq!(report.reason, Some(BreakKind::HashMismatch));
    }

    #[test]
    fn test_tamper_payload() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_with(&dir, 4);
        tamper(&ledger, 2, |e| {
            e.payload.insert("step".to_string(), json!(42));
        });

        assert_eq!(ledger.verify_integrity().first_broken_index, Some(2));
    }

    #[test]
    fn test_tamper_previous_hash() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_with(&dir, 4);
        tamper(&ledger, 2, |e| e.previous_hash = Some("0".repeat(64)));

        let report = ledger.verify_integrity();
        assert_eq!(report.first_broken_index, Some(2));
        assert_eq!(report.reason, Some(BreakKind::BrokenLink));
    }

    #[test]
    fn test_tamper_hash() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_with(&dir, 4);
        tamper(&ledger, 1, |e| e.hash = "f".repeat(64));

        let report = ledger.verify_integrity();
        assert_eq!(report.first_broken_index, Some(1));
        assert_eq!(report.reason, Some(BreakKind::HashMismatch));
    }

    #[test]
    fn test_resealed_tamper_breaks_next_link() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_with(&dir, 4);
        tamper(&ledger, 1, |e| {
            e.actor = "mallory".to_string();
            e.hash = e.compute_hash();
        });

        let report = ledger.verify_integrity();
        assert_eq!(report.first_broken_index, Some(2));
        assert_eq!(report.reason, Some(BreakKind::BrokenLink));
    }

    #[test]
    fn test_flush_writes_unit_and_resets_unflushed() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_with(&dir, 3);
        assert_eq!(ledger.unflushed(), 3);

        assert!(ledger.flush());
        assert_eq!(ledger.unflushed(), 0);

        let units = store::list_units(dir.path()).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(store::read_unit(&units[0], None).unwrap(), ledger.events());
    }

    #[test]
    fn test_flush_without_new_events_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let ledger = open(&dir);

        assert!(ledger.flush());
        assert!(store::list_units(dir.path()).unwrap().is_empty());

        ledger.log_event("X", json!({}), None);
        assert!(ledger.flush());
        assert!(ledger.flush());
        assert_eq!(store::list_units(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_size_threshold_triggers_flush() {
        let dir = TempDir::new().unwrap();
        let config = LedgerConfig {
            flush_threshold: 3,
            ..LedgerConfig::with_storage_path(dir.path())
        };
        let ledger = EventLedger::open(config).unwrap();

        ledger.log_event("A", json!({}), None);
        ledger.log_event("B", json!({}), None);
        assert!(store::list_units(dir.path()).unwrap().is_empty());

        ledger.log_event("C", json!({}), None);
        assert_eq!(store::list_units(dir.path()).unwrap().len(), 1);
        assert_eq!(ledger.unflushed(), 0);
    }

    #[test]
    fn test_append_defers_threshold_flush() {
        let dir = TempDir::new().unwrap();
        let config = LedgerConfig {
            flush_threshold: 2,
            ..LedgerConfig::with_storage_path(dir.path())
        };
        let ledger = EventLedger::open(config).unwrap();

        assert!(!ledger.append("A", json!({}), None).1);
        let (id, flush_due) = ledger.append("B", json!({}), None);
        assert!(flush_due);
        assert!(ledger.get_event_by_id(&id).is_some());
        assert!(store::list_units(dir.path()).unwrap().is_empty());
        assert_eq!(ledger.unflushed(), 2);
    }

    #[test]
    fn test_flush_failure_returns_false() {
        let dir = TempDir::new().unwrap();
        let storage = dir.path().join("units");
        let ledger = EventLedger::open(LedgerConfig::with_storage_path(&storage)).unwrap();
        ledger.log_event("X", json!({}), None);

        std::fs::remove_dir_all(&storage).unwrap();
        std::fs::write(&storage, "not a directory").unwrap();

        assert!(!ledger.flush());
        assert_eq!(ledger.unflushed(), 1);
    }

    #[test]
    fn test_export_failure_returns_false() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_with(&dir, 1);
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();

        assert!(!ledger.export_events(&blocker.join("out.json"), &EventFilter::new()));
    }

    #[test]
    fn test_clear_resets_chain() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_with(&dir, 3);
        ledger.clear();

        assert!(ledger.is_empty());
        assert_eq!(ledger.last_hash(), None);
        assert_eq!(ledger.unflushed(), 0);

        ledger.log_event("AFTER_CLEAR", json!({}), None);
        assert_eq!(ledger.events()[0].previous_hash, None);
        assert!(ledger.verify_integrity().verified);
    }

    #[test]
    fn test_encryption_without_key_is_disabled() {
        let dir = TempDir::new().unwrap();
        let config = LedgerConfig {
            encryption_enabled: true,
            ..LedgerConfig::with_storage_path(dir.path())
        };
        let ledger = EventLedger::open(config).unwrap();
        assert!(!ledger.is_encrypted());

        ledger.log_event("X", json!({}), None);
        assert!(ledger.flush());
        let units = store::list_units(dir.path()).unwrap();
        assert_eq!(store::read_unit(&units[0], None).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let config = LedgerConfig {
            flush_threshold: 0,
            ..LedgerConfig::with_storage_path(dir.path())
        };
        assert!(EventLedger::open(config).is_err());
    }

    #[test]
    fn test_clones_share_chain() {
        let dir = TempDir::new().unwrap();
        let ledger = open(&dir);
        let other = ledger.clone();

        other.log_event("X", json!({}), None);
        assert_eq!(ledger.len(), 1);
    }
}
