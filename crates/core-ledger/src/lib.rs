//! Warden Core Ledger: Tamper-evident audit event ledger
//!
//! # Overview
//!
//! This crate records structured audit events in an append-only chain where
//! every event carries the hash of its predecessor. It includes:
//!
//! - **Event Ledger**: Serialized appends, newest-first queries, integrity verification
//! - **Canonical Hashing**: SHA-256 over an order-independent JSON form
//! - **Unit Store**: Timestamped snapshot files, replayed and re-verified on open
//! - **Encryption at Rest**: PBKDF2-derived AES-256-GCM for persisted units
//! - **Background Flush**: Periodic persistence with explicit shutdown
//!
//! # Key Principles
//!
//! This crate has zero knowledge of:
//! - The resilience layer (callers record outcomes of protected calls themselves)
//! - What event types mean (they are free-form strings)
//!
//! Persistence is best effort: `log_event` never fails because of disk
//! problems, and `flush`/`export_events` report failure as `false`.
//!
//! # Architecture
//!
//! ```text
//!   log_event ──► [ state mutex: events, index, previous_hash ] ──► threshold? ──┐
//!                                                                                │
//!   FlushTask (interval) ───────────────────────────────────────────────────────┤
//!                                                                                ▼
//!                                   flush: snapshot under lock, write outside it
//!                                                                                │
//!                                                                                ▼
//!                      storage_path/audit_log_<timestamp>_<generation>.json
//!                      (pretty JSON array, or base64 AES-256-GCM ciphertext)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use warden_core_ledger::{EventFilter, EventLedger, FlushTask, LedgerConfig};
//! use serde_json::json;
//!
//! # async fn example() -> warden_core_ledger::Result<()> {
//! let mut config = LedgerConfig::with_storage_path("audit_logs");
//! config.apply_env();
//!
//! let ledger = EventLedger::open(config)?;
//! let flusher = FlushTask::spawn(ledger.clone());
//!
//! ledger.log_event("KNOWLEDGE_GRAPH_CONNECTED", json!({"backend": "neo4j"}), None);
//! let report = ledger.verify_integrity();
//! assert!(report.verified);
//!
//! let connections = ledger.get_events(&EventFilter::new().event_type("KNOWLEDGE_GRAPH_CONNECTED"));
//! # let _ = connections;
//! flusher.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod cipher;
pub mod config;
pub mod error;
pub mod event;
pub mod flusher;
pub mod ledger;
pub mod query;
pub mod store;

// Re-export main types for convenience
pub use chain::{verify_events, BreakKind, IntegrityReport};
pub use cipher::{EncryptionKey, LedgerCipher};
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use event::{LedgerEvent, Payload, SYSTEM_ACTOR};
pub use flusher::{flush_blocking, FlushTask};
pub use ledger::EventLedger;
pub use query::{EventFilter, DEFAULT_QUERY_LIMIT};
pub use store::{list_units, read_unit, UnitStore};

/// Prelude module for convenient imports
pub mod prelude {
    pub use super::chain::IntegrityReport;
    pub use super::config::LedgerConfig;
    pub use super::error::{LedgerError, Result};
    pub use super::event::LedgerEvent;
    pub use super::flusher::FlushTask;
    pub use super::ledger::EventLedger;
    pub use super::query::EventFilter;
}
