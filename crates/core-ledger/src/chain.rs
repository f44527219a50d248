//! Hash-chain verification
//!
//! Walks a sequence of events and checks two things at every position:
//! that `previous_hash` links to the prior event's `hash`, and that the
//! stored `hash` is reproduced by recomputing it from the stored fields.
//! The first failing position is reported; nothing after it is trusted.

use crate::event::LedgerEvent;
use serde::Serialize;
use std::fmt;

/// Which check tripped at the first broken position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// `previous_hash` does not match the prior event's `hash`
    BrokenLink,
    /// Recomputed hash differs from the stored one
    HashMismatch,
}

impl fmt::Display for BreakKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakKind::BrokenLink => write!(f, "broken link"),
            BreakKind::HashMismatch => write!(f, "hash mismatch"),
        }
    }
}

/// Result of verifying a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// True if every event passed both checks
    pub verified: bool,

    /// Position of the first event that failed a check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_broken_index: Option<usize>,

    /// Length of the chain handed to the verifier, broken or not
    pub events_checked: usize,

    /// What went wrong at `first_broken_index`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<BreakKind>,

    /// Human-readable summary
    pub message: String,
}

impl IntegrityReport {
    fn intact(events_checked: usize) -> Self {
        Self {
            verified: true,
            first_broken_index: None,
            events_checked,
            reason: None,
            message: format!("All {} events verified", events_checked),
        }
    }

    fn broken(index: usize, reason: BreakKind, events_checked: usize) -> Self {
        Self {
            verified: false,
            first_broken_index: Some(index),
            events_checked,
            reason: Some(reason),
            message: format!("Chain integrity broken at event {}: {}", index, reason),
        }
    }

    /// Number of events before the first break (all of them if intact)
    pub fn valid_prefix_len(&self) -> usize {
        match self.first_broken_index {
            Some(index) => index,
            None => self.events_checked,
        }
    }
}

/// Verify a chain of events in order
///
/// The first event must carry no predecessor and a reproducible hash. For
/// every later event the link is checked before the hash, so a rewritten
/// `previous_hash` is reported as a broken link.
pub fn verify_events(events: &[LedgerEvent]) -> IntegrityReport {
    for (index, event) in events.iter().enumerate() {
        let expected_previous = match index {
            0 => None,
            _ => Some(events[index - 1].hash.as_str()),
        };

        if event.previous_hash.as_deref() != expected_previous {
            return IntegrityReport::broken(index, BreakKind::BrokenLink, events.len());
        }
        if !event.hash_is_valid() {
            return IntegrityReport::broken(index, BreakKind::HashMismatch, events.len());
        }
    }

    IntegrityReport::intact(events.len())
}
