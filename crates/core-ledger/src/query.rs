//! Event filters for ledger queries and exports

use crate::event::LedgerEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result cap applied when a query does not set one
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Conjunctive filter over ledger events
///
/// Every criterion left as `None` matches all events. Time bounds are
/// inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub actor: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end_time = Some(end);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True if `event` satisfies every set criterion (the limit is ignored)
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        if let Some(event_type) = &self.event_type {
            if &event.event_type != event_type {
                return false;
            }
        }
        if let Some(actor) = &self.actor {
            if &event.actor != actor {
                return false;
            }
        }
        if let Some(start) = &self.start_time {
            if event.timestamp < *start {
                return false;
            }
        }
        if let Some(end) = &self.end_time {
            if event.timestamp > *end {
                return false;
            }
        }
        true
    }

    /// Matching events, newest first, capped at the limit
    /// (`DEFAULT_QUERY_LIMIT` when unset)
    pub fn select_newest_first(&self, events: &[LedgerEvent]) -> Vec<LedgerEvent> {
        let limit = self.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        events
            .iter()
            .rev()
            .filter(|e| self.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Matching events in chain order
    ///
    /// Without a limit every match is returned. With one, the newest `limit`
    /// matches are kept, still oldest first.
    pub fn select_in_order(&self, events: &[LedgerEvent]) -> Vec<LedgerEvent> {
        let mut selected: Vec<LedgerEvent> = events.iter().filter(|e| self.matches(e)).cloned().collect();
        if let Some(limit) = self.limit {
            if selected.len() > limit {
                selected.drain(..selected.len() - limit);
            }
        }
        selected
    }
}
