//! Ledger event schema and canonical hashing
//!
//! A `LedgerEvent` is immutable once appended. Its `hash` is SHA-256 over the
//! canonical JSON form of every other field, `previous_hash` included, so the
//! events form a singly linked, tamper-evident chain:
//!
//! ```text
//! Event 0: SHA256(canonical{.., previous_hash: null})   -> hash_0
//! Event 1: SHA256(canonical{.., previous_hash: hash_0}) -> hash_1
//! Event 2: SHA256(canonical{.., previous_hash: hash_1}) -> hash_2
//! ```

use chrono::{DateTime, SecondsFormat, SubsecRound, Timelike, Utc};
use ring::digest;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Write as _;

/// Structured event payload (string keys to arbitrary JSON values)
pub type Payload = Map<String, Value>;

/// Actor recorded when the caller does not name one
pub const SYSTEM_ACTOR: &str = "system";

/// A single entry in the audit ledger
///
/// Serialized field names match the persisted unit format:
/// `id, timestamp, event_type, actor, data, previous_hash, hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Unique event identifier (UUID v4)
    pub id: String,

    /// Capture time (UTC, microsecond precision)
    pub timestamp: DateTime<Utc>,

    /// Free-form classification, e.g. `DOCUMENT_PROCESSED`
    pub event_type: String,

    /// Entity that caused the event
    pub actor: String,

    /// Event-specific structured data
    #[serde(rename = "data")]
    pub payload: Payload,

    /// Hash of the preceding event; `None` for the first event
    pub previous_hash: Option<String>,

    /// SHA-256 (hex) over the canonical form of all other fields
    pub hash: String,
}

impl LedgerEvent {
    /// Build an event and compute its chained hash
    pub fn seal(
        id: String,
        timestamp: DateTime<Utc>,
        event_type: impl Into<String>,
        actor: impl Into<String>,
        payload: Payload,
        previous_hash: Option<String>,
    ) -> Self {
        let mut event = Self {
            id,
            timestamp,
            event_type: event_type.into(),
            actor: actor.into(),
            payload,
            previous_hash,
            hash: String::new(),
        };
        event.hash = event.compute_hash();
        event
    }

    /// Recompute the hash from the stored fields
    pub fn compute_hash(&self) -> String {
        let digest = digest::digest(&digest::SHA256, self.canonical_bytes().as_bytes());
        hex::encode(digest.as_ref())
    }

    /// True if the stored hash matches the stored fields
    pub fn hash_is_valid(&self) -> bool {
        self.compute_hash() == self.hash
    }

    /// Canonical hash input: every field except `hash`, keys sorted
    pub fn canonical_bytes(&self) -> String {
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        fields.insert(
            "timestamp".to_string(),
            Value::String(canonical_timestamp(&self.timestamp)),
        );
        fields.insert(
            "event_type".to_string(),
            Value::String(self.event_type.clone()),
        );
        fields.insert("actor".to_string(), Value::String(self.actor.clone()));
        fields.insert("data".to_string(), Value::Object(self.payload.clone()));
        fields.insert(
            "previous_hash".to_string(),
            self.previous_hash.clone().map_or(Value::Null, Value::String),
        );

        to_canonical_json(&Value::Object(fields))
    }
}

/// Current time truncated to the precision used in the canonical form
pub fn capture_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// RFC 3339, UTC, microseconds
///
/// Captured timestamps are whole microseconds. Any finer component is kept
/// at nanosecond precision so that it still participates in the hash.
pub fn canonical_timestamp(at: &DateTime<Utc>) -> String {
    let format = if at.nanosecond() % 1_000 == 0 {
        SecondsFormat::Micros
    } else {
        SecondsFormat::Nanos
    };
    at.to_rfc3339_opts(format, true)
}

/// Normalize an arbitrary JSON value into an event payload
///
/// Objects are used as-is, `null` becomes an empty payload and any other
/// value is stored under the `value` key.
pub fn into_payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Render `value` as compact JSON with object keys sorted at every depth
///
/// The output does not depend on the in-memory order of map entries, so the
/// same logical value always hashes identically.
pub fn to_canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(out, key);
                out.push(':');
                write_canonical(out, &map[key.as_str()]);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        // Scalars: serde_json's compact Display is already canonical
        scalar => {
            let _ = write!(out, "{}", scalar);
        }
    }
}

fn write_json_string(out: &mut String, s: &str) {
    let _ = write!(out, "{}", Value::String(s.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(previous_hash: Option<String>) -> LedgerEvent {
        LedgerEvent::seal(
            "4f1c2b9e-0000-4000-8000-000000000001".to_string(),
            "2024-03-01T12:00:00.123456Z".parse().unwrap(),
            "DOCUMENT_PROCESSED",
            "analyst",
            into_payload(json!({"document_path": "fas_4.pdf", "pages": 12})),
            previous_hash,
        )
    }

    #[test]
    fn test_canonical_json_sorts_keys_recursively() {
        let value = json!({"b": 1, "a": {"z": [3, {"y": true, "x": null}], "c": "s"}});
        assert_eq!(
            to_canonical_json(&value),
            r#"{"a":{"c":"s","z":[3,{"x":null,"y":true}]},"b":1}"#
        );
    }

    #[test]
    fn test_canonical_json_escapes_strings() {
        let value = json!({"quote\"key": "line\nbreak"});
        assert_eq!(to_canonical_json(&value), r#"{"quote\"key":"line\nbreak"}"#);
    }

    #[test]
    fn test_hash_independent_of_insertion_order() {
        let mut forward = Payload::new();
        forward.insert("alpha".to_string(), json!(1));
        forward.insert("beta".to_string(), json!({"k1": 1, "k2": 2}));

        let mut backward = Payload::new();
        backward.insert("beta".to_string(), json!({"k2": 2, "k1": 1}));
        backward.insert("alpha".to_string(), json!(1));

        let at = capture_time();
        let a = LedgerEvent::seal("id".into(), at, "X", SYSTEM_ACTOR, forward, None);
        let b = LedgerEvent::seal("id".into(), at, "X", SYSTEM_ACTOR, backward, None);
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn test_hash_is_sha256_hex_and_verifies() {
        let event = sample(None);
        assert_eq!(event.hash.len(), 64);
        assert!(event.hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(event.hash_is_valid());
    }

    #[test]
    fn test_previous_hash_participates_in_hash() {
        let first = sample(None);
        let chained = sample(Some(first.hash.clone()));
        assert_ne!(first.hash, chained.hash);
    }

    #[test]
    fn test_canonical_timestamp_keeps_sub_microsecond_digits() {
        let at: DateTime<Utc> = "2024-03-01T12:00:00.123456Z".parse().unwrap();
        assert_eq!(canonical_timestamp(&at), "2024-03-01T12:00:00.123456Z");

        let nudged = at + chrono::Duration::nanoseconds(500);
        assert_eq!(canonical_timestamp(&nudged), "2024-03-01T12:00:00.123456500Z");
    }

    #[test]
    fn test_sub_microsecond_change_breaks_hash() {
        let mut event = sample(None);
        event.timestamp = event.timestamp + chrono::Duration::nanoseconds(500);
        assert!(!event.hash_is_valid());
    }

    #[test]
    fn test_canonical_form_contents() {
        let event = sample(None);
        assert_eq!(
            event.canonical_bytes(),
            concat!(
                r#"{"actor":"analyst","data":{"document_path":"fas_4.pdf","pages":12},"#,
                r#""event_type":"DOCUMENT_PROCESSED","id":"4f1c2b9e-0000-4000-8000-000000000001","#,
                r#""previous_hash":null,"timestamp":"2024-03-01T12:00:00.123456Z"}"#
            )
        );
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(sample(None)).unwrap();
        let object = json.as_object().unwrap();
        for field in ["id", "timestamp", "event_type", "actor", "data", "previous_hash", "hash"] {
            assert!(object.contains_key(field), "missing field {}", field);
        }
        assert!(object["previous_hash"].is_null());
    }

    #[test]
    fn test_persisted_form_reproduces_hash() {
        let event = sample(Some("ab".repeat(32)));
        let text = serde_json::to_string_pretty(&event).unwrap();
        let reloaded: LedgerEvent = serde_json::from_str(&text).unwrap();

        assert_eq!(reloaded, event);
        assert!(reloaded.hash_is_valid());
    }

    #[test]
    fn test_into_payload_normalization() {
        assert!(into_payload(Value::Null).is_empty());
        assert_eq!(into_payload(json!(5))["value"], json!(5));
        assert_eq!(into_payload(json!({"k": "v"}))["k"], json!("v"));
    }
}
