//! Audit Ledger Entry
//!
//! Defines the persisted audit entry, the producer-facing event request and
//! the hash function that links entries into a chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{LedgerError, Result};

/// `previous_hash` of the genesis entry.
pub const GENESIS_PREVIOUS_HASH: &str = "";

/// Structured payload attached to an event.
pub type EventData = Map<String, Value>;

/// Audit ledger entry with cryptographic hash chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub event_type: String,
    pub event_category: String,
    pub actor_id: Option<String>,
    pub affected_entity_type: Option<String>,
    pub affected_entity_id: Option<String>,
    pub event_data: EventData,
    pub event_hash: String,
    pub previous_hash: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "#{} {}/{} by {} ({})",
            self.id,
            self.event_category,
            self.event_type,
            self.actor_id.as_deref().unwrap_or("<system>"),
            short_hash(&self.event_hash)
        )
    }
}

/// An event a producer asks the ledger to record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditEvent {
    pub event_type: String,
    pub event_category: String,
    pub actor_id: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub event_data: EventData,
}

impl NewAuditEvent {
    pub fn new(event_type: impl Into<String>, event_category: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            event_category: event_category.into(),
            actor_id: None,
            entity_type: None,
            entity_id: None,
            event_data: EventData::new(),
        }
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Attach a serializable value as the event payload.
    ///
    /// The value must serialize to a JSON object (or null for an empty
    /// payload); anything else is rejected with `InvalidPayload`.
    pub fn data<T: Serialize>(mut self, data: T) -> Result<Self> {
        self.event_data = into_event_data(serde_json::to_value(data)?)?;
        Ok(self)
    }

    /// Reject events the ledger cannot index.
    pub fn validate(&self) -> Result<()> {
        if self.event_type.trim().is_empty() {
            return Err(LedgerError::blank_field("event_type"));
        }
        if self.event_category.trim().is_empty() {
            return Err(LedgerError::blank_field("event_category"));
        }
        Ok(())
    }
}

pub fn into_event_data(value: Value) -> Result<EventData> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(EventData::new()),
        other => Err(LedgerError::InvalidPayload(format!(
            "event data must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Compute the chain hash of an entry.
///
/// Hash input (UTF-8, in this order), each field prefixed with its byte
/// length so no two field tuples share an encoding:
/// `previous_hash:{len}:{..}|event_type:{len}:{..}|actor_id:{len}:{..}|event_data:{len}:{canonical json}`
/// where an absent actor is written as the empty string.
pub fn compute_hash(
    previous_hash: &str,
    event_type: &str,
    actor_id: Option<&str>,
    event_data: &EventData,
) -> Result<String> {
    let event_data = canonical_json(event_data)?;
    let fields = [
        ("previous_hash", previous_hash),
        ("event_type", event_type),
        ("actor_id", actor_id.unwrap_or("")),
        ("event_data", event_data.as_str()),
    ];
    let canonical = fields
        .iter()
        .map(|(name, value)| format!("{}:{}:{}", name, value.len(), value))
        .collect::<Vec<_>>()
        .join("|");

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Compact JSON with object keys sorted at every level.
pub fn canonical_json(event_data: &EventData) -> Result<String> {
    let sorted = sort_object(event_data);
    Ok(serde_json::to_string(&sorted)?)
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => sort_object(map),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

// Rebuilt in key order so the output is sorted whether or not serde_json
// keeps insertion order.
fn sort_object(map: &Map<String, Value>) -> Value {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    let mut sorted = Map::new();
    for key in keys {
        sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
    }
    Value::Object(sorted)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub fn short_hash(hash: &str) -> &str {
    if hash.is_empty() {
        "genesis"
    } else {
        &hash[..hash.len().min(12)]
    }
}
