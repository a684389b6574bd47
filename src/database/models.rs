use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::entry::{into_event_data, AuditEntry};
use crate::error::{LedgerError, Result};

/// Raw `audit_entries` row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditEntryRow {
    pub id: i64,
    pub event_type: String,
    pub event_category: String,
    pub actor_id: Option<String>,
    pub affected_entity_type: Option<String>,
    pub affected_entity_id: Option<String>,
    pub event_data: String,
    pub event_hash: String,
    pub previous_hash: String,
    pub created_at: i64,
}

impl AuditEntryRow {
    pub fn created_at(&self) -> DateTime<Utc> {
        from_micros(self.created_at)
    }

    /// Decode the stored payload into an entry.
    pub fn into_entry(self) -> Result<AuditEntry> {
        let value: serde_json::Value = serde_json::from_str(&self.event_data).map_err(|e| {
            LedgerError::InvalidPayload(format!(
                "Stored event data of entry {} is not valid JSON: {}",
                self.id, e
            ))
        })?;
        let event_data = into_event_data(value)?;
        let created_at = self.created_at();

        Ok(AuditEntry {
            id: self.id,
            event_type: self.event_type,
            event_category: self.event_category,
            actor_id: self.actor_id,
            affected_entity_type: self.affected_entity_type,
            affected_entity_id: self.affected_entity_id,
            event_data,
            event_hash: self.event_hash,
            previous_hash: self.previous_hash,
            created_at,
        })
    }
}

/// The most recently persisted entry, as seen by the chain writer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HeadRow {
    pub id: i64,
    pub event_hash: String,
    pub created_at: i64,
}

/// A fully linked entry ready to be inserted.
#[derive(Debug, Clone)]
pub struct PendingEntry<'a> {
    pub event_type: &'a str,
    pub event_category: &'a str,
    pub actor_id: Option<&'a str>,
    pub affected_entity_type: Option<&'a str>,
    pub affected_entity_id: Option<&'a str>,
    pub event_data: &'a str,
    pub event_hash: &'a str,
    pub previous_hash: &'a str,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_entries: i64,
    pub first_entry_at: Option<DateTime<Utc>>,
    pub last_entry_at: Option<DateTime<Utc>>,
}

pub fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub fn from_micros(micros: i64) -> DateTime<Utc> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(event_data: &str) -> AuditEntryRow {
        AuditEntryRow {
            id: 3,
            event_type: "vote_cast".to_string(),
            event_category: "governance".to_string(),
            actor_id: None,
            affected_entity_type: None,
            affected_entity_id: None,
            event_data: event_data.to_string(),
            event_hash: "ab".repeat(32),
            previous_hash: String::new(),
            created_at: 1_700_000_000_123_456,
        }
    }

    #[test]
    fn test_micros_round_trip_keeps_precision() {
        let at = from_micros(1_700_000_000_123_456);
        assert_eq!(to_micros(at), 1_700_000_000_123_456);
        assert_eq!(at.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn test_row_into_entry() {
        let entry = row(r#"{"a":1}"#).into_entry().unwrap();
        assert_eq!(entry.id, 3);
        assert_eq!(entry.event_data["a"], 1);
    }

    #[test]
    fn test_corrupt_payload_is_reported() {
        let result = row("{not json").into_entry();
        assert!(matches!(result, Err(LedgerError::InvalidPayload(_))));
    }
}
