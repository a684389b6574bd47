//! Chain Verification
//!
//! Recomputes every entry's hash and checks each link against the stored
//! hash of its predecessor.
//!
//! A date-restricted check is seeded with the stored hash of the entry just
//! before the window, so an intact chain verifies cleanly at the window
//! boundary. Like every link check, the seed is a stored value: a store-level
//! attacker who rewrites a run of consecutive rows can still produce a
//! self-consistent sub-chain. Only publishing the head hash somewhere the
//! store cannot reach closes that gap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audit::entry::{compute_hash, into_event_data, GENESIS_PREVIOUS_HASH};
use crate::database::models::{to_micros, AuditEntryRow};
use crate::database::queries::Queries;
use crate::database::Database;
use crate::error::{LedgerError, Result};

/// Inclusive `created_at` bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(LedgerError::InvalidArgument(format!(
                    "range start {} is after range end {}",
                    start.to_rfc3339(),
                    end.to_rfc3339()
                )));
            }
        }
        Ok(())
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Outcome of checking a single entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryVerification {
    pub entry_id: i64,
    pub event_type: String,
    pub created_at: DateTime<Utc>,
    pub expected_previous_hash: String,
    pub previous_hash: String,
    pub previous_hash_valid: bool,
    pub stored_hash: String,
    /// `None` when the stored payload could not be decoded.
    pub calculated_hash: Option<String>,
    pub hash_valid: bool,
    pub is_valid: bool,
}

/// Verification report with detailed information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub is_chain_valid: bool,
    pub total_entries: usize,
    pub invalid_entries: usize,
    /// Hash the first checked entry was expected to link to.
    pub seed_hash: String,
    pub range: Option<DateRange>,
    pub results: Vec<EntryVerification>,
}

impl VerificationReport {
    pub fn invalid(&self) -> impl Iterator<Item = &EntryVerification> {
        self.results.iter().filter(|r| !r.is_valid)
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        if self.is_chain_valid {
            format!("Audit chain is valid ({} entries)", self.total_entries)
        } else {
            let ids: Vec<String> = self.invalid().map(|r| r.entry_id.to_string()).collect();
            format!(
                "Audit chain is INVALID: {} of {} entries failed (ids: {})",
                self.invalid_entries,
                self.total_entries,
                ids.join(", ")
            )
        }
    }
}

/// Reads committed entries and checks them; never touches the chain head.
#[derive(Clone)]
pub struct ChainVerifier {
    database: Database,
}

impl ChainVerifier {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub async fn verify(&self, range: Option<DateRange>) -> Result<VerificationReport> {
        let range = range.filter(|r| !r.is_unbounded());
        if let Some(range) = &range {
            range.validate()?;
        }

        let pool = self.database.pool();
        let rows = Queries::entries_ascending(
            pool,
            range.and_then(|r| r.start).map(to_micros),
            range.and_then(|r| r.end).map(to_micros),
        )
        .await?;

        let seed_hash = match (&range, rows.first()) {
            (Some(_), Some(first)) => Queries::entry_before(pool, first.created_at, first.id)
                .await?
                .map(|previous| previous.event_hash)
                .unwrap_or_else(|| GENESIS_PREVIOUS_HASH.to_string()),
            _ => GENESIS_PREVIOUS_HASH.to_string(),
        };

        let report = verify_rows(&rows, seed_hash, range);

        if report.is_chain_valid {
            info!("Audit chain verification successful: {} entries", report.total_entries);
        } else {
            warn!("{}", report.summary());
        }
        Ok(report)
    }
}

/// Check rows already in chain order, starting from `seed_hash`.
pub fn verify_rows(
    rows: &[AuditEntryRow],
    seed_hash: String,
    range: Option<DateRange>,
) -> VerificationReport {
    let mut expected_previous_hash = seed_hash.clone();
    let mut results = Vec::with_capacity(rows.len());

    for row in rows {
        let result = verify_row(row, &expected_previous_hash);
        expected_previous_hash = row.event_hash.clone();
        results.push(result);
    }

    let invalid_entries = results.iter().filter(|r| !r.is_valid).count();

    VerificationReport {
        is_chain_valid: invalid_entries == 0,
        total_entries: results.len(),
        invalid_entries,
        seed_hash,
        range,
        results,
    }
}

fn verify_row(row: &AuditEntryRow, expected_previous_hash: &str) -> EntryVerification {
    let previous_hash_valid = row.previous_hash == expected_previous_hash;

    let calculated_hash = serde_json::from_str(&row.event_data)
        .map_err(LedgerError::from)
        .and_then(into_event_data)
        .and_then(|event_data| {
            compute_hash(
                &row.previous_hash,
                &row.event_type,
                row.actor_id.as_deref(),
                &event_data,
            )
        })
        .ok();
    let hash_valid = calculated_hash.as_deref() == Some(row.event_hash.as_str());

    EntryVerification {
        entry_id: row.id,
        event_type: row.event_type.clone(),
        created_at: row.created_at(),
        expected_previous_hash: expected_previous_hash.to_string(),
        previous_hash: row.previous_hash.clone(),
        previous_hash_valid,
        stored_hash: row.event_hash.clone(),
        calculated_hash,
        hash_valid,
        is_valid: previous_hash_valid && hash_valid,
    }
}
