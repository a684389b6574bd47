//! Audit Query Engine
//!
//! Filtered, newest-first retrieval for audit review, with actor labels
//! resolved from an external directory on a best-effort basis.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::audit::entry::AuditEntry;
use crate::config::{DEFAULT_ACTOR_LOOKUP_TIMEOUT_MS, DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT};
use crate::database::queries::Queries;
use crate::database::Database;
use crate::error::{LedgerError, Result};

/// Conjunctive filter over audit entries.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub event_type: Option<String>,
    pub event_category: Option<String>,
    pub actor_id: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_event_type(mut self, event_type: &str) -> Self {
        self.event_type = Some(event_type.to_string());
        self
    }

    pub fn by_category(mut self, event_category: &str) -> Self {
        self.event_category = Some(event_category.to_string());
        self
    }

    pub fn by_actor(mut self, actor_id: &str) -> Self {
        self.actor_id = Some(actor_id.to_string());
        self
    }

    pub fn by_entity_type(mut self, entity_type: &str) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self
    }

    pub fn by_entity_id(mut self, entity_id: &str) -> Self {
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub fn by_entity(self, entity_type: &str, entity_id: &str) -> Self {
        self.by_entity_type(entity_type).by_entity_id(entity_id)
    }

    pub fn between(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reject malformed filters before touching the store.
    pub fn validate(&self) -> Result<()> {
        let text_filters = [
            ("eventType", &self.event_type),
            ("eventCategory", &self.event_category),
            ("actorId", &self.actor_id),
            ("entityType", &self.entity_type),
            ("entityId", &self.entity_id),
        ];
        for (name, value) in text_filters {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(LedgerError::blank_field(name));
            }
        }

        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(LedgerError::InvalidArgument(format!(
                    "startDate {} is after endDate {}",
                    start.to_rfc3339(),
                    end.to_rfc3339()
                )));
            }
        }

        if self.limit == Some(0) {
            return Err(LedgerError::InvalidArgument(
                "limit must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// An entry as returned to audit reviewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    #[serde(flatten)]
    pub entry: AuditEntry,
    pub actor_label: Option<String>,
}

/// Identity/profile lookup used to label actors.
#[async_trait]
pub trait ActorDirectory: Send + Sync {
    /// Human-readable label for an actor, if one is known.
    async fn display_name(&self, actor_id: &str) -> Result<Option<String>>;
}

/// Directory that knows nobody.
pub struct NoDirectory;

#[async_trait]
impl ActorDirectory for NoDirectory {
    async fn display_name(&self, _actor_id: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Fixed actor labels.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    labels: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, actor_id: &str, label: &str) -> Self {
        self.labels.insert(actor_id.to_string(), label.to_string());
        self
    }
}

#[async_trait]
impl ActorDirectory for StaticDirectory {
    async fn display_name(&self, actor_id: &str) -> Result<Option<String>> {
        Ok(self.labels.get(actor_id).cloned())
    }
}

/// Looks actors up in a `profiles(id, display_name)` table owned by the
/// surrounding application.
pub struct ProfileDirectory {
    pool: SqlitePool,
}

impl ProfileDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActorDirectory for ProfileDirectory {
    async fn display_name(&self, actor_id: &str) -> Result<Option<String>> {
        let label: Option<Option<String>> =
            sqlx::query_scalar("SELECT display_name FROM profiles WHERE id = ?")
                .bind(actor_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(label.flatten())
    }
}

#[derive(Clone)]
pub struct QueryEngine {
    database: Database,
    directory: Arc<dyn ActorDirectory>,
    default_limit: u32,
    max_limit: u32,
    lookup_timeout: Duration,
}

impl QueryEngine {
    pub fn new(database: Database, directory: Arc<dyn ActorDirectory>) -> Self {
        Self {
            database,
            directory,
            default_limit: DEFAULT_QUERY_LIMIT,
            max_limit: MAX_QUERY_LIMIT,
            lookup_timeout: Duration::from_millis(DEFAULT_ACTOR_LOOKUP_TIMEOUT_MS),
        }
    }

    pub fn with_limits(mut self, default_limit: u32, max_limit: u32) -> Self {
        self.max_limit = max_limit.max(1);
        self.default_limit = default_limit.clamp(1, self.max_limit);
        self
    }

    /// Upper bound on a single actor lookup.
    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }

    /// Limit actually applied: the default when unset, clamped to the maximum.
    pub fn effective_limit(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.default_limit).min(self.max_limit)
    }

    pub async fn query(&self, filter: &AuditQuery) -> Result<Vec<AuditRecord>> {
        filter.validate()?;
        let limit = self.effective_limit(filter.limit);

        let rows = Queries::query_entries(self.database.pool(), filter, limit).await?;
        let entries = rows
            .into_iter()
            .map(|row| row.into_entry())
            .collect::<Result<Vec<_>>>()?;

        let labels = self.resolve_labels(&entries).await;
        debug!("Audit query returned {} entries (limit {})", entries.len(), limit);

        Ok(entries
            .into_iter()
            .map(|entry| {
                let actor_label = entry
                    .actor_id
                    .as_ref()
                    .and_then(|actor| labels.get(actor).cloned().flatten());
                AuditRecord { entry, actor_label }
            })
            .collect())
    }

    // Each distinct actor is looked up once; failures and timeouts leave the
    // label empty.
    async fn resolve_labels(&self, entries: &[AuditEntry]) -> HashMap<String, Option<String>> {
        let mut labels = HashMap::new();
        for actor in entries.iter().filter_map(|e| e.actor_id.as_ref()) {
            if labels.contains_key(actor) {
                continue;
            }
            let label = match timeout(self.lookup_timeout, self.directory.display_name(actor)).await {
                Ok(Ok(label)) => label,
                Ok(Err(e)) => {
                    warn!("Actor lookup failed for {}: {}", actor, e);
                    None
                }
                Err(_) => {
                    warn!(
                        "Actor lookup for {} timed out after {:?}",
                        actor, self.lookup_timeout
                    );
                    None
                }
            };
            labels.insert(actor.clone(), label);
        }
        labels
    }
}
