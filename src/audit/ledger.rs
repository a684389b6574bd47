//! Audit Ledger
//!
//! The single entry point producers and reviewers share: appends go to the
//! chain writer, reads go straight to the store.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::audit::entry::NewAuditEvent;
use crate::audit::query::{ActorDirectory, AuditQuery, AuditRecord, NoDirectory, QueryEngine};
use crate::audit::verify::{ChainVerifier, DateRange, VerificationReport};
use crate::audit::writer::ChainWriter;
use crate::config::AppConfig;
use crate::database::queries::Queries;
use crate::database::Database;
use crate::error::Result;

/// The value to publish when anchoring the ledger externally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainHead {
    pub entry_id: Option<i64>,
    pub event_hash: String,
    pub total_entries: i64,
}

#[derive(Clone)]
pub struct AuditLedger {
    database: Database,
    writer: ChainWriter,
    verifier: ChainVerifier,
    queries: QueryEngine,
}

impl AuditLedger {
    /// Start a ledger over a migrated database.
    pub fn open(database: Database, config: &AppConfig) -> (Self, JoinHandle<()>) {
        Self::open_with_directory(database, config, Arc::new(NoDirectory))
    }

    pub fn open_with_directory(
        database: Database,
        config: &AppConfig,
        directory: Arc<dyn ActorDirectory>,
    ) -> (Self, JoinHandle<()>) {
        let (writer, handle) = ChainWriter::spawn(database.clone(), config.audit_writer_queue_depth);
        let verifier = ChainVerifier::new(database.clone());
        let queries = QueryEngine::new(database.clone(), directory)
            .with_limits(config.audit_default_query_limit, config.audit_max_query_limit)
            .with_lookup_timeout(config.actor_lookup_timeout());

        let ledger = Self {
            database,
            writer,
            verifier,
            queries,
        };
        (ledger, handle)
    }

    pub async fn append_entry(&self, event: NewAuditEvent) -> Result<i64> {
        self.writer.append_entry(event).await
    }

    pub async fn record_best_effort(&self, event: NewAuditEvent) -> Option<i64> {
        self.writer.record_best_effort(event).await
    }

    pub async fn verify(&self, range: Option<DateRange>) -> Result<VerificationReport> {
        self.verifier.verify(range).await
    }

    pub async fn query(&self, filter: &AuditQuery) -> Result<Vec<AuditRecord>> {
        self.queries.query(filter).await
    }

    /// Current chain head as committed in the store.
    pub async fn head(&self) -> Result<ChainHead> {
        let pool = self.database.pool();
        let latest = Queries::latest_entry(pool).await?;
        let stats = Queries::stats(pool).await?;

        Ok(ChainHead {
            entry_id: latest.as_ref().map(|row| row.id),
            event_hash: latest.map(|row| row.event_hash).unwrap_or_default(),
            total_entries: stats.total_entries,
        })
    }
}
