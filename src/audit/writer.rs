//! Chain Writer
//!
//! The only code path that reads and advances the chain head. Appends are
//! funnelled through a bounded queue into one writer task, which links and
//! persists them strictly one at a time in arrival order.

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audit::entry::{canonical_json, compute_hash, short_hash, NewAuditEvent};
use crate::database::models::{to_micros, PendingEntry};
use crate::database::queries::Queries;
use crate::database::Database;
use crate::error::{LedgerError, Result};

struct AppendRequest {
    event: NewAuditEvent,
    reply: oneshot::Sender<Result<i64>>,
}

/// Handle used by producers to append entries.
///
/// Cloning the handle is cheap; the writer task stops once every handle has
/// been dropped and the queue is drained.
#[derive(Clone)]
pub struct ChainWriter {
    sender: mpsc::Sender<AppendRequest>,
}

impl ChainWriter {
    /// Start the writer task.
    pub fn spawn(database: Database, queue_depth: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(queue_depth.max(1));
        let task = WriterTask { database };
        let handle = tokio::spawn(task.run(receiver));

        info!("Chain writer started (queue depth {})", queue_depth.max(1));
        (Self { sender }, handle)
    }

    /// Append an event to the chain and return the new entry's id.
    ///
    /// Waits while earlier appends are in progress. Once the request has been
    /// queued it is carried out even if the caller stops waiting; it either
    /// commits completely or leaves no entry behind.
    pub async fn append_entry(&self, event: NewAuditEvent) -> Result<i64> {
        event.validate()?;
        canonical_json(&event.event_data)?;

        let (reply, response) = oneshot::channel();
        self.sender
            .send(AppendRequest { event, reply })
            .await
            .map_err(|_| LedgerError::writer_stopped())?;

        response.await.map_err(|_| LedgerError::writer_stopped())?
    }

    /// Append an event, logging instead of returning any failure.
    ///
    /// For producers whose primary action has already succeeded and must not
    /// be affected by the ledger being unavailable.
    pub async fn record_best_effort(&self, event: NewAuditEvent) -> Option<i64> {
        let event_type = event.event_type.clone();
        match self.append_entry(event).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Failed to record audit event {}: {}", event_type, e);
                None
            }
        }
    }
}

struct WriterTask {
    database: Database,
}

impl WriterTask {
    async fn run(self, mut receiver: mpsc::Receiver<AppendRequest>) {
        while let Some(request) = receiver.recv().await {
            let result = self.append(&request.event).await;
            if let Err(e) = &result {
                warn!("Audit append rejected ({}): {}", request.event.event_type, e);
            }
            // The caller may have given up waiting; the outcome stands either way.
            let _ = request.reply.send(result);
        }
        info!("Chain writer stopped");
    }

    async fn append(&self, event: &NewAuditEvent) -> Result<i64> {
        let event_data = canonical_json(&event.event_data)?;

        let mut tx = self.database.pool().begin().await?;

        let head = Queries::chain_head(&mut *tx).await?;
        let (previous_hash, created_at) = match &head {
            Some(head) => {
                // Strictly after the head even if the wall clock stepped back.
                let now = to_micros(Utc::now());
                (head.event_hash.clone(), now.max(head.created_at + 1))
            }
            None => (String::new(), to_micros(Utc::now())),
        };

        let event_hash = compute_hash(
            &previous_hash,
            &event.event_type,
            event.actor_id.as_deref(),
            &event.event_data,
        )?;

        let pending = PendingEntry {
            event_type: &event.event_type,
            event_category: &event.event_category,
            actor_id: event.actor_id.as_deref(),
            affected_entity_type: event.entity_type.as_deref(),
            affected_entity_id: event.entity_id.as_deref(),
            event_data: &event_data,
            event_hash: &event_hash,
            previous_hash: &previous_hash,
            created_at,
        };
        let id = Queries::insert_entry(&mut *tx, &pending).await?;

        tx.commit().await?;

        debug!(
            "Appended audit entry #{} {} ({} -> {})",
            id,
            event.event_type,
            short_hash(&previous_hash),
            short_hash(&event_hash)
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn writer() -> (ChainWriter, Database) {
        let database = Database::new_in_memory().await.unwrap();
        let (writer, _handle) = ChainWriter::spawn(database.clone(), 16);
        (writer, database)
    }

    #[tokio::test]
    async fn test_genesis_entry_has_empty_previous_hash() {
        let (writer, database) = writer().await;

        let id = writer
            .append_entry(NewAuditEvent::new("auth_login_success", "authentication").actor("u1"))
            .await
            .unwrap();

        let row = Queries::get_entry(database.pool(), id).await.unwrap().unwrap();
        assert_eq!(row.previous_hash, "");
        assert_eq!(row.event_hash.len(), 64);
    }

    #[tokio::test]
    async fn test_entries_link_to_previous_head() {
        let (writer, database) = writer().await;

        let first = writer
            .append_entry(NewAuditEvent::new("a", "t").data(json!({"n": 1})).unwrap())
            .await
            .unwrap();
        let second = writer
            .append_entry(NewAuditEvent::new("b", "t").data(json!({"n": 2})).unwrap())
            .await
            .unwrap();
        assert!(second > first);

        let first = Queries::get_entry(database.pool(), first).await.unwrap().unwrap();
        let second = Queries::get_entry(database.pool(), second).await.unwrap().unwrap();
        assert_eq!(second.previous_hash, first.event_hash);
        assert!(second.created_at > first.created_at);
    }

    #[tokio::test]
    async fn test_invalid_event_is_rejected_before_queueing() {
        let (writer, database) = writer().await;

        let result = writer.append_entry(NewAuditEvent::new("", "t")).await;
        assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));

        let stats = Queries::stats(database.pool()).await.unwrap();
        assert_eq!(stats.total_entries, 0);
    }

    #[tokio::test]
    async fn test_closed_store_reports_storage_unavailable() {
        let (writer, database) = writer().await;
        database.close().await;

        let result = writer.append_entry(NewAuditEvent::new("a", "t")).await;
        assert!(matches!(result, Err(LedgerError::StorageUnavailable(_))));
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let (writer, database) = writer().await;
        database.close().await;

        assert_eq!(writer.record_best_effort(NewAuditEvent::new("a", "t")).await, None);
    }
}
