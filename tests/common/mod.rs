#![allow(dead_code)]

use audit_ledger::audit::{ActorDirectory, AuditLedger, NewAuditEvent};
use audit_ledger::config::AppConfig;
use audit_ledger::database::Database;
use serde_json::json;
use std::sync::Arc;

/// Setup an in-memory SQLite database for testing
pub async fn setup_test_db() -> Database {
    Database::new_in_memory().await.expect("Failed to create test database")
}

/// Ledger over a fresh in-memory database
pub async fn setup_test_ledger() -> (AuditLedger, Database) {
    let database = setup_test_db().await;
    let (ledger, _writer) = AuditLedger::open(database.clone(), &AppConfig::default());
    (ledger, database)
}

pub async fn setup_test_ledger_with_directory(
    directory: Arc<dyn ActorDirectory>,
) -> (AuditLedger, Database) {
    let database = setup_test_db().await;
    let (ledger, _writer) =
        AuditLedger::open_with_directory(database.clone(), &AppConfig::default(), directory);
    (ledger, database)
}

pub fn login_event(actor: &str) -> NewAuditEvent {
    NewAuditEvent::new("auth_login_success", "authentication")
        .actor(actor)
        .data(json!({ "method": "password" }))
        .unwrap()
}

pub fn vote_event(actor: &str, proposal: &str, choice: &str) -> NewAuditEvent {
    NewAuditEvent::new("vote_cast", "governance")
        .actor(actor)
        .entity("proposal", proposal)
        .data(json!({ "choice": choice }))
        .unwrap()
}

/// Overwrite a stored column the way someone with raw store access would.
pub async fn tamper_column(database: &Database, id: i64, column: &str, value: &str) {
    sqlx::query("DROP TRIGGER IF EXISTS audit_entries_no_update")
        .execute(database.pool())
        .await
        .unwrap();
    sqlx::query(&format!("UPDATE audit_entries SET {} = ? WHERE id = ?", column))
        .bind(value)
        .bind(id)
        .execute(database.pool())
        .await
        .unwrap();
}

pub async fn tamper_event_data(database: &Database, id: i64, event_data: &str) {
    tamper_column(database, id, "event_data", event_data).await;
}
