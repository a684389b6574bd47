//! Opening an existing ledger for review

use audit_ledger::audit::{AuditLedger, ChainVerifier};
use audit_ledger::config::AppConfig;
use audit_ledger::database::Database;
use audit_ledger::LedgerError;

mod common;
use common::*;

fn ledger_url(dir: &tempfile::TempDir, name: &str) -> String {
    format!("sqlite://{}", dir.path().join(name).display())
}

#[tokio::test]
async fn test_missing_ledger_is_not_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typo-ledger.db");

    let result = Database::open_existing(&ledger_url(&dir, "typo-ledger.db")).await;

    assert!(matches!(result, Err(LedgerError::StorageUnavailable(_))));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_database_without_ledger_table_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let url = ledger_url(&dir, "other.db");

    let other = Database::new(&url).await.unwrap();
    sqlx::query("CREATE TABLE notes (body TEXT)")
        .execute(other.pool())
        .await
        .unwrap();

    let result = Database::open_existing(&url).await;
    assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));
    other.close().await;
}

#[tokio::test]
async fn test_existing_ledger_verifies_without_being_modified() {
    let dir = tempfile::tempdir().unwrap();
    let url = ledger_url(&dir, "ledger.db");

    let database = Database::new(&url).await.unwrap();
    database.run_migrations().await.unwrap();
    let (ledger, _writer) = AuditLedger::open(database.clone(), &AppConfig::default());
    ledger.append_entry(login_event("alice")).await.unwrap();
    let id = ledger.append_entry(login_event("bob")).await.unwrap();
    tamper_event_data(&database, id, r#"{"method":"sso"}"#).await;

    let review = Database::open_existing(&url).await.unwrap();
    let report = ChainVerifier::new(review.clone()).verify(None).await.unwrap();
    assert!(!report.is_chain_valid);
    assert_eq!(report.total_entries, 2);
    assert_eq!(report.invalid_entries, 1);

    // The dropped trigger is evidence; opening for review must not restore it.
    let (triggers,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger' AND name = 'audit_entries_no_update'",
    )
    .fetch_one(review.pool())
    .await
    .unwrap();
    assert_eq!(triggers, 0);

    let write = sqlx::query("DELETE FROM audit_entries")
        .execute(review.pool())
        .await;
    assert!(write.is_err());

    review.close().await;
    database.close().await;
}
