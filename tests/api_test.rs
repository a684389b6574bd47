//! HTTP surface tests

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use audit_ledger::api;
use audit_ledger::audit::NewAuditEvent;

mod common;
use common::*;

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let (ledger, _database) = setup_test_ledger().await;
    let (status, body) = get(api::router(ledger), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_list_entries_with_filters() {
    let (ledger, _database) = setup_test_ledger().await;
    ledger.append_entry(vote_event("alice", "p1", "yes")).await.unwrap();
    ledger.append_entry(vote_event("bob", "p2", "no")).await.unwrap();

    let (status, body) = get(
        api::router(ledger),
        "/audit?eventCategory=governance&entityId=p2&limit=10",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["actorId"], "bob");
    assert_eq!(records[0]["affectedEntityId"], "p2");
    assert_eq!(records[0]["eventData"], json!({ "choice": "no" }));
    assert_eq!(records[0]["eventHash"].as_str().unwrap().len(), 64);
    assert!(records[0]["actorLabel"].is_null());
}

#[tokio::test]
async fn test_list_entries_rejects_bad_date() {
    let (ledger, _database) = setup_test_ledger().await;
    let (status, body) = get(api::router(ledger), "/audit?startDate=not-a-date").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("startDate"));
}

#[tokio::test]
async fn test_list_entries_rejects_zero_limit() {
    let (ledger, _database) = setup_test_ledger().await;
    let (status, _body) = get(api::router(ledger), "/audit?limit=0").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_entries_rejects_malformed_limit_with_json_error() {
    for uri in ["/audit?limit=abc", "/audit?limit=-1", "/audit?limit=1.5"] {
        let (ledger, _database) = setup_test_ledger().await;
        let (status, body) = get(api::router(ledger), uri).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["error"].as_str().unwrap().contains("limit"), "{}", uri);
    }
}

#[tokio::test]
async fn test_verify_reports_tampering() {
    let (ledger, database) = setup_test_ledger().await;
    ledger.append_entry(login_event("alice")).await.unwrap();
    let id = ledger.append_entry(login_event("bob")).await.unwrap();

    let (status, body) = get(api::router(ledger.clone()), "/audit/verify").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isChainValid"], true);
    assert_eq!(body["totalEntries"], 2);
    assert_eq!(body["invalidEntries"], 0);

    tamper_event_data(&database, id, r#"{"method":"sso"}"#).await;

    let (status, body) = get(api::router(ledger), "/audit/verify").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isChainValid"], false);
    assert_eq!(body["invalidEntries"], 1);
    assert_eq!(body["results"][1]["entryId"], id);
    assert_eq!(body["results"][1]["hashValid"], false);
}

#[tokio::test]
async fn test_verify_rejects_reversed_range() {
    let (ledger, _database) = setup_test_ledger().await;
    let (status, _body) = get(
        api::router(ledger),
        "/audit/verify?startDate=2024-02-01&endDate=2024-01-01",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_head() {
    let (ledger, _database) = setup_test_ledger().await;
    let id = ledger
        .append_entry(NewAuditEvent::new("role_granted", "administration").actor("root"))
        .await
        .unwrap();

    let (status, body) = get(api::router(ledger), "/audit/head").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entryId"], id);
    assert_eq!(body["totalEntries"], 1);
}

#[tokio::test]
async fn test_storage_failure_maps_to_service_unavailable() {
    let (ledger, database) = setup_test_ledger().await;
    database.close().await;

    let (status, body) = get(api::router(ledger), "/audit").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
}
