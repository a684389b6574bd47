pub mod audit;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::audit::AuditLedger;
use crate::error::LedgerError;

pub fn router(ledger: AuditLedger) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/audit", get(audit::list_entries))
        .route("/audit/verify", get(audit::verify_chain))
        .route("/audit/head", get(audit::chain_head))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(ledger)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "audit-ledger",
        "timestamp": Utc::now()
    }))
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = match &self {
            LedgerError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            LedgerError::InvalidPayload(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Audit request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date_param(name: &str, value: &str) -> Result<DateTime<Utc>, LedgerError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| LedgerError::InvalidArgument(format!("{} is not a valid date: {}", name, value)))
}
