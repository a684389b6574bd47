use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;
use tracing::info;

use crate::api::parse_date_param;
use crate::audit::{AuditLedger, AuditQuery, AuditRecord, ChainHead, DateRange, VerificationReport};
use crate::error::LedgerError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub event_type: Option<String>,
    pub event_category: Option<String>,
    pub actor_id: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    // Parsed here so a malformed value gets the JSON error body.
    pub limit: Option<String>,
}

impl ListParams {
    fn into_query(self) -> Result<AuditQuery, LedgerError> {
        Ok(AuditQuery {
            event_type: self.event_type,
            event_category: self.event_category,
            actor_id: self.actor_id,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            start_date: self
                .start_date
                .as_deref()
                .map(|v| parse_date_param("startDate", v))
                .transpose()?,
            end_date: self
                .end_date
                .as_deref()
                .map(|v| parse_date_param("endDate", v))
                .transpose()?,
            limit: self.limit.as_deref().map(parse_limit).transpose()?,
        })
    }
}

fn parse_limit(value: &str) -> Result<u32, LedgerError> {
    value.parse().map_err(|_| {
        LedgerError::InvalidArgument(format!("limit must be a positive integer: {}", value))
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl VerifyParams {
    fn into_range(self) -> Result<Option<DateRange>, LedgerError> {
        let start = self
            .start_date
            .as_deref()
            .map(|v| parse_date_param("startDate", v))
            .transpose()?;
        let end = self
            .end_date
            .as_deref()
            .map(|v| parse_date_param("endDate", v))
            .transpose()?;

        if start.is_none() && end.is_none() {
            return Ok(None);
        }
        DateRange::new(start, end).map(Some)
    }
}

pub async fn list_entries(
    State(ledger): State<AuditLedger>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<AuditRecord>>, LedgerError> {
    let query = params.into_query()?;
    let records = ledger.query(&query).await?;
    Ok(Json(records))
}

pub async fn verify_chain(
    State(ledger): State<AuditLedger>,
    Query(params): Query<VerifyParams>,
) -> Result<Json<VerificationReport>, LedgerError> {
    let range = params.into_range()?;
    let report = ledger.verify(range).await?;
    info!("Verification requested: {}", report.summary());
    Ok(Json(report))
}

pub async fn chain_head(State(ledger): State<AuditLedger>) -> Result<Json<ChainHead>, LedgerError> {
    Ok(Json(ledger.head().await?))
}
