//! Sync trigger and history endpoints.

use axum::body::Bytes;
use axum::extract::{Query, State};
use serde::Deserialize;

use crate::error::Error;

use super::{ok, ok_with_message, parse_body, ApiError, ApiResult, AppState};

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ManualSyncRequest {
    employee_id: Option<String>,
}

/// POST /api/sync/manual
///
/// Body `{ "employee_id": "..." }` syncs one employee; an empty body (or
/// `{}`) syncs every employee currently authorized. The caller waits for
/// the run to finish.
pub async fn manual(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let req: ManualSyncRequest = if body.is_empty() {
        ManualSyncRequest::default()
    } else {
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| ApiError(Error::validation(format!("invalid request body: {}", e))))?;
        if value.is_null() {
            ManualSyncRequest::default()
        } else {
            parse_body(value)?
        }
    };

    let outcome = state
        .orchestrator
        .run_manual(req.employee_id.as_deref())
        .await?;

    let message = format!(
        "sync finished: {} succeeded, {} failed",
        outcome.success_count, outcome.failed_count
    );
    Ok(ok_with_message(outcome, message))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

/// GET /api/sync/history?limit=20
pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult {
    let limit = query.limit.unwrap_or(20).min(200);
    Ok(ok(state.sync_records.history(limit)?))
}
