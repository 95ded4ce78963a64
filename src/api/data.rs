//! Data query endpoints: snapshots, videos, statistics, settings, export.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::Error;

use super::{message_only, ok, parse_body, ApiError, ApiResult, AppState};

/// GET /api/data/user/:employee_id — most recent snapshot.
pub async fn latest_user_data(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
) -> ApiResult {
    let snapshot = state.snapshots.latest(&employee_id)?.ok_or_else(|| {
        ApiError(Error::not_found(format!(
            "no metric data recorded for employee {}",
            employee_id
        )))
    })?;
    Ok(ok(snapshot))
}

#[derive(Deserialize)]
pub struct UserHistoryQuery {
    pub days: Option<i64>,
}

/// GET /api/data/user/:employee_id/history?days=30
pub async fn user_history(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
    Query(query): Query<UserHistoryQuery>,
) -> ApiResult {
    let days = query.days.unwrap_or(30).clamp(1, 365);
    Ok(ok(state.snapshots.history(&employee_id, days)?))
}

#[derive(Deserialize)]
pub struct VideoQuery {
    pub limit: Option<u32>,
}

/// GET /api/data/video/:employee_id?limit=50
pub async fn videos(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
    Query(query): Query<VideoQuery>,
) -> ApiResult {
    let limit = query.limit.unwrap_or(50).min(500);
    Ok(ok(state.videos.list(&employee_id, limit)?))
}

/// GET /api/statistics
pub async fn statistics(State(state): State<AppState>) -> ApiResult {
    let mut stats = state.employees.statistics()?;
    stats.last_sync_time = state.settings.last_sync_time()?;
    Ok(ok(stats))
}

/// GET /api/config/:key
pub async fn get_config(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult {
    let value = state.settings.get(&key)?;
    Ok(ok(json!({ "key": key, "value": value })))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SetConfigRequest {
    key: String,
    value: String,
}

/// POST /api/config
pub async fn set_config(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let req: SetConfigRequest = parse_body(body)?;
    if req.key.trim().is_empty() {
        return Err(ApiError(Error::validation("config key must not be empty")));
    }
    state.settings.set(&req.key, &req.value)?;
    Ok(message_only("config saved"))
}

/// GET /api/export — raw dump of every table, keyed by table name.
pub async fn export(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(state.database.export_all()?))
}

/// DELETE /api/data/clear
pub async fn clear(State(state): State<AppState>) -> ApiResult {
    state.database.clear_all()?;
    tracing::warn!("All data cleared by operator request");
    Ok(message_only("all data cleared"))
}
