//! Authorization endpoints: URL generation, code exchange, token CRUD.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::Error;
use crate::store::TokenData;

use super::{message_only, ok, ok_with_message, parse_body, ApiError, ApiResult, AppState};

#[derive(Deserialize)]
pub struct AuthUrlQuery {
    pub employee_id: String,
}

/// GET /api/auth/url?employee_id=...
///
/// Returns the URL the operator opens to walk the employee through the
/// provider's consent screen.
pub async fn authorize_url(
    State(state): State<AppState>,
    Query(query): Query<AuthUrlQuery>,
) -> ApiResult {
    let employee = state.employees.require(&query.employee_id)?;
    let url = state.auth.authorize_url(&employee.id);
    Ok(ok(json!({ "auth_url": url })))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExchangeRequest {
    code: String,
    employee_id: String,
}

/// POST /api/auth/access-token
///
/// Exchanges the callback's authorization code and persists the token for
/// the employee named in the request (which the callback's `state` carried).
pub async fn exchange(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let req: ExchangeRequest = parse_body(body)?;
    let employee = state.employees.require(&req.employee_id)?;

    let grant = state.auth.exchange_code(&req.code).await?;
    state.tokens.save(&employee.id, &grant)?;

    tracing::info!(
        employee_id = %employee.id,
        open_id = %grant.open_id,
        "Authorization completed"
    );

    // Profile fetch is informational only; a failure never undoes the grant
    match state
        .metrics
        .fetch_user_info(&grant.open_id, &grant.access_token)
        .await
    {
        Ok(profile) if !profile.nickname.is_empty() => {
            tracing::info!(employee_id = %employee.id, nickname = %profile.nickname, "Account profile fetched");
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(employee_id = %employee.id, error = %e, "Account profile fetch failed");
        }
    }

    Ok(ok_with_message(
        json!({
            "open_id": grant.open_id,
            "scope": grant.scope,
            "expires_in": grant.expires_in,
        }),
        "authorization successful",
    ))
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GET /auth/callback
///
/// Landing point for the provider redirect. Echoes the code and the
/// round-tripped `state` (the employee id) back to the UI, which completes
/// the exchange through POST /api/auth/access-token. The state value is
/// taken at face value — it is not checked against anything issued earlier.
pub async fn callback(Query(query): Query<CallbackQuery>) -> ApiResult {
    if let Some(error) = query.error {
        let description = query
            .error_description
            .unwrap_or_else(|| "authorization was not granted".to_string());
        tracing::warn!(error = %error, description = %description, "Authorization callback failed");
        return Ok(Json(super::ApiResponse {
            success: false,
            data: None,
            message: Some(format!("authorization failed: {}: {}", error, description)),
        }));
    }

    let code = query
        .code
        .ok_or_else(|| ApiError(Error::validation("callback is missing the authorization code")))?;

    Ok(ok_with_message(
        json!({
            "code": code,
            "state": query.state,
        }),
        "authorization code received",
    ))
}

/// GET /api/auth/token/:employee_id
pub async fn get_token(State(state): State<AppState>, Path(employee_id): Path<String>) -> ApiResult {
    let token = state.tokens.get(&employee_id)?.ok_or_else(|| {
        ApiError(Error::not_found(format!(
            "no auth token stored for employee {}",
            employee_id
        )))
    })?;
    Ok(ok(token))
}

/// POST /api/auth/token/:employee_id
///
/// Stores an externally obtained token bundle for the employee.
pub async fn save_token(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let token: TokenData = parse_body(body)?;
    state.tokens.save(&employee_id, &token)?;
    Ok(message_only("token saved"))
}

/// DELETE /api/auth/token/:employee_id
pub async fn revoke(State(state): State<AppState>, Path(employee_id): Path<String>) -> ApiResult {
    state.employees.require(&employee_id)?;
    state.tokens.delete(&employee_id)?;
    tracing::info!(employee_id = %employee_id, "Authorization revoked");
    Ok(message_only("authorization revoked"))
}
