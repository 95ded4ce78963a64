//! HTTP API consumed by the dashboard UI.
//!
//! Every business endpoint answers with the `{ success, data?, message? }`
//! envelope. Status conventions: 400 for missing/invalid input, 404 for a
//! missing entity, 502 for transport failures reaching the provider, 500
//! for anything unexpected — and 200 with `success: false` for
//! business-logic failures (a provider rejection is not a transport error).

pub mod auth;
pub mod data;
pub mod employees;
pub mod sync;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::douyin::{AuthFlow, MetricsClient};
use crate::error::Error;
use crate::store::{
    Database, EmployeeStore, SettingsStore, SnapshotStore, SyncRecordStore, TokenStore, VideoStore,
};
use crate::sync::SyncOrchestrator;

/// Shared application state, constructed once in `main` and injected
/// everywhere — there are no process-wide singletons.
#[derive(Clone)]
pub struct AppState {
    pub employees: EmployeeStore,
    pub tokens: TokenStore,
    pub snapshots: SnapshotStore,
    pub videos: VideoStore,
    pub sync_records: SyncRecordStore,
    pub settings: SettingsStore,
    pub auth: AuthFlow,
    pub metrics: MetricsClient,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub database: Database,
}

/// The response envelope shared by every business endpoint.
#[derive(Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub(crate) fn ok(data: impl Serialize) -> Json<ApiResponse> {
    Json(ApiResponse {
        success: true,
        data: Some(serde_json::to_value(data).expect("response serialization")),
        message: None,
    })
}

pub(crate) fn ok_with_message(data: impl Serialize, message: impl Into<String>) -> Json<ApiResponse> {
    Json(ApiResponse {
        success: true,
        data: Some(serde_json::to_value(data).expect("response serialization")),
        message: Some(message.into()),
    })
}

pub(crate) fn message_only(message: impl Into<String>) -> Json<ApiResponse> {
    Json(ApiResponse {
        success: true,
        data: None,
        message: Some(message.into()),
    })
}

/// Error-to-response mapping for the envelope conventions above.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            // Business-logic failure: transport succeeded, the provider said no
            Error::Upstream { .. } => (StatusCode::OK, self.0.to_string()),
            Error::Transport(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            Error::Database(e) => {
                tracing::error!(error = %e, "Database failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            Error::Internal(msg) => {
                tracing::error!(error = %msg, "Internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(ApiResponse {
            success: false,
            data: None,
            message: Some(message),
        });
        (status, body).into_response()
    }
}

pub(crate) type ApiResult = Result<Json<ApiResponse>, ApiError>;

/// Parse a JSON body into `T`, turning any shape mismatch (missing or
/// unknown fields included) into a 400 with a readable message.
pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(
    body: serde_json::Value,
) -> Result<T, ApiError> {
    serde_json::from_value(body)
        .map_err(|e| ApiError(Error::validation(format!("invalid request body: {}", e))))
}

/// Build the full router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/employees",
            get(employees::list).post(employees::create),
        )
        .route(
            "/api/employees/:id",
            get(employees::get_one)
                .put(employees::update)
                .delete(employees::remove),
        )
        .route("/api/auth/url", get(auth::authorize_url))
        .route("/api/auth/access-token", post(auth::exchange))
        .route("/auth/callback", get(auth::callback))
        .route(
            "/api/auth/token/:employee_id",
            get(auth::get_token)
                .post(auth::save_token)
                .delete(auth::revoke),
        )
        .route("/api/sync/manual", post(sync::manual))
        .route("/api/sync/history", get(sync::history))
        .route("/api/data/user/:employee_id", get(data::latest_user_data))
        .route(
            "/api/data/user/:employee_id/history",
            get(data::user_history),
        )
        .route("/api/data/video/:employee_id", get(data::videos))
        .route("/api/statistics", get(data::statistics))
        .route("/api/config/:key", get(data::get_config))
        .route("/api/config", post(data::set_config))
        .route("/api/export", get(data::export))
        .route("/api/data/clear", delete(data::clear))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(_state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "database": "connected",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
