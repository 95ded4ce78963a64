//! Employee CRUD endpoints.

use axum::extract::{Path, State};
use axum::Json;

use crate::error::Error;
use crate::store::{EmployeeUpdate, NewEmployee};

use super::{message_only, ok, ok_with_message, parse_body, ApiError, ApiResult, AppState};

/// GET /api/employees
pub async fn list(State(state): State<AppState>) -> ApiResult {
    Ok(ok(state.employees.list()?))
}

/// POST /api/employees
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let new: NewEmployee = parse_body(body)?;
    let employee = state.employees.add(new)?;
    tracing::info!(employee_id = %employee.id, "Employee added");
    Ok(ok_with_message(employee, "employee added"))
}

/// GET /api/employees/:id
pub async fn get_one(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    Ok(ok(state.employees.require(&id)?))
}

/// PUT /api/employees/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let update: EmployeeUpdate = parse_body(body)?;
    let employee = state.employees.update(&id, &update)?;
    Ok(ok_with_message(employee, "employee updated"))
}

/// DELETE /api/employees/:id
pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    if !state.employees.delete(&id)? {
        return Err(ApiError(Error::not_found(format!(
            "employee {} not found",
            id
        ))));
    }
    tracing::info!(employee_id = %id, "Employee deleted");
    Ok(message_only("employee deleted"))
}
