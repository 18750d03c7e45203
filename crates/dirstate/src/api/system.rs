//! System endpoints

use std::sync::Arc;

use axum::{Json, extract::State};
use dirstate_api::responses::HealthResponse;
use dirstate_core::GetStatus;

use crate::api::error::AppError;
use crate::state::AppState;

/// Health check
///
/// # Errors
/// Returns `AppError` if the directory actor is not running
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Daemon is running", body = HealthResponse),
        (status = 503, description = "Directory actor unavailable", body = crate::api::error::ApiError)
    ),
    tag = "System"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    let status = state.directory.ask(GetStatus).await.map_err(|_| {
        AppError::new(
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "ACTOR_UNAVAILABLE",
            "directory actor is not running",
        )
    })?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        client: status.client,
    }))
}
