//! Inventory endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use dirstate_api::inventory::{HostVarsDocument, InventoryResponse};
use dirstate_core::BuildInventory;

use crate::api::error::AppError;
use crate::state::AppState;

/// Build a fresh inventory
///
/// # Errors
/// Returns `AppError` if inventory building is not configured
#[utoipa::path(
    get,
    path = "/inventory",
    responses(
        (status = 200, description = "Inventory with build warnings and errors", body = InventoryResponse),
        (status = 501, description = "Inventory not configured", body = crate::api::error::ApiError)
    ),
    tag = "Inventory"
)]
pub async fn get_inventory(
    State(state): State<Arc<AppState>>,
) -> Result<Json<InventoryResponse>, AppError> {
    let response = state
        .directory
        .ask(BuildInventory)
        .await
        .map_err(AppError::from_send)?;

    Ok(Json(response))
}

/// Variables of one host
///
/// Unknown hosts yield an empty object.
///
/// # Errors
/// Returns `AppError` if inventory building is not configured
#[utoipa::path(
    get,
    path = "/inventory/hosts/{host}",
    params(("host" = String, Path, description = "Inventory host name")),
    responses(
        (status = 200, description = "Host variables", body = serde_json::Value),
        (status = 501, description = "Inventory not configured", body = crate::api::error::ApiError)
    ),
    tag = "Inventory"
)]
pub async fn get_host_vars(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
) -> Result<Json<HostVarsDocument>, AppError> {
    let response = state
        .directory
        .ask(BuildInventory)
        .await
        .map_err(AppError::from_send)?;

    Ok(Json(response.inventory.host(&host)))
}
