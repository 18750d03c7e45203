//! Entry reconciliation endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};
use dirstate_api::requests::{ApplyQuery, BatchRequest, EntryRequest, RemoveRequest};
use dirstate_api::responses::{ApplyReport, BatchReport, PlanResponse};
use dirstate_core::{ApplyBatch, ApplyEntry, EntrySpec, PlanEntry, RemoveEntry};
use dirstate_ldap::Dn;

use crate::api::error::AppError;
use crate::state::AppState;

/// Converge one entry
///
/// # Errors
/// Returns `AppError` for invalid entries and directory failures
#[utoipa::path(
    post,
    path = "/entries",
    params(ApplyQuery),
    request_body = EntryRequest,
    responses(
        (status = 200, description = "Entry reconciled", body = ApplyReport),
        (status = 400, description = "Invalid entry", body = crate::api::error::ApiError),
        (status = 409, description = "Directory rejected the change", body = crate::api::error::ApiError),
        (status = 503, description = "Directory unreachable", body = crate::api::error::ApiError)
    ),
    tag = "Entries"
)]
pub async fn apply_entry(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ApplyQuery>,
    Json(request): Json<EntryRequest>,
) -> Result<Json<ApplyReport>, AppError> {
    let spec = EntrySpec::try_from(request)?;

    let report = state
        .directory
        .ask(ApplyEntry {
            spec,
            check_mode: query.check_mode,
        })
        .await
        .map_err(AppError::from_send)?;

    Ok(Json(report))
}

/// Show what applying an entry would change
///
/// # Errors
/// Returns `AppError` for invalid entries and directory failures
#[utoipa::path(
    post,
    path = "/entries/plan",
    request_body = EntryRequest,
    responses(
        (status = 200, description = "Change plan", body = PlanResponse),
        (status = 400, description = "Invalid entry", body = crate::api::error::ApiError)
    ),
    tag = "Entries"
)]
pub async fn plan_entry(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EntryRequest>,
) -> Result<Json<PlanResponse>, AppError> {
    let spec = EntrySpec::try_from(request)?;

    let plan = state
        .directory
        .ask(PlanEntry { spec })
        .await
        .map_err(AppError::from_send)?;

    Ok(Json(plan))
}

/// Converge several independent entries
///
/// Entries that fail are reported individually; the request itself succeeds.
///
/// # Errors
/// Returns `AppError` if any entry cannot be parsed
#[utoipa::path(
    post,
    path = "/entries/batch",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Per-entry results", body = BatchReport),
        (status = 400, description = "Invalid entry", body = crate::api::error::ApiError)
    ),
    tag = "Entries"
)]
pub async fn apply_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchReport>, AppError> {
    let specs = request
        .entries
        .into_iter()
        .map(EntrySpec::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let report = state
        .directory
        .ask(ApplyBatch {
            specs,
            batch_size: request.batch_size,
            check_mode: request.check_mode,
        })
        .await
        .map_err(AppError::from_send)?;

    Ok(Json(report))
}

/// Ensure an entry does not exist
///
/// # Errors
/// Returns `AppError` for malformed DNs and directory failures
#[utoipa::path(
    post,
    path = "/entries/remove",
    request_body = RemoveRequest,
    responses(
        (status = 200, description = "Entry removed or already absent", body = ApplyReport),
        (status = 400, description = "Malformed DN", body = crate::api::error::ApiError)
    ),
    tag = "Entries"
)]
pub async fn remove_entry(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RemoveRequest>,
) -> Result<Json<ApplyReport>, AppError> {
    let dn = Dn::parse(&request.dn).map_err(|e| AppError::bad_request(e.to_string()))?;

    let report = state
        .directory
        .ask(RemoveEntry {
            dn,
            check_mode: request.check_mode,
        })
        .await
        .map_err(AppError::from_send)?;

    Ok(Json(report))
}
