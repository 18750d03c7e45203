//! HTTP router configuration

use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{get, post},
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api::{ApiDoc, entries, inventory, system};
use crate::state::AppState;

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // System endpoints
        .route("/health", get(system::health))
        // Inventory
        .route("/inventory", get(inventory::get_inventory))
        .route("/inventory/hosts/{host}", get(inventory::get_host_vars))
        // Entries
        .route("/entries", post(entries::apply_entry))
        .route("/entries/plan", post(entries::plan_entry))
        .route("/entries/batch", post(entries::apply_batch))
        .route("/entries/remove", post(entries::remove_entry))
        // API docs
        .route("/api-doc/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        // State
        .with_state(state)
}
