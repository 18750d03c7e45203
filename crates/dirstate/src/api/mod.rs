//! API route handlers

pub mod entries;
pub mod error;
pub mod inventory;
pub mod system;

use dirstate_api::events::DirectoryEvent;
use dirstate_api::inventory::{GroupDocument, InventoryDocument, InventoryResponse, MetaDocument};
use dirstate_api::requests::{ApplyQuery, BatchRequest, EntryRequest, EntryState, RemoveRequest};
use dirstate_api::responses::{
    ApplyReport, BatchItem, BatchReport, EntryOutcome, ErrorBody, HealthResponse, PlanResponse,
};
use utoipa::OpenApi;

pub use error::{ApiError, AppError};

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        system::health,
        inventory::get_inventory,
        inventory::get_host_vars,
        entries::apply_entry,
        entries::plan_entry,
        entries::apply_batch,
        entries::remove_entry,
    ),
    components(
        schemas(
            HealthResponse,
            ApiError,
            EntryRequest,
            EntryState,
            ApplyQuery,
            BatchRequest,
            RemoveRequest,
            ApplyReport,
            EntryOutcome,
            PlanResponse,
            BatchItem,
            BatchReport,
            ErrorBody,
            InventoryResponse,
            InventoryDocument,
            GroupDocument,
            MetaDocument,
            DirectoryEvent,
        )
    ),
    tags(
        (name = "System", description = "Daemon status"),
        (name = "Entries", description = "Idempotent entry reconciliation"),
        (name = "Inventory", description = "Host group inventory"),
    ),
    info(
        title = "dirstate API",
        description = "Idempotent LDAP entry reconciliation and hostgroup inventory",
    )
)]
pub struct ApiDoc;
