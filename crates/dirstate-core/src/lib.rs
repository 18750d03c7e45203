//! dirstate-core: Reconciliation and orchestration logic
//!
//! Computes minimal change plans between desired and observed entries,
//! applies them idempotently, and exposes both the reconciler and inventory
//! building through the `DirectoryActor`.

pub mod actor;
pub mod config;
pub mod diff;
pub mod error;
pub mod message;
pub mod reconcile;
pub mod report;

pub use actor::{DirectoryActor, DirectoryActorArgs, InventorySource};
pub use config::{DesiredEntry, EntryFile, EntrySpec, ReconcileConfig};
pub use diff::{AttributeComparator, DiffPlan, compute_diff};
pub use error::ReconcileError;
pub use message::{
    ActorStatus, ApplyBatch, ApplyEntry, BuildInventory, GetStatus, PlanEntry, RemoveEntry,
};
pub use reconcile::{ApplyOutcome, Applied, Reconciler, RemoveOutcome, remove_report};
pub use report::{
    ALL_GROUP, empty_inventory_response, error_body, inventory_document, inventory_response,
    plan_response,
};
