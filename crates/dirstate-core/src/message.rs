//! Message types for actor communication
//!
//! Message handlers are implemented in the actor module.

use dirstate_ldap::Dn;
use kameo_macros::Reply;

use crate::config::EntrySpec;

// ============================================================================
// Entry Messages
// ============================================================================

/// Converge one entry to its declared state
#[derive(Debug)]
pub struct ApplyEntry {
    pub spec: EntrySpec,
    /// If true, only report what would change
    pub check_mode: bool,
}

/// Ensure one entry does not exist
#[derive(Debug)]
pub struct RemoveEntry {
    pub dn: Dn,
    /// If true, only report whether the entry would be deleted
    pub check_mode: bool,
}

/// Compute the change plan for one entry without writing
#[derive(Debug)]
pub struct PlanEntry {
    pub spec: EntrySpec,
}

/// Converge several independent entries
#[derive(Debug)]
pub struct ApplyBatch {
    pub specs: Vec<EntrySpec>,
    /// Entries processed in parallel; the reconciler default when `None`
    pub batch_size: Option<usize>,
    pub check_mode: bool,
}

// ============================================================================
// Inventory Messages
// ============================================================================

/// Build a fresh inventory from the configured roots
#[derive(Debug)]
pub struct BuildInventory;

// ============================================================================
// Status
// ============================================================================

/// Get actor status
#[derive(Debug)]
pub struct GetStatus;

/// Actor status
#[derive(Debug, Clone, Reply)]
pub struct ActorStatus {
    /// Directory client in use
    pub client: String,
    /// Whether inventory building is configured
    pub inventory_configured: bool,
    /// Entries changed since start
    pub changed: u64,
    /// Entries that failed since start
    pub failed: u64,
}
