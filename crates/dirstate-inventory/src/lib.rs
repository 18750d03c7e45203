//! dirstate-inventory: host inventories from directory group topology
//!
//! Walks nested host groups (group-of-groups, cycles included) and flattens
//! them into named inventory groups of hosts with per-host variables.

pub mod builder;
pub mod error;
pub mod naming;
pub mod types;
pub mod walker;

pub use builder::{HostVariableRules, InventoryBuilder, RESERVED_GROUP_NAMES};
pub use error::InventoryError;
pub use naming::NamingRules;
pub use types::{
    HostVars, Inventory, InventoryBuild, InventoryGroup, Resolution, ResolutionWarning,
    ResolvedHost, WarningKind,
};
pub use walker::{GraphWalker, WalkerConfig};
