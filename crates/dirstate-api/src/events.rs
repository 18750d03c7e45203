//! Directory event types

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type")]
pub enum DirectoryEvent {
    EntryCreated {
        dn: String,
    },
    EntryUpdated {
        dn: String,
        modifications: usize,
    },
    EntryRemoved {
        dn: String,
    },
    ReconcileFailed {
        dn: String,
        error: String,
    },
    InventoryBuilt {
        groups: usize,
        hosts: usize,
        warnings: usize,
    },
}
