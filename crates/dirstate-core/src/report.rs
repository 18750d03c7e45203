//! Conversions into API documents

use std::collections::BTreeMap;

use chrono::Utc;
use dirstate_api::inventory::{GroupDocument, InventoryDocument, InventoryResponse, MetaDocument};
use dirstate_api::responses::{ErrorBody, PlanResponse};
use dirstate_inventory::{Inventory, InventoryBuild, RESERVED_GROUP_NAMES};
use dirstate_ldap::Dn;

use crate::diff::DiffPlan;
use crate::error::ReconcileError;

/// Group that holds every host and every other group
pub const ALL_GROUP: &str = "all";

/// Render an inventory as a dynamic inventory document
///
/// Adds the `all` group and collects host variables under `_meta`. Groups
/// named like either reserved key are left out.
#[must_use]
pub fn inventory_document(inventory: &Inventory) -> InventoryDocument {
    let mut groups = BTreeMap::new();
    let mut hostvars = BTreeMap::new();

    for (name, group) in &inventory.groups {
        if RESERVED_GROUP_NAMES.contains(&name.as_str()) {
            continue;
        }
        groups.insert(
            name.clone(),
            GroupDocument {
                hosts: group.hosts.iter().cloned().collect(),
                vars: BTreeMap::new(),
                children: group.children.iter().cloned().collect(),
            },
        );
    }

    for host in inventory.hosts() {
        let vars = inventory.host_vars(&host).unwrap_or_default();
        hostvars.insert(host, vars);
    }

    let all = GroupDocument {
        hosts: hostvars.keys().cloned().collect(),
        vars: BTreeMap::new(),
        children: groups.keys().cloned().collect(),
    };
    groups.insert(ALL_GROUP.to_string(), all);

    InventoryDocument {
        groups,
        meta: MetaDocument { hostvars },
    }
}

/// Inventory document plus the problems met while building it
#[must_use]
pub fn inventory_response(build: &InventoryBuild) -> InventoryResponse {
    InventoryResponse {
        inventory: inventory_document(&build.inventory),
        warnings: build.warnings.iter().map(ToString::to_string).collect(),
        errors: build.errors.iter().map(ToString::to_string).collect(),
        generated_at: build.inventory.generated_at,
    }
}

/// Plan as returned to callers
#[must_use]
pub fn plan_response(dn: &Dn, plan: &DiffPlan) -> PlanResponse {
    PlanResponse {
        dn: dn.to_string(),
        create: plan.is_create(),
        modifications: if plan.is_empty() {
            Vec::new()
        } else {
            plan.describe()
        },
    }
}

/// Error as reported per entry
#[must_use]
pub fn error_body(error: &ReconcileError) -> ErrorBody {
    ErrorBody {
        kind: error.kind().to_string(),
        message: error.to_string(),
    }
}

/// Response for an inventory with no groups
#[must_use]
pub fn empty_inventory_response() -> InventoryResponse {
    InventoryResponse {
        inventory: inventory_document(&Inventory::new()),
        warnings: Vec::new(),
        errors: Vec::new(),
        generated_at: Utc::now(),
    }
}
