//! Inventory type definitions

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use dirstate_ldap::{AttributeSet, Dn};
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;

/// Variables attached to one host
pub type HostVars = BTreeMap<String, serde_json::Value>;

// ============================================================================
// Resolution
// ============================================================================

/// What went wrong with a reference found during a walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A group lists a member that has no entry
    DanglingMember,
    /// A member value is not a valid DN
    MalformedMember,
    /// A root group has no entry
    MissingRoot,
}

/// Non-fatal problem found while walking the group graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionWarning {
    /// Kind of problem
    pub kind: WarningKind,
    /// Offending DN (or raw value for malformed members)
    pub dn: String,
    /// Group that referenced it; `None` for roots
    pub referenced_by: Option<Dn>,
}

impl ResolutionWarning {
    pub(crate) fn dangling(dn: &Dn, group: &Dn) -> Self {
        Self {
            kind: WarningKind::DanglingMember,
            dn: dn.to_string(),
            referenced_by: Some(group.clone()),
        }
    }

    pub(crate) fn malformed(value: &str, group: &Dn) -> Self {
        Self {
            kind: WarningKind::MalformedMember,
            dn: value.to_string(),
            referenced_by: Some(group.clone()),
        }
    }

    pub(crate) fn missing_root(dn: &Dn) -> Self {
        Self {
            kind: WarningKind::MissingRoot,
            dn: dn.to_string(),
            referenced_by: None,
        }
    }
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.referenced_by) {
            (WarningKind::MissingRoot, _) => write!(f, "root group '{}' does not exist", self.dn),
            (WarningKind::DanglingMember, Some(group)) => {
                write!(f, "member '{}' of '{group}' does not exist", self.dn)
            }
            (WarningKind::MalformedMember, Some(group)) => {
                write!(f, "member value '{}' of '{group}' is not a DN", self.dn)
            }
            (kind, None) => write!(f, "{kind:?}: {}", self.dn),
        }
    }
}

/// Host reached during a walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHost {
    /// Host entry DN
    pub dn: Dn,
    /// Shallowest depth at which the host was found; root members are depth 1
    pub depth: usize,
    /// Host attributes as read during the walk
    pub attributes: AttributeSet,
}

/// Result of one walk
///
/// Hosts appear in discovery order; only the set and each host's depth are
/// meaningful.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Hosts reachable from the roots, without duplicates
    pub hosts: Vec<ResolvedHost>,
    /// Groups that are direct members of a root
    pub nested_groups: Vec<Dn>,
    /// Every group expanded, roots included
    pub visited_groups: Vec<Dn>,
    /// Dangling and malformed references
    pub warnings: Vec<ResolutionWarning>,
}

impl Resolution {
    /// Check whether a host was reached
    #[must_use]
    pub fn contains(&self, dn: &Dn) -> bool {
        self.hosts.iter().any(|h| &h.dn == dn)
    }

    /// Look up a reached host
    #[must_use]
    pub fn host(&self, dn: &Dn) -> Option<&ResolvedHost> {
        self.hosts.iter().find(|h| &h.dn == dn)
    }

    /// Reached host DNs as a set
    #[must_use]
    pub fn host_dns(&self) -> BTreeSet<Dn> {
        self.hosts.iter().map(|h| h.dn.clone()).collect()
    }
}

// ============================================================================
// Inventory
// ============================================================================

/// One flattened inventory group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryGroup {
    /// Inventory group name
    pub name: String,
    /// Root directory group it was built from
    pub dn: Dn,
    /// Host identifiers
    pub hosts: BTreeSet<String>,
    /// Variables for each host in the group
    pub host_vars: BTreeMap<String, HostVars>,
    /// Names of other built groups nested directly in this one
    pub children: BTreeSet<String>,
}

impl InventoryGroup {
    /// Create an empty group
    pub fn new(name: impl Into<String>, dn: Dn) -> Self {
        Self {
            name: name.into(),
            dn,
            hosts: BTreeSet::new(),
            host_vars: BTreeMap::new(),
            children: BTreeSet::new(),
        }
    }
}

/// Complete inventory snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    /// Groups by name
    pub groups: BTreeMap<String, InventoryGroup>,
    /// When the snapshot was built
    pub generated_at: DateTime<Utc>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inventory {
    /// Create an empty inventory
    #[must_use]
    pub fn new() -> Self {
        Self {
            groups: BTreeMap::new(),
            generated_at: Utc::now(),
        }
    }

    /// Look up a group by name
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&InventoryGroup> {
        self.groups.get(name)
    }

    /// Every host in any group
    #[must_use]
    pub fn hosts(&self) -> BTreeSet<String> {
        self.groups
            .values()
            .flat_map(|g| g.hosts.iter().cloned())
            .collect()
    }

    /// Variables of one host, merged across its groups
    ///
    /// Returns `None` for a host that is in no group.
    #[must_use]
    pub fn host_vars(&self, host: &str) -> Option<HostVars> {
        let mut found = false;
        let mut vars = HostVars::new();
        for group in self.groups.values() {
            if group.hosts.contains(host) {
                found = true;
                if let Some(v) = group.host_vars.get(host) {
                    vars.extend(v.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
        }
        found.then_some(vars)
    }

    /// Names of the groups a host belongs to
    #[must_use]
    pub fn groups_of(&self, host: &str) -> Vec<&str> {
        self.groups
            .values()
            .filter(|g| g.hosts.contains(host))
            .map(|g| g.name.as_str())
            .collect()
    }
}

/// Outcome of an inventory build
///
/// Failures of individual roots do not abort the build; they are collected
/// here next to the inventory of the roots that succeeded.
#[derive(Debug, Default)]
pub struct InventoryBuild {
    /// Inventory of every root that resolved
    pub inventory: Inventory,
    /// Errors that aborted individual roots
    pub errors: Vec<InventoryError>,
    /// Dangling references found along the way
    pub warnings: Vec<ResolutionWarning>,
}

impl InventoryBuild {
    /// Check whether every root was built
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, hosts: &[&str]) -> InventoryGroup {
        let mut g = InventoryGroup::new(name, Dn::parse(&format!("cn={name},dc=x")).unwrap());
        for h in hosts {
            g.hosts.insert((*h).to_string());
            g.host_vars.insert(
                (*h).to_string(),
                HostVars::from([("group".to_string(), serde_json::json!(name))]),
            );
        }
        g
    }

    #[test]
    fn test_inventory_queries() {
        let mut inv = Inventory::new();
        inv.groups.insert("web".into(), group("web", &["a", "b"]));
        inv.groups.insert("db".into(), group("db", &["b", "c"]));

        assert_eq!(inv.hosts().len(), 3);
        assert_eq!(inv.groups_of("b"), vec!["db", "web"]);
        assert!(inv.host_vars("b").is_some());
        assert!(inv.host_vars("zzz").is_none());
    }

    #[test]
    fn test_warning_display() {
        let group = Dn::parse("cn=web,dc=x").unwrap();
        let member = Dn::parse("fqdn=gone,dc=x").unwrap();
        let w = ResolutionWarning::dangling(&member, &group);

        assert_eq!(w.to_string(), "member 'fqdn=gone,dc=x' of 'cn=web,dc=x' does not exist");
        assert_eq!(
            ResolutionWarning::missing_root(&group).to_string(),
            "root group 'cn=web,dc=x' does not exist"
        );
    }
}
