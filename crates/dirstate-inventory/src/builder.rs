//! Inventory builder
//!
//! Walks each root group, names it, and flattens its hosts into an inventory
//! group. Every build starts from scratch.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dirstate_ldap::{
    AttributeSet, ConfigurationError, DirectoryClient, DirectoryError, Dn, Filter, Scope,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::InventoryError;
use crate::naming::NamingRules;
use crate::types::{
    HostVars, Inventory, InventoryBuild, InventoryGroup, Resolution, ResolvedHost,
};
use crate::walker::{GraphWalker, WalkerConfig, with_timeout};

/// Group names the dynamic inventory format uses for itself
pub const RESERVED_GROUP_NAMES: [&str; 2] = ["all", "_meta"];

// ============================================================================
// Host variables
// ============================================================================

/// Mapping from host attributes to inventory variables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostVariableRules {
    /// Source attribute → variable name
    pub mappings: BTreeMap<String, String>,
}

impl Default for HostVariableRules {
    fn default() -> Self {
        Self {
            mappings: BTreeMap::from([("macAddress".to_string(), "macaddress".to_string())]),
        }
    }
}

impl HostVariableRules {
    /// Rules that map nothing
    #[must_use]
    pub fn none() -> Self {
        Self {
            mappings: BTreeMap::new(),
        }
    }

    /// Add a mapping
    #[must_use]
    pub fn with(mut self, attribute: impl Into<String>, variable: impl Into<String>) -> Self {
        self.mappings.insert(attribute.into(), variable.into());
        self
    }

    /// Check that every mapping names both a source and a variable
    ///
    /// # Errors
    /// Returns `MissingAttributeMapping` for an empty source or variable name.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (attribute, variable) in &self.mappings {
            if attribute.trim().is_empty() {
                return Err(ConfigurationError::MissingAttributeMapping(format!(
                    "variable '{variable}' has no source attribute"
                )));
            }
            if variable.trim().is_empty() {
                return Err(ConfigurationError::MissingAttributeMapping(format!(
                    "attribute '{attribute}' has no variable name"
                )));
            }
        }
        Ok(())
    }

    /// Variables for a host
    ///
    /// A missing source attribute omits the variable. A single value becomes
    /// a string, several become a list.
    #[must_use]
    pub fn variables(&self, attributes: &AttributeSet) -> HostVars {
        let mut vars = HostVars::new();
        for (attribute, variable) in &self.mappings {
            let Some(values) = attributes.get(attribute) else {
                continue;
            };
            let value = match values.as_slice() {
                [] => continue,
                [one] => serde_json::Value::String(one.clone()),
                many => serde_json::Value::Array(
                    many.iter().cloned().map(serde_json::Value::String).collect(),
                ),
            };
            vars.insert(variable.clone(), value);
        }
        vars
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builds inventories from a directory
#[derive(Clone)]
pub struct InventoryBuilder {
    client: Arc<dyn DirectoryClient>,
    walker: GraphWalker,
    hostgroup_base: Option<Dn>,
    host_base: Option<Dn>,
}

impl InventoryBuilder {
    /// Create a builder
    pub fn new(client: Arc<dyn DirectoryClient>, config: WalkerConfig) -> Self {
        Self {
            walker: GraphWalker::new(Arc::clone(&client), config),
            client,
            hostgroup_base: None,
            host_base: None,
        }
    }

    /// Discover roots under this container when none are given
    #[must_use]
    pub fn with_hostgroup_base(mut self, base: Dn) -> Self {
        self.hostgroup_base = Some(base);
        self
    }

    /// Only read variables of hosts below this container
    ///
    /// Hosts elsewhere are still listed, without variables.
    #[must_use]
    pub fn with_host_base(mut self, base: Dn) -> Self {
        self.host_base = Some(base);
        self
    }

    fn host_variables(&self, host: &ResolvedHost, variables: &HostVariableRules) -> HostVars {
        match &self.host_base {
            Some(base) if !host.dn.is_descendant_of(base) => {
                debug!(host = %host.dn, base = %base, "host outside host base, no variables");
                HostVars::new()
            }
            _ => variables.variables(&host.attributes),
        }
    }

    /// Every group directly below `base`, sorted by DN
    ///
    /// # Errors
    /// Returns the directory error if the search fails.
    #[instrument(skip(self), fields(base = %base))]
    pub async fn discover_roots(&self, base: &Dn) -> Result<Vec<Dn>, DirectoryError> {
        let filter = Filter::object_class_in(&self.walker.config().group_object_classes);
        let entries = with_timeout(
            self.walker.config().timeout(),
            self.client.search(base, Scope::OneLevel, &filter, &["objectClass"]),
        )
        .await?;

        let mut roots: Vec<Dn> = entries.into_iter().map(|e| e.dn).collect();
        roots.sort();
        debug!(count = roots.len(), "discovered root groups");
        Ok(roots)
    }

    /// Build an inventory
    ///
    /// Each root is walked independently. A root whose walk fails, or whose
    /// name collides with an earlier root or a reserved name, is left out and
    /// its error recorded; the remaining roots are still built. A host whose
    /// name is already taken by a different host entry is left out the same
    /// way.
    #[instrument(skip_all, fields(roots = roots.len()))]
    pub async fn build(
        &self,
        roots: &[Dn],
        naming: &NamingRules,
        variables: &HostVariableRules,
    ) -> InventoryBuild {
        let mut build = InventoryBuild::default();

        if let Err(e) = variables.validate() {
            build.errors.push(e.into());
            return build;
        }

        let roots = match (roots.is_empty(), &self.hostgroup_base) {
            (true, Some(base)) => match self.discover_roots(base).await {
                Ok(found) => found,
                Err(e) => {
                    build.errors.push(InventoryError::directory(base.as_str(), e));
                    return build;
                }
            },
            _ => roots.to_vec(),
        };

        // Claim names in root order so the later of two colliding roots loses
        let mut claimed: HashMap<String, Dn> = HashMap::new();
        let mut accepted: Vec<(String, Dn)> = Vec::new();
        for root in roots {
            let name = naming.group_name(&root);
            if !naming.keeps_group(&name) {
                debug!(group = %name, dn = %root, "group excluded");
                continue;
            }
            if let Some(reserved) = RESERVED_GROUP_NAMES.iter().find(|r| **r == name) {
                warn!(group = %name, dn = %root, "group name is reserved");
                build.errors.push(
                    ConfigurationError::NamingCollision {
                        name,
                        first: format!("reserved inventory key '{reserved}'"),
                        second: root.to_string(),
                    }
                    .into(),
                );
                continue;
            }
            if let Some(first) = claimed.get(&name) {
                if first == &root {
                    continue;
                }
                warn!(group = %name, first = %first, second = %root, "group name collision");
                build.errors.push(
                    ConfigurationError::NamingCollision {
                        name,
                        first: first.to_string(),
                        second: root.to_string(),
                    }
                    .into(),
                );
                continue;
            }
            claimed.insert(name.clone(), root.clone());
            accepted.push((name, root));
        }

        // Walk roots concurrently, collect in root order
        let handles: Vec<_> = accepted
            .into_iter()
            .map(|(name, root)| {
                let walker = self.walker.clone();
                let handle = tokio::spawn({
                    let root = root.clone();
                    async move { walker.resolve(std::slice::from_ref(&root)).await }
                });
                (name, root, handle)
            })
            .collect();

        let mut resolved: Vec<(String, Dn, Resolution)> = Vec::new();
        for (name, root, handle) in handles {
            match handle.await {
                Ok(Ok(resolution)) => resolved.push((name, root, resolution)),
                Ok(Err(e)) => {
                    warn!(group = %name, error = %e, "root resolution failed");
                    build.errors.push(InventoryError::directory(root.as_str(), e));
                }
                Err(e) => build.errors.push(InventoryError::TaskFailed(e.to_string())),
            }
        }

        let names_by_dn: HashMap<Dn, String> = resolved
            .iter()
            .filter(|(_, _, r)| !r.visited_groups.is_empty())
            .map(|(name, root, _)| (root.clone(), name.clone()))
            .collect();

        let mut inventory = Inventory::new();
        let mut host_owners: HashMap<String, Dn> = HashMap::new();
        for (name, root, resolution) in resolved {
            build.warnings.extend(resolution.warnings.iter().cloned());
            if resolution.visited_groups.is_empty() {
                // Root did not exist
                continue;
            }

            let mut group = InventoryGroup::new(name.clone(), root.clone());
            for host in &resolution.hosts {
                let host_name = naming.host_name(host);
                if !naming.keeps_host(&host_name) {
                    continue;
                }
                match host_owners.get(&host_name) {
                    Some(owner) if owner != &host.dn => {
                        warn!(host = %host_name, first = %owner, second = %host.dn, "host name collision");
                        build.errors.push(
                            ConfigurationError::HostNameCollision {
                                name: host_name,
                                first: owner.to_string(),
                                second: host.dn.to_string(),
                            }
                            .into(),
                        );
                        continue;
                    }
                    Some(_) => {}
                    None => {
                        host_owners.insert(host_name.clone(), host.dn.clone());
                    }
                }
                let vars = self.host_variables(host, variables);
                group.hosts.insert(host_name.clone());
                group.host_vars.insert(host_name, vars);
            }
            for nested in &resolution.nested_groups {
                if let Some(child) = names_by_dn.get(nested)
                    && child != &name
                {
                    group.children.insert(child.clone());
                }
            }

            debug!(group = %name, hosts = group.hosts.len(), children = group.children.len(), "group built");
            inventory.groups.insert(name, group);
        }

        info!(
            groups = inventory.groups.len(),
            errors = build.errors.len(),
            warnings = build.warnings.len(),
            "inventory built"
        );
        build.inventory = inventory;
        build
    }
}
