//! Directory client and actor construction from configuration

use std::sync::Arc;

use dirstate_api::events::DirectoryEvent;
use dirstate_core::{DirectoryActorArgs, InventorySource, Reconciler};
use dirstate_inventory::InventoryBuilder;
use dirstate_ldap::{ConnectionProfile, DirectoryClient, Dn, LdapClient, MemoryDirectory};
use eyre::{Result, WrapErr};
use tokio::sync::broadcast;

use crate::config::Config;

/// Directory client plus the profile it was built from
pub struct Directory {
    pub client: Arc<dyn DirectoryClient>,
    pub profile: Option<ConnectionProfile>,
}

/// Create the directory client named by the configuration
///
/// # Errors
/// Returns error if no profile is configured or it cannot be loaded
pub fn create_directory(config: &Config) -> Result<Directory> {
    if config.memory {
        tracing::warn!("using in-memory directory, changes are not persisted");
        return Ok(Directory {
            client: Arc::new(MemoryDirectory::new()),
            profile: None,
        });
    }

    let Some(name) = &config.profile else {
        eyre::bail!("no connection profile configured (set `profile` or `memory = true`)");
    };

    let profile = ConnectionProfile::load(name)
        .wrap_err_with(|| format!("failed to load connection profile '{name}'"))?;
    let client = LdapClient::new(profile.clone())?;
    tracing::info!(profile = %name, url = %profile.url, "using LDAP directory");

    Ok(Directory {
        client: Arc::new(client),
        profile: Some(profile),
    })
}

/// Inventory source for the configured roots
///
/// Returns `None` when there are neither roots nor a container to discover
/// them in.
///
/// # Errors
/// Returns error for malformed DNs
pub fn create_inventory_source(
    config: &Config,
    directory: &Directory,
) -> Result<Option<InventorySource>> {
    let inventory = &config.inventory;

    let roots = inventory
        .roots
        .iter()
        .map(|root| Dn::parse(root))
        .collect::<Result<Vec<_>, _>>()
        .wrap_err("invalid inventory root")?;

    let base = match (&inventory.hostgroup_base, &directory.profile) {
        (Some(base), _) => Some(Dn::parse(base).wrap_err("invalid hostgroup base")?),
        (None, Some(profile)) => Some(profile.hostgroup_base()?),
        (None, None) => None,
    };

    if roots.is_empty() && base.is_none() {
        tracing::warn!("inventory disabled: no roots and no hostgroup base");
        return Ok(None);
    }

    let host_base = match (&inventory.host_base, &directory.profile) {
        (Some(base), _) => Some(Dn::parse(base).wrap_err("invalid host base")?),
        (None, Some(profile)) => Some(profile.host_base()?),
        (None, None) => None,
    };

    let mut builder = InventoryBuilder::new(Arc::clone(&directory.client), inventory.walker.clone());
    if let Some(base) = base {
        builder = builder.with_hostgroup_base(base);
    }
    if let Some(host_base) = host_base {
        builder = builder.with_host_base(host_base);
    }

    Ok(Some(InventorySource {
        builder,
        roots,
        naming: inventory.naming.clone(),
        variables: inventory.variables.clone(),
    }))
}

/// Arguments for the directory actor
///
/// # Errors
/// Returns error if the directory or inventory cannot be configured
pub fn create_actor_args(
    config: &Config,
    directory: &Directory,
    event_tx: broadcast::Sender<DirectoryEvent>,
) -> Result<DirectoryActorArgs> {
    let reconciler = Reconciler::new(Arc::clone(&directory.client), config.reconcile.clone());
    let inventory = create_inventory_source(config, directory)?;

    Ok(DirectoryActorArgs {
        reconciler,
        inventory,
        event_tx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> Config {
        Config {
            memory: true,
            ..Config::default()
        }
    }

    #[test]
    fn test_memory_directory() {
        let directory = create_directory(&memory_config()).unwrap();
        assert_eq!(directory.client.client_type(), "memory");
        assert!(directory.profile.is_none());
    }

    #[test]
    fn test_missing_profile_is_error() {
        assert!(create_directory(&Config::default()).is_err());
    }

    #[test]
    fn test_inventory_needs_roots_or_base() {
        let mut config = memory_config();
        let directory = create_directory(&config).unwrap();
        assert!(create_inventory_source(&config, &directory).unwrap().is_none());

        config.inventory.hostgroup_base = Some("cn=hostgroups,dc=example,dc=com".into());
        let source = create_inventory_source(&config, &directory).unwrap().unwrap();
        assert!(source.roots.is_empty());

        config.inventory.roots = vec!["not a dn".into()];
        assert!(create_inventory_source(&config, &directory).is_err());
    }
}
