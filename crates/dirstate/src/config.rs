//! Configuration loading and types

use std::path::{Path, PathBuf};

use dirstate_core::ReconcileConfig;
use dirstate_inventory::{HostVariableRules, NamingRules, WalkerConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the dirstate daemon
///
/// ```toml
/// profile = "corp"
///
/// [daemon]
/// bind = "127.0.0.1:8080"
///
/// [reconcile]
/// timeout_secs = 10
///
/// [inventory]
/// roots = ["cn=webservers,cn=hostgroups,cn=accounts,dc=example,dc=com"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Daemon server settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Connection profile name or path; required unless `memory` is set
    #[serde(default)]
    pub profile: Option<String>,
    /// Serve from an empty in-memory directory instead of a server
    #[serde(default)]
    pub memory: bool,
    /// Reconciliation settings
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    /// Inventory settings
    #[serde(default)]
    pub inventory: InventoryConfig,
}

/// Daemon server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address and port to bind to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,
    /// Capacity of the directory event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            json_logs: false,
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_event_capacity() -> usize {
    256
}

/// Inventory settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Root group DNs; discovered below `hostgroup_base` when empty
    pub roots: Vec<String>,
    /// Container holding the host groups; the profile's when unset
    pub hostgroup_base: Option<String>,
    /// Container holding the hosts whose variables are read; the profile's
    /// when unset
    pub host_base: Option<String>,
    pub naming: NamingRules,
    pub variables: HostVariableRules,
    pub walker: WalkerConfig,
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from default paths or use defaults
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be read or parsed
    pub fn load_default() -> eyre::Result<Self> {
        if let Ok(path) = std::env::var("DIRSTATE_CONFIG") {
            return Self::load(&PathBuf::from(path));
        }

        let paths = [
            PathBuf::from("dirstate.toml"),
            PathBuf::from("/etc/dirstate/dirstate.toml"),
            dirs::config_dir()
                .map(|p| p.join("dirstate/dirstate.toml"))
                .unwrap_or_default(),
        ];

        for path in paths {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading config");
                return Self::load(&path);
            }
        }

        tracing::warn!("no config file found, using defaults");
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.daemon.bind, "127.0.0.1:8080");
        assert_eq!(config.daemon.log_level, "info");
        assert!(config.profile.is_none());
        assert_eq!(config.reconcile.batch_size, 4);
        assert!(config.inventory.roots.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config: Config = toml::from_str(
            r#"
profile = "corp"

[daemon]
bind = "0.0.0.0:9000"
json_logs = true

[reconcile]
timeout_secs = 5
verify = true

[inventory]
roots = ["cn=web,cn=hostgroups,dc=example,dc=com"]

[inventory.naming]
prefix = "ldap_"
exclude_hosts = ["test-*"]

[inventory.variables]
macAddress = "mac"
l = "location"

[inventory.walker]
member_attribute = "uniqueMember"
"#,
        )
        .unwrap();

        assert_eq!(config.profile.as_deref(), Some("corp"));
        assert!(config.daemon.json_logs);
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.reconcile.timeout_secs, 5);
        assert!(config.reconcile.verify);
        assert_eq!(config.inventory.naming.prefix.as_deref(), Some("ldap_"));
        assert_eq!(config.inventory.variables.mappings["l"], "location");
        assert_eq!(config.inventory.walker.member_attribute, "uniqueMember");
    }
}
