//! Settings file shared with the daemon
//!
//! Only the sections the CLI needs are read; `[daemon]` is ignored.

use std::path::{Path, PathBuf};

use dirstate_core::ReconcileConfig;
use dirstate_inventory::{HostVariableRules, NamingRules, WalkerConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Default connection profile
    pub profile: Option<String>,
    pub reconcile: ReconcileConfig,
    pub inventory: InventoryRules,
}

/// Where and how to build the inventory
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InventoryRules {
    pub roots: Vec<String>,
    pub hostgroup_base: Option<String>,
    pub host_base: Option<String>,
    pub naming: NamingRules,
    pub variables: HostVariableRules,
    pub walker: WalkerConfig,
}

impl CliConfig {
    /// Load the given file, or the first default location that exists
    ///
    /// # Errors
    /// Returns error if a file exists but cannot be read or parsed
    pub fn load(path: Option<&Path>) -> eyre::Result<Self> {
        if let Some(path) = path {
            return Self::read(path);
        }
        if let Ok(path) = std::env::var("DIRSTATE_CONFIG") {
            return Self::read(Path::new(&path));
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
                return Self::read(&path);
            }
        }

        tracing::debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    fn read(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}
