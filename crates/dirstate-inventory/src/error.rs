//! Error types for dirstate-inventory

use dirstate_ldap::{ConfigurationError, DirectoryError};
use thiserror::Error;

/// Errors that abort building one inventory group
#[derive(Error, Debug, Clone)]
pub enum InventoryError {
    /// Directory request failed during a walk
    #[error("directory error while resolving '{root}': {source}")]
    Directory {
        /// Root group being resolved
        root: String,
        #[source]
        source: DirectoryError,
    },

    /// Invalid naming or mapping configuration
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Resolution task panicked or was cancelled
    #[error("resolution task failed: {0}")]
    TaskFailed(String),
}

impl InventoryError {
    /// Wrap a directory error with the root it occurred under
    pub fn directory(root: impl Into<String>, source: DirectoryError) -> Self {
        InventoryError::Directory {
            root: root.into(),
            source,
        }
    }

    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            InventoryError::Directory { source, .. } => source.is_retryable(),
            InventoryError::Configuration(_) | InventoryError::TaskFailed(_) => false,
        }
    }
}
