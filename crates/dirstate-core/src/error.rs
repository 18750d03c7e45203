//! Core error types for dirstate-core

use dirstate_ldap::{ConfigurationError, DirectoryError};
use thiserror::Error;

/// Errors that can occur while reconciling an entry
#[derive(Error, Debug, Clone)]
pub enum ReconcileError {
    /// Directory request failed
    #[error("directory error on '{dn}': {source}")]
    Directory {
        /// Entry being reconciled
        dn: String,
        #[source]
        source: DirectoryError,
    },

    /// Invalid entry or rule configuration
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Entry appeared concurrently and the follow-up update also failed
    #[error("entry '{dn}' was created concurrently and the follow-up update failed: {source}")]
    CreateRace {
        /// Entry being reconciled
        dn: String,
        #[source]
        source: DirectoryError,
    },

    /// Request could not be turned into an entry
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Feature needs configuration that is missing
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// Actor communication error
    #[error("actor communication error: {0}")]
    ActorError(String),
}

impl ReconcileError {
    pub(crate) fn directory(dn: impl ToString, source: DirectoryError) -> Self {
        ReconcileError::Directory {
            dn: dn.to_string(),
            source,
        }
    }

    /// Underlying directory error, if any
    #[must_use]
    pub fn directory_error(&self) -> Option<&DirectoryError> {
        match self {
            ReconcileError::Directory { source, .. } | ReconcileError::CreateRace { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Check if error is retryable by the caller
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.directory_error()
            .is_some_and(DirectoryError::is_retryable)
    }

    /// Short category name used in reports
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::Directory { source, .. } => source.kind(),
            ReconcileError::Configuration(_) => "configuration",
            ReconcileError::CreateRace { .. } => "create_race",
            ReconcileError::InvalidRequest(_) => "invalid_request",
            ReconcileError::NotConfigured(_) => "not_configured",
            ReconcileError::ActorError(_) => "actor",
        }
    }
}
