//! Error types for dirstate-ldap

use std::time::Duration;

use thiserror::Error;

/// Errors reported by a directory service
#[derive(Error, Debug, Clone)]
pub enum DirectoryError {
    /// Entry does not exist
    #[error("no such entry: {0}")]
    NotFound(String),

    /// Entry already exists
    #[error("entry already exists: {0}")]
    AlreadyExists(String),

    /// Request violates a directory constraint
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Connection to the directory failed or was lost
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// Request did not complete in time
    #[error("directory request timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Any other result code returned by the server
    #[error("directory error {code}: {message}")]
    Other {
        /// LDAP result code
        code: u32,
        /// Diagnostic message from the server
        message: String,
    },
}

impl DirectoryError {
    /// Check if error is retryable by the invoking layer
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DirectoryError::ConnectionError(_) | DirectoryError::Timeout { .. }
        )
    }

    /// Check if an add failed because another writer created the entry first
    #[must_use]
    pub fn is_create_conflict(&self) -> bool {
        matches!(
            self,
            DirectoryError::AlreadyExists(_) | DirectoryError::ConstraintViolation(_)
        )
    }

    /// Short category name used in reports
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            DirectoryError::NotFound(_) => "not_found",
            DirectoryError::AlreadyExists(_) => "already_exists",
            DirectoryError::ConstraintViolation(_) => "constraint_violation",
            DirectoryError::ConnectionError(_) => "connection_error",
            DirectoryError::Timeout { .. } => "timeout",
            DirectoryError::Other { .. } => "other",
        }
    }
}

/// Errors in caller-supplied configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// DN could not be parsed
    #[error("malformed DN '{dn}': {reason}")]
    MalformedDn {
        /// Offending DN
        dn: String,
        /// What is wrong with it
        reason: String,
    },

    /// DN template references an attribute the entry does not define
    #[error("DN template '{template}' references undefined attribute '{attribute}'")]
    MissingTemplateAttribute {
        /// Template string
        template: String,
        /// Placeholder name
        attribute: String,
    },

    /// Two directory groups map to the same inventory group name, or a group
    /// maps to a name the inventory format reserves
    #[error("inventory group name '{name}' produced by both '{first}' and '{second}'")]
    NamingCollision {
        /// Colliding inventory group name
        name: String,
        /// DN that claimed the name first, or the reserved key
        first: String,
        /// DN that was rejected
        second: String,
    },

    /// Two host entries map to the same inventory host name
    #[error("inventory host name '{name}' produced by both '{first}' and '{second}'")]
    HostNameCollision {
        /// Colliding host name
        name: String,
        /// Host DN that claimed the name first
        first: String,
        /// Host DN that was left out
        second: String,
    },

    /// A mapping rule is missing a required part
    #[error("missing required attribute mapping: {0}")]
    MissingAttributeMapping(String),

    /// Connection profile could not be loaded
    #[error("invalid connection profile '{profile}': {reason}")]
    InvalidProfile {
        /// Profile name or path
        profile: String,
        /// Why loading failed
        reason: String,
    },
}

impl ConfigurationError {
    pub(crate) fn malformed(dn: &str, reason: impl Into<String>) -> Self {
        ConfigurationError::MalformedDn {
            dn: dn.to_string(),
            reason: reason.into(),
        }
    }
}
