//! Configuration types for entries and reconciliation

use std::time::Duration;

use dirstate_api::requests::{EntryRequest, EntryState};
use dirstate_ldap::{AttributeSet, AttributeValues, ConfigurationError, Dn};
use serde::{Deserialize, Serialize};

use crate::diff::AttributeComparator;
use crate::error::ReconcileError;

/// Reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Timeout applied to every directory request
    pub timeout_secs: u64,
    /// Report what would change without writing
    pub check_mode: bool,
    /// Re-read entries after writing and report whether they converged
    pub verify: bool,
    /// Entries reconciled in parallel by batch apply
    pub batch_size: usize,
    /// Attributes whose values are compared as DNs
    pub dn_attributes: Vec<String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            check_mode: false,
            verify: false,
            batch_size: 4,
            dn_attributes: AttributeComparator::DEFAULT_DN_ATTRIBUTES
                .iter()
                .map(|a| (*a).to_string())
                .collect(),
        }
    }
}

impl ReconcileConfig {
    /// Per-request timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Value comparator for these settings
    #[must_use]
    pub fn comparator(&self) -> AttributeComparator {
        AttributeComparator::new(self.dn_attributes.iter().map(String::as_str))
    }
}

// ============================================================================
// Entries
// ============================================================================

/// Entry as the caller wants it to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredEntry {
    /// Entry DN
    pub dn: Dn,
    /// Object classes the entry must carry
    pub object_classes: Vec<String>,
    /// Attributes the entry must hold; an empty value list means "absent"
    pub attributes: AttributeSet,
}

impl DesiredEntry {
    /// Create a desired entry
    pub fn new(dn: Dn, object_classes: Vec<String>, attributes: AttributeSet) -> Self {
        Self {
            dn,
            object_classes,
            attributes,
        }
    }
}

/// Declarative entry as written in TOML or JSON
///
/// ```toml
/// dn = "uid={uid},ou=People,dc=example,dc=com"
/// objectClass = ["inetOrgPerson"]
/// state = "present"
///
/// [attributes]
/// uid = "guest"
/// sn = "User"
/// cn = "Guest User"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySpec {
    /// DN, may contain `{attribute}` placeholders
    pub dn: String,
    /// One class or a list of classes
    #[serde(rename = "objectClass", alias = "object_class", default)]
    pub object_class: AttributeValues,
    #[serde(default)]
    pub attributes: AttributeSet,
    #[serde(default)]
    pub state: EntryState,
}

impl EntrySpec {
    /// Expand the DN template and assemble the desired entry
    ///
    /// An `objectClass` listed among the attributes is merged into the
    /// object classes.
    ///
    /// # Errors
    /// Returns a configuration error for an unexpandable or malformed DN, or
    /// when a present entry names no object class.
    pub fn desired(&self) -> Result<DesiredEntry, ConfigurationError> {
        let dn = Dn::from_template(&self.dn, &self.attributes)?;

        let mut attributes = self.attributes.clone();
        let mut object_classes = self.object_class.clone();
        if let Some(extra) = attributes.remove("objectClass") {
            for class in extra.iter() {
                if !object_classes.iter().any(|c| c.eq_ignore_ascii_case(class)) {
                    object_classes.push_unique(class);
                }
            }
        }

        if self.state == EntryState::Present && object_classes.is_empty() {
            return Err(ConfigurationError::MissingAttributeMapping(format!(
                "objectClass for '{dn}'"
            )));
        }

        Ok(DesiredEntry::new(dn, object_classes.into_vec(), attributes))
    }

    /// DN with placeholders expanded
    ///
    /// # Errors
    /// Returns a configuration error if the template cannot be expanded.
    pub fn resolved_dn(&self) -> Result<Dn, ConfigurationError> {
        Dn::from_template(&self.dn, &self.attributes)
    }
}

impl TryFrom<EntryRequest> for EntrySpec {
    type Error = ReconcileError;

    fn try_from(request: EntryRequest) -> Result<Self, Self::Error> {
        let mut attributes = AttributeSet::new();
        for (name, value) in request.attributes {
            let values: AttributeValues = serde_json::from_value(value).map_err(|e| {
                ReconcileError::InvalidRequest(format!("attribute '{name}': {e}"))
            })?;
            attributes.insert(name, values);
        }

        Ok(Self {
            dn: request.dn,
            object_class: AttributeValues::from(request.object_class),
            attributes,
            state: request.state,
        })
    }
}

/// File holding one or more entries
///
/// Either a single entry at the top level or a list under `entries`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryFile {
    Many {
        /// Connection profile to use
        #[serde(default)]
        profile: Option<String>,
        entries: Vec<EntrySpec>,
    },
    One {
        #[serde(default)]
        profile: Option<String>,
        #[serde(flatten)]
        entry: EntrySpec,
    },
}

impl EntryFile {
    /// Profile named in the file
    #[must_use]
    pub fn profile(&self) -> Option<&str> {
        match self {
            EntryFile::Many { profile, .. } | EntryFile::One { profile, .. } => profile.as_deref(),
        }
    }

    /// Entries in file order
    #[must_use]
    pub fn into_entries(self) -> Vec<EntrySpec> {
        match self {
            EntryFile::Many { entries, .. } => entries,
            EntryFile::One { entry, .. } => vec![entry],
        }
    }
}
