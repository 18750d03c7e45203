//! Request types for the API

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Desired state of an entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    #[default]
    Present,
    Absent,
}

/// One entry to reconcile
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EntryRequest {
    /// DN, may contain `{attribute}` placeholders
    pub dn: String,
    #[serde(rename = "objectClass", default)]
    pub object_class: Vec<String>,
    /// Attribute name to a value or list of values
    #[serde(default)]
    #[schema(value_type = Object)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub state: EntryState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ApplyQuery {
    /// Report what would change without writing
    #[serde(default)]
    pub check_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchRequest {
    pub entries: Vec<EntryRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub check_mode: bool,
}

/// Entry to delete
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RemoveRequest {
    pub dn: String,
    #[serde(default)]
    pub check_mode: bool,
}
