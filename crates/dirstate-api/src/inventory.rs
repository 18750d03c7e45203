//! Dynamic inventory document
//!
//! The JSON shape automation tools read from an inventory script: one key
//! per group, an `all` group, and per-host variables under `_meta`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Variables of one host
pub type HostVarsDocument = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GroupDocument {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub vars: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MetaDocument {
    #[schema(value_type = Object)]
    pub hostvars: BTreeMap<String, HostVarsDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InventoryDocument {
    /// Groups by name, `all` included
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub groups: BTreeMap<String, GroupDocument>,
    #[serde(rename = "_meta")]
    pub meta: MetaDocument,
}

impl InventoryDocument {
    /// Variables of one host; empty for unknown hosts
    #[must_use]
    pub fn host(&self, name: &str) -> HostVarsDocument {
        self.meta.hostvars.get(name).cloned().unwrap_or_default()
    }
}

/// Inventory plus what went wrong while building it
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InventoryResponse {
    pub inventory: InventoryDocument,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_shape() {
        let mut doc = InventoryDocument::default();
        doc.groups.insert(
            "web".to_string(),
            GroupDocument {
                hosts: vec!["web1".to_string()],
                ..GroupDocument::default()
            },
        );
        doc.meta.hostvars.insert(
            "web1".to_string(),
            BTreeMap::from([("macaddress".to_string(), serde_json::json!("aa:bb"))]),
        );

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["web"]["hosts"][0], "web1");
        assert_eq!(json["_meta"]["hostvars"]["web1"]["macaddress"], "aa:bb");

        let back: InventoryDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
        assert!(back.host("unknown").is_empty());
    }
}
