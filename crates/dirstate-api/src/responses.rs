//! Response types for the API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Directory client in use
    pub client: String,
}

/// What reconciling one entry did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryOutcome {
    Unchanged,
    Created,
    Updated,
    Removed,
    Absent,
}

impl EntryOutcome {
    /// Whether the outcome changed the directory
    #[must_use]
    pub fn is_change(self) -> bool {
        matches!(
            self,
            EntryOutcome::Created | EntryOutcome::Updated | EntryOutcome::Removed
        )
    }
}

/// Report for one entry, in the shape automation tooling expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ApplyReport {
    pub dn: String,
    pub outcome: EntryOutcome,
    pub changed: bool,
    /// Human-readable actions, e.g. `Created dn '...'`
    pub actions: Vec<String>,
    /// Individual modifications, e.g. `replace sn: User`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifications: Vec<String>,
    #[serde(default)]
    pub check_mode: bool,
    /// Result of the post-write check, when one was made
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
}

/// Plan for one entry without applying it
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlanResponse {
    pub dn: String,
    pub create: bool,
    pub modifications: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchItem {
    pub dn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ApplyReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchReport {
    pub total: usize,
    pub changed: usize,
    pub failed: usize,
    pub results: Vec<BatchItem>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Error category, e.g. `connection_error`
    pub kind: String,
    pub message: String,
}
