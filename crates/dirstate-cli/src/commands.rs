//! Command implementations
//!
//! Every command produces an [`Output`] that the binary prints as JSON on
//! stdout; logs go to stderr.

use std::path::Path;
use std::sync::Arc;

use dirstate_api::inventory::{HostVarsDocument, InventoryDocument};
use dirstate_api::requests::EntryState;
use dirstate_api::responses::{ApplyReport, BatchReport, PlanResponse};
use dirstate_core::{
    EntryFile, EntrySpec, Reconciler, RemoveOutcome, inventory_document, plan_response,
};
use dirstate_inventory::InventoryBuilder;
use dirstate_ldap::{ConnectionProfile, DirectoryClient, Dn, LdapClient, MemoryDirectory};
use eyre::{Result, WrapErr};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::InventoryRules;

/// Result of one command
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Output {
    Report(ApplyReport),
    Batch(BatchReport),
    Plans(Vec<PlanResponse>),
    Inventory(InventoryDocument),
    HostVars(HostVarsDocument),
}

impl Output {
    /// Entries that failed, for the exit status
    #[must_use]
    pub fn failed(&self) -> usize {
        match self {
            Output::Batch(report) => report.failed,
            _ => 0,
        }
    }
}

/// Directory client plus the profile it was built from
pub struct Directory {
    pub client: Arc<dyn DirectoryClient>,
    pub profile: Option<ConnectionProfile>,
}

/// Pick the connection profile
///
/// `--profile` (or `DIRSTATE_PROFILE`) wins, then the entry file's
/// `profile`, then the settings file's.
#[must_use]
pub fn resolve_profile(
    flag: Option<&str>,
    entry_file: Option<&str>,
    settings: Option<&str>,
) -> Option<String> {
    flag.or(entry_file).or(settings).map(str::to_string)
}

/// Open the directory named by a profile, or an empty in-memory one
///
/// # Errors
/// Returns error if no profile is given or it cannot be loaded
pub fn open_directory(profile: Option<&str>, memory: bool) -> Result<Directory> {
    if memory {
        warn!("using in-memory directory, nothing is written to a server");
        return Ok(Directory {
            client: Arc::new(MemoryDirectory::new()),
            profile: None,
        });
    }

    let Some(name) = profile else {
        eyre::bail!("no connection profile given (use --profile, DIRSTATE_PROFILE or --memory)");
    };
    let profile = ConnectionProfile::load(name)
        .wrap_err_with(|| format!("failed to load connection profile '{name}'"))?;
    let client = LdapClient::new(profile.clone())?;

    Ok(Directory {
        client: Arc::new(client),
        profile: Some(profile),
    })
}

/// Read a TOML or JSON entry file, chosen by extension
///
/// # Errors
/// Returns error if the file cannot be read or parsed
pub fn read_entry_file(path: &Path) -> Result<EntryFile> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let file = if is_json {
        serde_json::from_str(&content)?
    } else {
        toml::from_str(&content)?
    };
    Ok(file)
}

// ============================================================================
// Entries
// ============================================================================

/// Apply entries; one entry yields a report, several a batch report
///
/// # Errors
/// Returns the entry's error when a single entry fails
pub async fn apply(
    reconciler: &Reconciler,
    mut specs: Vec<EntrySpec>,
    batch_size: usize,
) -> Result<Output> {
    if specs.len() == 1
        && let Some(spec) = specs.pop()
    {
        let report = reconciler.apply_spec(&spec).await?;
        info!(dn = %report.dn, outcome = ?report.outcome, "entry applied");
        return Ok(Output::Report(report));
    }

    let report = reconciler.apply_batch(specs, batch_size).await;
    for item in &report.results {
        if let Some(e) = &item.error {
            error!(dn = %item.dn, error = %e.message, "entry failed");
        }
    }
    Ok(Output::Batch(report))
}

/// Remove one entry
///
/// # Errors
/// Returns error for a malformed DN or a directory failure
pub async fn remove(reconciler: &Reconciler, dn: &str) -> Result<Output> {
    let dn = Dn::parse(dn)?;
    let outcome = reconciler.remove(&dn).await?;
    Ok(Output::Report(dirstate_core::remove_report(
        &dn,
        outcome,
        reconciler.config().check_mode,
    )))
}

/// Plan entries without writing
///
/// # Errors
/// Returns the first entry's error
pub async fn plan(reconciler: &Reconciler, specs: &[EntrySpec]) -> Result<Output> {
    let checked = reconciler.checked(true);
    let mut plans = Vec::with_capacity(specs.len());

    for spec in specs {
        let response = match spec.state {
            EntryState::Present => {
                let desired = spec.desired()?;
                let diff = checked.plan(&desired).await?;
                plan_response(&desired.dn, &diff)
            }
            EntryState::Absent => {
                let dn = spec.resolved_dn()?;
                let modifications = match checked.remove(&dn).await? {
                    RemoveOutcome::Removed => vec!["delete entry".to_string()],
                    RemoveOutcome::Absent => Vec::new(),
                };
                PlanResponse {
                    dn: dn.to_string(),
                    create: false,
                    modifications,
                }
            }
        };
        plans.push(response);
    }

    Ok(Output::Plans(plans))
}

// ============================================================================
// Inventory
// ============================================================================

/// Build the inventory document
///
/// Problems with individual roots are logged and the rest is returned.
///
/// # Errors
/// Returns error for malformed DNs or when there is nothing to build from
pub async fn inventory(directory: &Directory, rules: &InventoryRules) -> Result<InventoryDocument> {
    let roots = rules
        .roots
        .iter()
        .map(|root| Dn::parse(root))
        .collect::<Result<Vec<_>, _>>()
        .wrap_err("invalid inventory root")?;

    let base = match (&rules.hostgroup_base, &directory.profile) {
        (Some(base), _) => Some(Dn::parse(base)?),
        (None, Some(profile)) => Some(profile.hostgroup_base()?),
        (None, None) => None,
    };
    if roots.is_empty() && base.is_none() {
        eyre::bail!("no inventory roots configured and no hostgroup base to discover them in");
    }

    let host_base = match (&rules.host_base, &directory.profile) {
        (Some(base), _) => Some(Dn::parse(base)?),
        (None, Some(profile)) => Some(profile.host_base()?),
        (None, None) => None,
    };

    let mut builder = InventoryBuilder::new(Arc::clone(&directory.client), rules.walker.clone());
    if let Some(base) = base {
        builder = builder.with_hostgroup_base(base);
    }
    if let Some(host_base) = host_base {
        builder = builder.with_host_base(host_base);
    }

    let build = builder.build(&roots, &rules.naming, &rules.variables).await;
    for warning in &build.warnings {
        warn!(%warning, "inventory warning");
    }
    for e in &build.errors {
        error!(error = %e, "inventory root skipped");
    }

    Ok(inventory_document(&build.inventory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirstate_core::ReconcileConfig;
    use dirstate_ldap::{AttributeValues, ObservedEntry};

    fn memory() -> (Arc<MemoryDirectory>, Reconciler) {
        let directory = Arc::new(MemoryDirectory::new());
        let reconciler = Reconciler::new(directory.clone(), ReconcileConfig::default());
        (directory, reconciler)
    }

    fn specs(toml: &str) -> Vec<EntrySpec> {
        toml::from_str::<EntryFile>(toml).unwrap().into_entries()
    }

    const GUEST: &str = r#"
dn = "uid={uid},ou=People,dc=example,dc=com"
objectClass = "inetOrgPerson"

[attributes]
uid = "guest"
sn = "User"
cn = "Guest User"
"#;

    #[test]
    fn test_profile_precedence() {
        let file: EntryFile = toml::from_str(
            r#"
profile = "staging"
dn = "cn=a,dc=example,dc=com"
objectClass = "device"
"#,
        )
        .unwrap();

        assert_eq!(
            resolve_profile(None, file.profile(), Some("prod")).as_deref(),
            Some("staging")
        );
        assert_eq!(
            resolve_profile(Some("corp"), file.profile(), Some("prod")).as_deref(),
            Some("corp")
        );
        assert_eq!(
            resolve_profile(None, None, Some("prod")).as_deref(),
            Some("prod")
        );
        assert_eq!(resolve_profile(None, None, None), None);
    }

    #[tokio::test]
    async fn test_single_entry_reports() {
        let (directory, reconciler) = memory();

        let Output::Report(report) = apply(&reconciler, specs(GUEST), 4).await.unwrap() else {
            panic!("expected a single report");
        };
        assert!(report.changed);
        assert_eq!(directory.len(), 1);

        let Output::Report(report) = apply(&reconciler, specs(GUEST), 4).await.unwrap() else {
            panic!("expected a single report");
        };
        assert!(!report.changed);
    }

    #[tokio::test]
    async fn test_several_entries_batch() {
        let (_, reconciler) = memory();
        let file = r#"
[[entries]]
dn = "cn=a,dc=example,dc=com"
objectClass = "device"

[[entries]]
dn = "cn={cn},dc=example,dc=com"
objectClass = "device"
"#;

        let output = apply(&reconciler, specs(file), 4).await.unwrap();
        assert_eq!(output.failed(), 1);
    }

    #[tokio::test]
    async fn test_plan_reports_without_writing() {
        let (directory, reconciler) = memory();
        directory.insert(ObservedEntry::new(
            Dn::parse("cn=old,dc=example,dc=com").unwrap(),
            [("objectClass", AttributeValues::single("device"))]
                .into_iter()
                .collect(),
        ));

        let mut entries = specs(GUEST);
        entries.extend(specs(
            r#"
dn = "cn=old,dc=example,dc=com"
state = "absent"
"#,
        ));

        let Output::Plans(plans) = plan(&reconciler, &entries).await.unwrap() else {
            panic!("expected plans");
        };
        assert!(plans[0].create);
        assert_eq!(plans[1].modifications, vec!["delete entry"]);
        assert_eq!(directory.counts().writes(), 0);
    }

    #[tokio::test]
    async fn test_remove_command() {
        let (_, reconciler) = memory();
        let Output::Report(report) = remove(&reconciler, "cn=gone,dc=example,dc=com")
            .await
            .unwrap()
        else {
            panic!("expected a report");
        };
        assert!(!report.changed);
        assert!(remove(&reconciler, "not a dn").await.is_err());
    }

    #[tokio::test]
    async fn test_inventory_needs_roots() {
        let directory = open_directory(None, true).unwrap();
        assert!(inventory(&directory, &InventoryRules::default()).await.is_err());

        let rules = InventoryRules {
            hostgroup_base: Some("cn=hostgroups,dc=example,dc=com".into()),
            ..InventoryRules::default()
        };
        let doc = inventory(&directory, &rules).await.unwrap();
        assert!(doc.groups["all"].hosts.is_empty());
    }
}
