use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kameo::actor::Spawn;
use tokio::sync::broadcast;

use dirstate_api::events::DirectoryEvent;
use dirstate_api::requests::EntryState;
use dirstate_api::responses::EntryOutcome;
use dirstate_core::*;
use dirstate_inventory::{HostVariableRules, InventoryBuilder, NamingRules, WalkerConfig};
use dirstate_ldap::{
    AttributeSet, AttributeValues, DirectoryClient, DirectoryError, Dn, Filter, Injection,
    MemoryDirectory, Modification, ObservedEntry, Operation, Scope,
};

const GUEST: &str = "uid=guest,ou=People,dc=example,dc=com";

fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

fn attrs(pairs: &[(&str, &[&str])]) -> AttributeSet {
    pairs
        .iter()
        .map(|(n, v)| (*n, AttributeValues::many(v.iter().copied())))
        .collect()
}

fn guest() -> DesiredEntry {
    DesiredEntry::new(
        dn(GUEST),
        vec!["inetOrgPerson".to_string()],
        attrs(&[("uid", &["guest"]), ("sn", &["User"]), ("cn", &["Guest User"])]),
    )
}

fn stored_guest(sn: &str) -> ObservedEntry {
    ObservedEntry::new(
        dn(GUEST),
        attrs(&[
            ("objectClass", &["top", "inetOrgPerson"]),
            ("uid", &["guest"]),
            ("sn", &[sn]),
            ("cn", &["Guest User"]),
        ]),
    )
}

fn reconciler(directory: &Arc<MemoryDirectory>) -> Reconciler {
    Reconciler::new(directory.clone(), ReconcileConfig::default())
}

fn spec(dn: &str, uid: &str) -> EntrySpec {
    EntrySpec {
        dn: dn.to_string(),
        object_class: AttributeValues::single("inetOrgPerson"),
        attributes: attrs(&[("uid", &[uid]), ("sn", &["User"]), ("cn", &[uid])]),
        state: EntryState::Present,
    }
}

/// Serves reads from a memory directory and refuses every write
struct ReadOnlyDirectory(MemoryDirectory);

#[async_trait]
impl DirectoryClient for ReadOnlyDirectory {
    async fn search(
        &self,
        base: &Dn,
        scope: Scope,
        filter: &Filter,
        attributes: &[&str],
    ) -> Result<Vec<ObservedEntry>, DirectoryError> {
        self.0.search(base, scope, filter, attributes).await
    }

    async fn add(
        &self,
        _dn: &Dn,
        _object_classes: &[String],
        _attributes: &AttributeSet,
    ) -> Result<(), DirectoryError> {
        panic!("add issued")
    }

    async fn modify(&self, _dn: &Dn, _modifications: &[Modification]) -> Result<(), DirectoryError> {
        panic!("modify issued")
    }

    async fn delete(&self, _dn: &Dn) -> Result<(), DirectoryError> {
        panic!("delete issued")
    }

    fn client_type(&self) -> &'static str {
        "read-only"
    }
}

// ============================================================================
// Apply
// ============================================================================

#[tokio::test]
async fn test_create_then_idempotent() {
    let directory = Arc::new(MemoryDirectory::new());
    let reconciler = reconciler(&directory);

    let first = reconciler.reconcile(&guest()).await.unwrap();
    assert_eq!(first.outcome, ApplyOutcome::Created);
    let report = first.report();
    assert!(report.changed);
    assert_eq!(report.actions, vec![format!("Created dn '{GUEST}'")]);

    let stored = directory.get(&dn(GUEST)).unwrap();
    assert_eq!(stored.object_classes().collect::<Vec<_>>(), vec!["inetOrgPerson"]);
    assert_eq!(stored.get("sn").unwrap().first(), Some("User"));

    let writes = directory.counts().writes();
    let second = reconciler.apply(&guest()).await.unwrap();
    assert_eq!(second, ApplyOutcome::Unchanged);
    assert_eq!(directory.counts().writes(), writes);
}

#[tokio::test]
async fn test_converged_entry_issues_single_read() {
    let directory = Arc::new(MemoryDirectory::with_entries([stored_guest("User")]));

    let outcome = reconciler(&directory).apply(&guest()).await.unwrap();

    assert_eq!(outcome, ApplyOutcome::Unchanged);
    let counts = directory.counts();
    assert_eq!(counts.searches, 1);
    assert_eq!(counts.writes(), 0);
}

#[tokio::test]
async fn test_update_preserves_unmanaged_attributes() {
    let mut existing = stored_guest("Old");
    existing
        .attributes
        .insert("description", AttributeValues::single("managed elsewhere"));
    let directory = Arc::new(MemoryDirectory::with_entries([existing]));

    let applied = reconciler(&directory).reconcile(&guest()).await.unwrap();

    assert_eq!(applied.outcome, ApplyOutcome::Updated);
    assert_eq!(applied.report().modifications, vec!["replace sn: User"]);
    let stored = directory.get(&dn(GUEST)).unwrap();
    assert_eq!(stored.get("sn").unwrap().first(), Some("User"));
    assert_eq!(
        stored.get("description").unwrap().first(),
        Some("managed elsewhere")
    );
    assert_eq!(directory.counts().modifies, 1);
}

#[tokio::test]
async fn test_empty_value_list_removes_attribute() {
    let mut existing = stored_guest("User");
    existing
        .attributes
        .insert("mail", AttributeValues::single("guest@example.com"));
    let directory = Arc::new(MemoryDirectory::with_entries([existing]));

    let mut desired = guest();
    desired.attributes.insert("mail", AttributeValues::empty());

    let reconciler = reconciler(&directory);
    assert_eq!(reconciler.apply(&desired).await.unwrap(), ApplyOutcome::Updated);
    assert!(!directory.get(&dn(GUEST)).unwrap().attributes.contains("mail"));
    assert_eq!(reconciler.apply(&desired).await.unwrap(), ApplyOutcome::Unchanged);
}

// ============================================================================
// Concurrent create
// ============================================================================

#[tokio::test]
async fn test_concurrent_create_recovers_with_update() {
    let directory = Arc::new(MemoryDirectory::new());
    directory.inject(Operation::Add, Injection::WriteFirst(stored_guest("Other")));

    let outcome = reconciler(&directory).apply(&guest()).await.unwrap();

    assert_eq!(outcome, ApplyOutcome::Updated);
    let stored = directory.get(&dn(GUEST)).unwrap();
    assert_eq!(stored.get("sn").unwrap().first(), Some("User"));
    let counts = directory.counts();
    assert_eq!(counts.adds, 1);
    assert_eq!(counts.modifies, 1);
}

#[tokio::test]
async fn test_concurrent_create_already_converged() {
    let directory = Arc::new(MemoryDirectory::new());
    directory.inject(Operation::Add, Injection::WriteFirst(stored_guest("User")));

    let outcome = reconciler(&directory).apply(&guest()).await.unwrap();

    assert_eq!(outcome, ApplyOutcome::Unchanged);
    assert_eq!(directory.counts().modifies, 0);
}

#[tokio::test]
async fn test_concurrent_create_update_failure_surfaces() {
    let directory = Arc::new(MemoryDirectory::new());
    directory.inject(Operation::Add, Injection::WriteFirst(stored_guest("Other")));
    directory.inject(
        Operation::Modify,
        Injection::Fail(DirectoryError::ConstraintViolation("rejected".into())),
    );

    let err = reconciler(&directory).apply(&guest()).await.unwrap_err();

    assert!(matches!(err, ReconcileError::CreateRace { .. }));
    assert_eq!(directory.counts().modifies, 1);
}

#[tokio::test]
async fn test_add_conflict_without_entry_reports_original_error() {
    let directory = Arc::new(MemoryDirectory::new());
    directory.inject(
        Operation::Add,
        Injection::Fail(DirectoryError::ConstraintViolation("schema".into())),
    );

    let err = reconciler(&directory).apply(&guest()).await.unwrap_err();

    assert!(matches!(
        err.directory_error(),
        Some(DirectoryError::ConstraintViolation(_))
    ));
    assert_eq!(directory.counts().modifies, 0);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_connection_error_is_retryable_and_writes_nothing() {
    let directory = Arc::new(MemoryDirectory::new());
    directory.inject(
        Operation::Search,
        Injection::Fail(DirectoryError::ConnectionError("refused".into())),
    );

    let err = reconciler(&directory).apply(&guest()).await.unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(err.kind(), "connection_error");
    assert_eq!(directory.counts().writes(), 0);
}

#[tokio::test]
async fn test_slow_directory_times_out() {
    let directory = Arc::new(MemoryDirectory::new());
    directory.inject(Operation::Search, Injection::Delay(Duration::from_secs(5)));

    let config = ReconcileConfig {
        timeout_secs: 0,
        ..ReconcileConfig::default()
    };
    let err = Reconciler::new(directory.clone(), config)
        .apply(&guest())
        .await
        .unwrap_err();

    assert!(matches!(
        err.directory_error(),
        Some(DirectoryError::Timeout { .. })
    ));
    assert_eq!(directory.counts().writes(), 0);
}

// ============================================================================
// Remove, check mode, verify
// ============================================================================

#[tokio::test]
async fn test_remove_is_idempotent() {
    let directory = Arc::new(MemoryDirectory::with_entries([stored_guest("User")]));
    let reconciler = reconciler(&directory);

    assert_eq!(
        reconciler.remove(&dn(GUEST)).await.unwrap(),
        RemoveOutcome::Removed
    );
    assert!(directory.is_empty());
    assert_eq!(
        reconciler.remove(&dn(GUEST)).await.unwrap(),
        RemoveOutcome::Absent
    );
    assert_eq!(directory.counts().deletes, 1);
}

#[tokio::test]
async fn test_check_mode_never_writes() {
    let directory = Arc::new(ReadOnlyDirectory(MemoryDirectory::with_entries([
        stored_guest("Old"),
    ])));
    let config = ReconcileConfig {
        check_mode: true,
        ..ReconcileConfig::default()
    };
    let reconciler = Reconciler::new(directory, config);

    let applied = reconciler.reconcile(&guest()).await.unwrap();
    assert_eq!(applied.outcome, ApplyOutcome::Updated);
    assert!(applied.report().check_mode);
    assert_eq!(applied.report().modifications, vec!["replace sn: User"]);

    let mut other = guest();
    other.dn = dn("uid=other,ou=People,dc=example,dc=com");
    assert_eq!(reconciler.apply(&other).await.unwrap(), ApplyOutcome::Created);

    assert_eq!(
        reconciler.remove(&dn(GUEST)).await.unwrap(),
        RemoveOutcome::Removed
    );
}

#[tokio::test]
async fn test_verify_reports_convergence() {
    let directory = Arc::new(MemoryDirectory::new());
    let config = ReconcileConfig {
        verify: true,
        ..ReconcileConfig::default()
    };

    let applied = Reconciler::new(directory, config)
        .reconcile(&guest())
        .await
        .unwrap();

    assert_eq!(applied.verified, Some(true));
    assert_eq!(applied.report().verified, Some(true));
}

#[tokio::test]
async fn test_plan_does_not_write() {
    let directory = Arc::new(MemoryDirectory::with_entries([stored_guest("Old")]));

    let plan = reconciler(&directory).plan(&guest()).await.unwrap();

    assert!(!plan.is_create());
    assert_eq!(plan.describe(), vec!["replace sn: User"]);
    assert_eq!(directory.counts().writes(), 0);
}

// ============================================================================
// Batch
// ============================================================================

#[tokio::test]
async fn test_batch_isolates_failures() {
    let directory = Arc::new(MemoryDirectory::with_entries([stored_guest("User")]));

    let broken = spec("uid={missing},ou=People,dc=example,dc=com", "broken");

    let specs = vec![
        spec("uid={uid},ou=People,dc=example,dc=com", "alice"),
        broken,
        spec("uid={uid},ou=People,dc=example,dc=com", "bob"),
        EntrySpec {
            state: EntryState::Absent,
            ..spec(GUEST, "guest")
        },
    ];

    let report = reconciler(&directory).apply_batch(specs, 2).await;

    assert_eq!(report.total, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(report.changed, 3);
    assert_eq!(
        report.results[0].dn,
        "uid=alice,ou=People,dc=example,dc=com"
    );
    assert_eq!(report.results[1].error.as_ref().unwrap().kind, "configuration");
    assert_eq!(
        report.results[3].report.as_ref().unwrap().outcome,
        EntryOutcome::Removed
    );
    assert!(directory.get(&dn("uid=bob,ou=People,dc=example,dc=com")).is_some());
    assert!(directory.get(&dn(GUEST)).is_none());
}

// ============================================================================
// Actor
// ============================================================================

#[tokio::test]
async fn test_actor_applies_and_announces() {
    let directory = Arc::new(MemoryDirectory::new());
    let (tx, mut rx) = broadcast::channel(16);

    let args = DirectoryActorArgs {
        reconciler: reconciler(&directory),
        inventory: None,
        event_tx: tx,
    };
    let actor_ref = DirectoryActor::spawn(args);

    let report = actor_ref
        .ask(ApplyEntry {
            spec: spec("uid={uid},ou=People,dc=example,dc=com", "guest"),
            check_mode: false,
        })
        .await
        .unwrap();
    assert_eq!(report.outcome, EntryOutcome::Created);
    assert_eq!(
        rx.recv().await.unwrap(),
        DirectoryEvent::EntryCreated {
            dn: GUEST.to_string()
        }
    );

    let report = actor_ref
        .ask(RemoveEntry {
            dn: dn(GUEST),
            check_mode: true,
        })
        .await
        .unwrap();
    assert!(report.check_mode);
    assert!(directory.get(&dn(GUEST)).is_some());

    let status = actor_ref.ask(GetStatus).await.unwrap();
    assert_eq!(status.client, "memory");
    assert_eq!(status.changed, 1);
    assert!(!status.inventory_configured);

    assert!(actor_ref.ask(BuildInventory).await.is_err());

    actor_ref.stop_gracefully().await.unwrap();
}

#[tokio::test]
async fn test_actor_builds_inventory() {
    let base = "cn=accounts,dc=example,dc=com";
    let member = format!("fqdn=web1,cn=computers,{base}");
    let group = ObservedEntry::new(
        dn(&format!("cn=web,cn=hostgroups,{base}")),
        attrs(&[
            ("objectClass", &["ipaHostGroup"]),
            ("cn", &["web"]),
            ("member", &[member.as_str()]),
        ]),
    );
    let host = ObservedEntry::new(
        dn(&format!("fqdn=web1,cn=computers,{base}")),
        attrs(&[("objectClass", &["ipaHost"]), ("fqdn", &["web1"])]),
    );
    let directory = Arc::new(MemoryDirectory::with_entries([group, host]));
    let (tx, _rx) = broadcast::channel(16);

    let inventory = InventorySource {
        builder: InventoryBuilder::new(directory.clone(), WalkerConfig::default())
            .with_hostgroup_base(dn(&format!("cn=hostgroups,{base}"))),
        roots: Vec::new(),
        naming: NamingRules::default(),
        variables: HostVariableRules::default(),
    };
    let actor_ref = DirectoryActor::spawn(DirectoryActorArgs {
        reconciler: reconciler(&directory),
        inventory: Some(inventory),
        event_tx: tx,
    });

    let response = actor_ref.ask(BuildInventory).await.unwrap();

    assert!(response.errors.is_empty());
    assert_eq!(response.inventory.groups["web"].hosts, vec!["web1"]);
    assert_eq!(response.inventory.groups[ALL_GROUP].children, vec!["web"]);

    actor_ref.stop_gracefully().await.unwrap();
}
