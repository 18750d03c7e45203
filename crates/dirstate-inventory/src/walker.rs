//! Group membership graph walker
//!
//! Resolves the set of hosts reachable from one or more root groups. Groups
//! may contain groups, and membership may be cyclic; the walk is breadth-first
//! with an explicit visited-set so every group is expanded at most once.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dirstate_ldap::{DirectoryClient, DirectoryError, Dn, ObservedEntry};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::types::{Resolution, ResolutionWarning, ResolvedHost};

/// How groups and members are recognised
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// Attribute listing a group's direct members
    pub member_attribute: String,
    /// Object classes that mark an entry as a group
    pub group_object_classes: Vec<String>,
    /// Attribute whose presence also marks an entry as a group
    pub group_attribute: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            member_attribute: "member".to_string(),
            group_object_classes: vec![
                "ipaHostGroup".to_string(),
                "groupOfNames".to_string(),
                "groupOfUniqueNames".to_string(),
            ],
            group_attribute: None,
            timeout_secs: 30,
        }
    }
}

impl WalkerConfig {
    /// Per-request timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check whether an entry is a group
    #[must_use]
    pub fn is_group(&self, entry: &ObservedEntry) -> bool {
        self.group_object_classes
            .iter()
            .any(|class| entry.has_object_class(class))
            || self
                .group_attribute
                .as_deref()
                .is_some_and(|attr| entry.get(attr).is_some_and(|v| !v.is_empty()))
    }
}

/// Breadth-first walker over a directory's group graph
#[derive(Clone)]
pub struct GraphWalker {
    client: Arc<dyn DirectoryClient>,
    config: WalkerConfig,
}

impl GraphWalker {
    /// Create a walker
    pub fn new(client: Arc<dyn DirectoryClient>, config: WalkerConfig) -> Self {
        Self { client, config }
    }

    /// Walker configuration
    #[must_use]
    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    /// Resolve every host reachable from `roots`
    ///
    /// Missing roots and dangling members become warnings and are skipped.
    ///
    /// # Errors
    /// Connection failures and timeouts abort the walk.
    #[instrument(skip(self, roots), fields(roots = roots.len(), client = self.client.client_type()))]
    pub async fn resolve(&self, roots: &[Dn]) -> Result<Resolution, DirectoryError> {
        let mut resolution = Resolution::default();
        let mut visited: HashSet<Dn> = HashSet::new();
        let mut seen_hosts: HashSet<Dn> = HashSet::new();
        let mut missing: HashSet<Dn> = HashSet::new();
        let mut nested: HashSet<Dn> = HashSet::new();
        let mut queue: VecDeque<(ObservedEntry, usize)> = VecDeque::new();

        for root in roots {
            if visited.contains(root) {
                continue;
            }
            match self.fetch(root).await? {
                Some(entry) => {
                    visited.insert(root.clone());
                    resolution.visited_groups.push(root.clone());
                    queue.push_back((entry, 0));
                }
                None => {
                    warn!(dn = %root, "root group does not exist");
                    resolution.warnings.push(ResolutionWarning::missing_root(root));
                }
            }
        }

        while let Some((group, depth)) = queue.pop_front() {
            let members: Vec<String> = group
                .get(&self.config.member_attribute)
                .map(|values| values.iter().map(str::to_string).collect())
                .unwrap_or_default();

            debug!(group = %group.dn, depth, members = members.len(), "expanding group");

            for raw in members {
                let member = match Dn::parse(&raw) {
                    Ok(dn) => dn,
                    Err(_) => {
                        warn!(group = %group.dn, value = %raw, "member value is not a DN");
                        resolution
                            .warnings
                            .push(ResolutionWarning::malformed(&raw, &group.dn));
                        continue;
                    }
                };

                if visited.contains(&member) {
                    if depth == 0 && nested.insert(member.clone()) {
                        resolution.nested_groups.push(member);
                    }
                    continue;
                }
                if seen_hosts.contains(&member) {
                    continue;
                }
                if missing.contains(&member) {
                    resolution
                        .warnings
                        .push(ResolutionWarning::dangling(&member, &group.dn));
                    continue;
                }

                let Some(entry) = self.fetch(&member).await? else {
                    warn!(group = %group.dn, member = %member, "dangling member");
                    resolution
                        .warnings
                        .push(ResolutionWarning::dangling(&member, &group.dn));
                    missing.insert(member);
                    continue;
                };

                if self.config.is_group(&entry) {
                    visited.insert(member.clone());
                    resolution.visited_groups.push(member.clone());
                    if depth == 0 && nested.insert(member.clone()) {
                        resolution.nested_groups.push(member);
                    }
                    queue.push_back((entry, depth + 1));
                } else {
                    seen_hosts.insert(member.clone());
                    resolution.hosts.push(ResolvedHost {
                        dn: member,
                        depth: depth + 1,
                        attributes: entry.attributes,
                    });
                }
            }
        }

        debug!(
            hosts = resolution.hosts.len(),
            groups = resolution.visited_groups.len(),
            warnings = resolution.warnings.len(),
            "resolution complete"
        );
        Ok(resolution)
    }

    async fn fetch(&self, dn: &Dn) -> Result<Option<ObservedEntry>, DirectoryError> {
        with_timeout(self.config.timeout(), self.client.fetch(dn, &[])).await
    }
}

/// Run a directory request with a deadline
pub(crate) async fn with_timeout<T>(
    timeout: Duration,
    request: impl Future<Output = Result<T, DirectoryError>>,
) -> Result<T, DirectoryError> {
    tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| DirectoryError::Timeout { timeout })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirstate_ldap::{AttributeSet, AttributeValues, MemoryDirectory};

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn group(members: &[&str]) -> AttributeSet {
        let mut attrs = AttributeSet::new();
        attrs.insert("objectClass", AttributeValues::many(["top", "groupOfNames"]));
        if !members.is_empty() {
            attrs.insert("member", AttributeValues::many(members.iter().copied()));
        }
        attrs
    }

    fn host() -> AttributeSet {
        let mut attrs = AttributeSet::new();
        attrs.insert("objectClass", AttributeValues::many(["top", "device"]));
        attrs
    }

    #[test]
    fn test_group_classification() {
        let config = WalkerConfig::default();
        let g = ObservedEntry::new(dn("cn=g,dc=x"), group(&[]));
        let h = ObservedEntry::new(dn("cn=h,dc=x"), host());

        assert!(config.is_group(&g));
        assert!(!config.is_group(&h));

        let config = WalkerConfig {
            group_attribute: Some("objectClass".into()),
            ..WalkerConfig::default()
        };
        assert!(config.is_group(&h));
    }

    #[tokio::test]
    async fn test_members_fetched_once() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.insert(ObservedEntry::new(dn("cn=h1,dc=x"), host()));
        directory.insert(ObservedEntry::new(dn("cn=a,dc=x"), group(&["cn=h1,dc=x"])));
        directory.insert(ObservedEntry::new(dn("cn=b,dc=x"), group(&["cn=h1,dc=x"])));
        directory.insert(ObservedEntry::new(
            dn("cn=root,dc=x"),
            group(&["cn=a,dc=x", "cn=b,dc=x"]),
        ));

        let walker = GraphWalker::new(directory.clone(), WalkerConfig::default());
        let resolution = walker.resolve(&[dn("cn=root,dc=x")]).await.unwrap();

        assert_eq!(resolution.hosts.len(), 1);
        assert_eq!(resolution.hosts[0].depth, 2);
        assert_eq!(resolution.nested_groups.len(), 2);
        // root, a, b, h1
        assert_eq!(directory.counts().searches, 4);
    }

    #[tokio::test]
    async fn test_malformed_member_is_warning() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.insert(ObservedEntry::new(dn("cn=root,dc=x"), group(&["not a dn"])));

        let walker = GraphWalker::new(directory, WalkerConfig::default());
        let resolution = walker.resolve(&[dn("cn=root,dc=x")]).await.unwrap();

        assert!(resolution.hosts.is_empty());
        assert_eq!(resolution.warnings.len(), 1);
    }
}
