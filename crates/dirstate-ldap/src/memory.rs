//! In-memory directory
//!
//! Implements `DirectoryClient` over a map of entries. Used by tests and by
//! the CLI's `--memory` mode. It follows server semantics for the error
//! categories the reconciler cares about, but does not enforce the tree
//! structure: parents need not exist, and one-level or subtree searches
//! below a missing base still return its descendants.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::dn::Dn;
use crate::entry::{AttributeSet, AttributeValues, Modification, ObservedEntry, Scope};
use crate::error::DirectoryError;
use crate::filter::Filter;
use crate::traits::DirectoryClient;

/// Directory operation kinds, used to target injected behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Search,
    Add,
    Modify,
    Delete,
}

/// Behaviour injected into the next matching operation
#[derive(Debug, Clone)]
pub enum Injection {
    /// Fail with the given error without touching state
    Fail(DirectoryError),
    /// Store this entry just before the operation runs, as a concurrent writer would
    WriteFirst(ObservedEntry),
    /// Sleep before running the operation
    Delay(Duration),
}

/// Number of requests served per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounts {
    pub searches: usize,
    pub adds: usize,
    pub modifies: usize,
    pub deletes: usize,
}

impl OperationCounts {
    /// Adds, modifies and deletes
    #[must_use]
    pub fn writes(&self) -> usize {
        self.adds + self.modifies + self.deletes
    }
}

/// In-memory `DirectoryClient`
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    entries: Mutex<BTreeMap<Dn, AttributeSet>>,
    injections: Mutex<Vec<(Operation, Injection)>>,
    searches: AtomicUsize,
    adds: AtomicUsize,
    modifies: AtomicUsize,
    deletes: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory holding the given entries
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = ObservedEntry>) -> Self {
        let directory = Self::new();
        for entry in entries {
            directory.insert(entry);
        }
        directory
    }

    /// Store an entry directly, bypassing request accounting
    pub fn insert(&self, entry: ObservedEntry) {
        lock(&self.entries).insert(entry.dn, entry.attributes);
    }

    /// Read an entry directly, bypassing request accounting
    #[must_use]
    pub fn get(&self, dn: &Dn) -> Option<ObservedEntry> {
        lock(&self.entries)
            .get_key_value(dn)
            .map(|(dn, attrs)| ObservedEntry::new(dn.clone(), attrs.clone()))
    }

    /// Number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue behaviour for the next request of the given kind
    pub fn inject(&self, operation: Operation, injection: Injection) {
        lock(&self.injections).push((operation, injection));
    }

    /// Requests served so far
    #[must_use]
    pub fn counts(&self) -> OperationCounts {
        OperationCounts {
            searches: self.searches.load(Ordering::SeqCst),
            adds: self.adds.load(Ordering::SeqCst),
            modifies: self.modifies.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
        }
    }

    /// Run the first queued injection for `operation`, if any
    async fn before(&self, operation: Operation) -> Result<(), DirectoryError> {
        let counter = match operation {
            Operation::Search => &self.searches,
            Operation::Add => &self.adds,
            Operation::Modify => &self.modifies,
            Operation::Delete => &self.deletes,
        };
        counter.fetch_add(1, Ordering::SeqCst);

        let injection = {
            let mut queue = lock(&self.injections);
            queue
                .iter()
                .position(|(op, _)| *op == operation)
                .map(|idx| queue.remove(idx).1)
        };

        match injection {
            None => Ok(()),
            Some(Injection::Fail(e)) => {
                debug!(?operation, error = %e, "injected failure");
                Err(e)
            }
            Some(Injection::WriteFirst(entry)) => {
                debug!(?operation, dn = %entry.dn, "injected concurrent write");
                self.insert(entry);
                Ok(())
            }
            Some(Injection::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

fn project(attrs: &AttributeSet, requested: &[&str]) -> AttributeSet {
    if requested.is_empty() || requested.contains(&"*") {
        return attrs.clone();
    }
    attrs
        .iter()
        .filter(|(name, _)| requested.iter().any(|r| r.eq_ignore_ascii_case(name)))
        .map(|(name, values)| (name.to_string(), values.clone()))
        .collect()
}

fn apply_modification(
    attrs: &mut AttributeSet,
    modification: &Modification,
    dn: &Dn,
) -> Result<(), DirectoryError> {
    match modification {
        Modification::Add { attribute, values } => {
            if values.is_empty() {
                return Err(DirectoryError::ConstraintViolation(format!(
                    "add of '{attribute}' on {dn} carries no values"
                )));
            }
            if !attrs.contains(attribute) {
                attrs.insert(attribute.clone(), AttributeValues::empty());
            }
            let current = attrs
                .get_mut(attribute)
                .ok_or_else(|| DirectoryError::NotFound(attribute.clone()))?;
            for value in values.iter() {
                if current.iter().any(|v| v == value) {
                    return Err(DirectoryError::ConstraintViolation(format!(
                        "value '{value}' of '{attribute}' already exists on {dn}"
                    )));
                }
                current.push_unique(value);
            }
        }
        Modification::Replace { attribute, values } => {
            if values.is_empty() {
                attrs.remove(attribute);
            } else {
                attrs.insert(attribute.clone(), values.clone());
            }
        }
        Modification::Delete { attribute, values } => {
            if !attrs.contains(attribute) {
                return Err(DirectoryError::ConstraintViolation(format!(
                    "no attribute '{attribute}' on {dn}"
                )));
            }
            if values.is_empty() {
                attrs.remove(attribute);
            } else {
                let current = attrs
                    .get_mut(attribute)
                    .ok_or_else(|| DirectoryError::NotFound(attribute.clone()))?;
                for value in values.iter() {
                    if !current.remove(value) {
                        return Err(DirectoryError::ConstraintViolation(format!(
                            "no value '{value}' of '{attribute}' on {dn}"
                        )));
                    }
                }
                if current.is_empty() {
                    attrs.remove(attribute);
                }
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    #[instrument(skip(self, filter, attributes), fields(filter = %filter), level = "debug")]
    async fn search(
        &self,
        base: &Dn,
        scope: Scope,
        filter: &Filter,
        attributes: &[&str],
    ) -> Result<Vec<ObservedEntry>, DirectoryError> {
        self.before(Operation::Search).await?;

        let entries = lock(&self.entries);

        if scope == Scope::Base && !entries.contains_key(base) {
            return Err(DirectoryError::NotFound(base.to_string()));
        }

        let results: Vec<ObservedEntry> = entries
            .iter()
            .filter(|(dn, _)| match scope {
                Scope::Base => *dn == base,
                Scope::OneLevel => dn.is_child_of(base),
                Scope::Subtree => *dn == base || dn.is_descendant_of(base),
            })
            .map(|(dn, attrs)| ObservedEntry::new(dn.clone(), attrs.clone()))
            .filter(|entry| filter.matches(entry))
            .map(|entry| ObservedEntry::new(entry.dn, project(&entry.attributes, attributes)))
            .collect();

        debug!(results = results.len(), "search completed");

        Ok(results)
    }

    #[instrument(skip(self, object_classes, attributes), fields(dn = %dn), level = "debug")]
    async fn add(
        &self,
        dn: &Dn,
        object_classes: &[String],
        attributes: &AttributeSet,
    ) -> Result<(), DirectoryError> {
        self.before(Operation::Add).await?;

        let mut entries = lock(&self.entries);
        if entries.contains_key(dn) {
            return Err(DirectoryError::AlreadyExists(dn.to_string()));
        }
        if object_classes.is_empty() {
            return Err(DirectoryError::ConstraintViolation(format!(
                "{dn} has no objectClass"
            )));
        }

        let mut stored = AttributeSet::new();
        stored.insert("objectClass", AttributeValues::many(object_classes.iter().cloned()));
        for (name, values) in attributes.iter() {
            if name.eq_ignore_ascii_case("objectClass") || values.is_empty() {
                continue;
            }
            stored.insert(name, values.clone());
        }

        entries.insert(dn.clone(), stored);
        Ok(())
    }

    #[instrument(skip(self, modifications), fields(dn = %dn, count = modifications.len()), level = "debug")]
    async fn modify(&self, dn: &Dn, modifications: &[Modification]) -> Result<(), DirectoryError> {
        self.before(Operation::Modify).await?;

        let mut entries = lock(&self.entries);
        let current = entries
            .get(dn)
            .ok_or_else(|| DirectoryError::NotFound(dn.to_string()))?;

        // Work on a copy so a failing modification leaves the entry untouched
        let mut updated = current.clone();
        for modification in modifications {
            apply_modification(&mut updated, modification, dn)?;
        }

        entries.insert(dn.clone(), updated);
        Ok(())
    }

    #[instrument(skip(self), fields(dn = %dn), level = "debug")]
    async fn delete(&self, dn: &Dn) -> Result<(), DirectoryError> {
        self.before(Operation::Delete).await?;

        let mut entries = lock(&self.entries);
        if !entries.contains_key(dn) {
            return Err(DirectoryError::NotFound(dn.to_string()));
        }
        if entries.keys().any(|other| other.is_child_of(dn)) {
            return Err(DirectoryError::Other {
                code: 66,
                message: format!("{dn} is not a leaf entry"),
            });
        }

        entries.remove(dn);
        Ok(())
    }

    fn client_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn person(uid: &str) -> AttributeSet {
        [("uid", AttributeValues::single(uid)), ("sn", AttributeValues::single("User"))]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn test_add_then_fetch() {
        let directory = MemoryDirectory::new();
        let target = dn("uid=guest,ou=People,dc=example,dc=com");

        directory
            .add(&target, &["inetOrgPerson".to_string()], &person("guest"))
            .await
            .unwrap();

        let entry = directory.fetch(&target, &[]).await.unwrap().unwrap();
        assert!(entry.has_object_class("inetOrgPerson"));
        assert_eq!(entry.get("uid").unwrap().first(), Some("guest"));
        assert_eq!(directory.counts().adds, 1);
        assert_eq!(directory.counts().searches, 1);
    }

    #[tokio::test]
    async fn test_add_existing_fails() {
        let directory = MemoryDirectory::new();
        let target = dn("uid=guest,dc=example");
        let classes = ["person".to_string()];

        directory.add(&target, &classes, &person("guest")).await.unwrap();
        let err = directory
            .add(&target, &classes, &person("guest"))
            .await
            .unwrap_err();

        assert!(matches!(err, DirectoryError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_fetch_missing_is_none() {
        let directory = MemoryDirectory::new();
        let entry = directory.fetch(&dn("uid=nobody,dc=example"), &[]).await.unwrap();
        assert!(entry.is_none());
    }

    #[tokio::test]
    async fn test_modify_is_atomic() {
        let target = dn("uid=guest,dc=example");
        let directory = MemoryDirectory::with_entries([ObservedEntry::new(
            target.clone(),
            person("guest"),
        )]);

        let err = directory
            .modify(
                &target,
                &[
                    Modification::Replace {
                        attribute: "sn".to_string(),
                        values: AttributeValues::single("Changed"),
                    },
                    Modification::Delete {
                        attribute: "mail".to_string(),
                        values: AttributeValues::empty(),
                    },
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DirectoryError::ConstraintViolation(_)));
        let entry = directory.get(&target).unwrap();
        assert_eq!(entry.get("sn").unwrap().first(), Some("User"));
    }

    #[tokio::test]
    async fn test_search_scopes() {
        let base = dn("cn=hostgroups,dc=example");
        let directory = MemoryDirectory::with_entries([
            ObservedEntry::new(base.clone(), person("container")),
            ObservedEntry::new(dn("cn=web,cn=hostgroups,dc=example"), person("web")),
            ObservedEntry::new(dn("cn=deep,cn=web,cn=hostgroups,dc=example"), person("deep")),
        ]);
        let filter = Filter::present("uid");

        let one = directory.search(&base, Scope::OneLevel, &filter, &[]).await.unwrap();
        let sub = directory.search(&base, Scope::Subtree, &filter, &[]).await.unwrap();

        assert_eq!(one.len(), 1);
        assert_eq!(sub.len(), 3);
    }

    #[tokio::test]
    async fn test_attribute_projection() {
        let target = dn("uid=guest,dc=example");
        let directory =
            MemoryDirectory::with_entries([ObservedEntry::new(target.clone(), person("guest"))]);

        let entry = directory.fetch(&target, &["SN"]).await.unwrap().unwrap();
        assert!(entry.get("sn").is_some());
        assert!(entry.get("uid").is_none());
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let directory = MemoryDirectory::new();
        directory.inject(
            Operation::Search,
            Injection::Fail(DirectoryError::ConnectionError("reset".to_string())),
        );
        let target = dn("uid=guest,dc=example");

        assert!(directory.fetch(&target, &[]).await.is_err());
        assert!(directory.fetch(&target, &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_non_leaf_rejected() {
        let parent = dn("ou=People,dc=example");
        let directory = MemoryDirectory::with_entries([
            ObservedEntry::new(parent.clone(), person("ou")),
            ObservedEntry::new(dn("uid=guest,ou=People,dc=example"), person("guest")),
        ]);

        let err = directory.delete(&parent).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Other { code: 66, .. }));
    }
}
