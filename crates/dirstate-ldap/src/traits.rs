//! Directory client trait

use async_trait::async_trait;

use crate::dn::Dn;
use crate::entry::{AttributeSet, Modification, ObservedEntry, Scope};
use crate::error::DirectoryError;
use crate::filter::Filter;

/// Request/response access to a directory service
///
/// Every method is a single request. Implementations must make `add` and
/// `modify` atomic: either all attribute changes become visible or none do.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Search below `base`. An empty `attributes` slice requests all user attributes.
    async fn search(
        &self,
        base: &Dn,
        scope: Scope,
        filter: &Filter,
        attributes: &[&str],
    ) -> Result<Vec<ObservedEntry>, DirectoryError>;

    /// Create an entry
    async fn add(
        &self,
        dn: &Dn,
        object_classes: &[String],
        attributes: &AttributeSet,
    ) -> Result<(), DirectoryError>;

    /// Apply all modifications to an entry in one request
    async fn modify(&self, dn: &Dn, modifications: &[Modification]) -> Result<(), DirectoryError>;

    /// Delete a leaf entry
    async fn delete(&self, dn: &Dn) -> Result<(), DirectoryError>;

    /// Short name of the implementation, for logs
    fn client_type(&self) -> &'static str;

    /// Read a single entry; a missing entry is `Ok(None)`
    async fn fetch(
        &self,
        dn: &Dn,
        attributes: &[&str],
    ) -> Result<Option<ObservedEntry>, DirectoryError> {
        match self
            .search(dn, Scope::Base, &Filter::any_object(), attributes)
            .await
        {
            Ok(entries) => Ok(entries.into_iter().next()),
            Err(DirectoryError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
