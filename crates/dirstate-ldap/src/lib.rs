//! dirstate-ldap: Directory access abstraction
//!
//! Provides the directory data model (DNs, attribute sets, modifications), the
//! `DirectoryClient` trait, an in-memory directory and an LDAP implementation.

pub mod dn;
pub mod entry;
pub mod filter;
pub mod error;
pub mod ldap;
pub mod memory;
pub mod profile;
pub mod traits;

pub use dn::Dn;
pub use entry::{AttributeSet, AttributeValues, Modification, ObservedEntry, Scope};
pub use error::{ConfigurationError, DirectoryError};
pub use filter::Filter;
pub use ldap::LdapClient;
pub use memory::{Injection, MemoryDirectory, Operation, OperationCounts};
pub use profile::{ConnectionProfile, Credentials};
pub use traits::DirectoryClient;
