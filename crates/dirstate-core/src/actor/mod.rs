//! Actor implementations

pub mod directory;

pub use directory::{DirectoryActor, DirectoryActorArgs, InventorySource};
