//! Application state shared across HTTP handlers

use std::sync::Arc;

use dirstate_core::DirectoryActor;
use kameo::actor::ActorRef;

use crate::config::Config;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Reference to the directory actor
    pub directory: ActorRef<DirectoryActor>,
    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state
    pub fn new(directory: ActorRef<DirectoryActor>, config: Config) -> Self {
        Self {
            directory,
            config: Arc::new(config),
        }
    }
}
