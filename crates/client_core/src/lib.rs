//! Client-side state engine for the server-monitoring dashboard.

use std::sync::Arc;

pub mod cache;
pub mod config;
pub mod directory;
pub mod filter;
pub mod orchestrator;
pub mod tracker;

pub use cache::{Snapshot, SnapshotCache};
pub use config::{load_settings, load_settings_from, Settings, SettingsError};
pub use directory::{DirectoryClient, DirectoryResult, HttpDirectoryClient};
pub use filter::{evaluate, FilteredView, StatusFilter};
pub use orchestrator::{
    Action, ApplicationState, Notification, NotificationLevel, Phase, StateOrchestrator,
    StateStream,
};
pub use tracker::{ActiveOperationTracker, OperationKey};

/// Orchestrator wired to the HTTP directory described by `settings`.
pub fn connect(settings: &Settings) -> Arc<StateOrchestrator> {
    let directory: Arc<dyn DirectoryClient> = Arc::new(HttpDirectoryClient::new(settings));
    StateOrchestrator::new(directory, settings)
}
