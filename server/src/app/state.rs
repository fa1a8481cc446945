//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::deploy::backend::Backend;
use crate::deploy::deployer::Deployer;
use crate::storage::settings::BackendSettings;

/// Main application state
pub struct AppState {
    /// The bundle deployer shared by the worker and the server
    pub deployer: Arc<Deployer>,
}

impl AppState {
    /// Initialize application state
    pub fn init(backend: &BackendSettings) -> Self {
        info!("Initializing application state...");

        let backend = Arc::new(Backend::from_settings(backend));
        let deployer = Arc::new(Deployer::new(backend));

        Self { deployer }
    }

    /// Shutdown application state
    pub fn shutdown(&self) {
        let active = self.deployer.active_count();
        if active > 0 {
            info!("Shutting down with {} deployment(s) not completed", active);
        } else {
            info!("Shutting down application state...");
        }
    }
}
