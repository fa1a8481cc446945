//! Sandbox backend: no managed environment behind it

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::deploy::backend::{BackendError, BundleBackend};
use crate::models::bundle::Bundle;
use crate::models::user::User;

/// Accepts any well-formed bundle and pretends to deploy it
#[derive(Debug, Clone)]
pub struct SandboxBackend {
    simulated_duration: Duration,
}

impl SandboxBackend {
    pub fn new(simulated_duration: Duration) -> Self {
        Self { simulated_duration }
    }
}

impl Default for SandboxBackend {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl BundleBackend for SandboxBackend {
    async fn validate(&self, _user: &User, _name: &str, bundle: &Bundle) -> Result<(), BackendError> {
        let services = bundle
            .document()
            .get("services")
            .and_then(|s| s.as_object())
            .ok_or_else(|| BackendError::Rejected("no services defined".to_string()))?;

        if services.is_empty() {
            return Err(BackendError::Rejected("no services defined".to_string()));
        }
        Ok(())
    }

    fn import_bundle(&self, user: &User, name: &str, _bundle: &Bundle) -> Result<(), BackendError> {
        info!(
            "Sandbox import of bundle {} for {} ({:?})",
            name, user.username, self.simulated_duration
        );
        std::thread::sleep(self.simulated_duration);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "sandbox"
    }
}
