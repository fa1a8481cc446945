//! Deployment backends
//!
//! A backend is the pair of collaborators the deployer drives: an
//! asynchronous validation call and a blocking import call. The import call
//! is never invoked concurrently with itself; the deployer guarantees this by
//! running it only from its single worker.

pub mod command;
pub mod sandbox;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::bundle::Bundle;
use crate::models::user::User;
use crate::storage::settings::BackendSettings;

pub use command::CommandBackend;
pub use sandbox::SandboxBackend;

/// Outcome of a failed backend call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The environment refused the bundle
    #[error("{0}")]
    Rejected(String),

    /// The call did not finish in time and was abandoned
    #[error("timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    /// The call could not be carried out at all
    #[error("unexpected fault: {0}")]
    Fault(String),
}

/// Validation and import collaborators
#[async_trait]
pub trait BundleBackend: Send + Sync {
    /// Check the bundle against the current state of the environment
    async fn validate(&self, user: &User, name: &str, bundle: &Bundle) -> Result<(), BackendError>;

    /// Deploy the bundle. Blocks until the environment settles.
    fn import_bundle(&self, user: &User, name: &str, bundle: &Bundle) -> Result<(), BackendError>;

    /// Short backend name used in logs
    fn kind(&self) -> &'static str;
}

/// Backend selected from configuration at startup
#[derive(Debug, Clone)]
pub enum Backend {
    Sandbox(SandboxBackend),
    Command(CommandBackend),
}

impl Backend {
    pub fn from_settings(settings: &BackendSettings) -> Self {
        match settings {
            BackendSettings::Sandbox {
                simulated_duration_ms,
            } => Backend::Sandbox(SandboxBackend::new(Duration::from_millis(
                *simulated_duration_ms,
            ))),
            BackendSettings::Command {
                program,
                args,
                validate_timeout_secs,
                import_timeout_secs,
            } => Backend::Command(CommandBackend::new(
                program.clone(),
                args.clone(),
                Duration::from_secs(*validate_timeout_secs),
                Duration::from_secs(*import_timeout_secs),
            )),
        }
    }
}

#[async_trait]
impl BundleBackend for Backend {
    async fn validate(&self, user: &User, name: &str, bundle: &Bundle) -> Result<(), BackendError> {
        match self {
            Backend::Sandbox(backend) => backend.validate(user, name, bundle).await,
            Backend::Command(backend) => backend.validate(user, name, bundle).await,
        }
    }

    fn import_bundle(&self, user: &User, name: &str, bundle: &Bundle) -> Result<(), BackendError> {
        match self {
            Backend::Sandbox(backend) => backend.import_bundle(user, name, bundle),
            Backend::Command(backend) => backend.import_bundle(user, name, bundle),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Backend::Sandbox(backend) => backend.kind(),
            Backend::Command(backend) => backend.kind(),
        }
    }
}
