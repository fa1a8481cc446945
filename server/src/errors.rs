//! Error types for the bundle deployer

use thiserror::Error;

/// Main error type for the bundle deployer
#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// The bundle was rejected by the validation collaborator
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Unknown deployment or watcher identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// The import collaborator failed or faulted during a run
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// The connection carrying a request went away
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The request is malformed and was rejected before reaching the deployer
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for DeployerError {
    fn from(err: anyhow::Error) -> Self {
        DeployerError::Internal(err.to_string())
    }
}
