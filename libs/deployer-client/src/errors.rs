//! Client error types

use thiserror::Error;

/// Errors returned by the deployer client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid URL: {0}")]
    Url(String),

    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Connection closed")]
    Closed,

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error reported by the deployer in a response frame
    #[error("{0}")]
    Remote(String),
}
