//! Deployer wire models

use serde::{Deserialize, Serialize};

/// Request type handled by the deployer
pub const DEPLOYER_TYPE: &str = "Deployer";

/// Inbound request frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Request {
    pub request_id: u64,

    #[serde(rename = "Type")]
    pub kind: String,

    pub request: String,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

impl Request {
    /// Build a deployer request
    pub fn deployer(request_id: u64, request: &str, params: serde_json::Value) -> Self {
        Self {
            request_id,
            kind: DEPLOYER_TYPE.to_string(),
            request: request.to_string(),
            params,
        }
    }
}

/// Outbound response frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    pub request_id: u64,

    #[serde(default)]
    pub response: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Successful response
    pub fn ok(request_id: u64, response: serde_json::Value) -> Self {
        Self {
            request_id,
            response,
            error: None,
        }
    }

    /// Error response with an empty result object
    pub fn error(request_id: u64, error: impl Into<String>) -> Self {
        Self {
            request_id,
            response: serde_json::Value::Object(serde_json::Map::new()),
            error: Some(error.into()),
        }
    }
}

/// Import request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImportParams {
    pub name: String,

    #[serde(rename = "YAML")]
    pub yaml: String,
}

/// Import response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImportResponse {
    pub deployment_id: u64,
}

/// Watch request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WatchParams {
    pub deployment_id: u64,
}

/// Watch response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WatchResponse {
    pub watcher_id: u64,
}

/// Next request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NextParams {
    pub watcher_id: u64,
}

/// Next response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NextResponse {
    pub changes: Vec<Change>,
}

/// Status response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusResponse {
    pub last_changes: Vec<Change>,
}

/// Deployment status as seen on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Scheduled,
    Started,
    Completed,
}

/// A single deployment change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Change {
    pub deployment_id: u64,

    pub status: ChangeStatus,

    /// Unix timestamp (seconds) of the change
    pub time: i64,

    #[serde(default, rename = "Queue", skip_serializing_if = "Option::is_none")]
    pub queue: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
