//! Deployment models

use serde::{Deserialize, Serialize};

use crate::deploy::fsm::DeploymentStatus;

/// Deployment identifier, assigned at enqueue time
pub type DeploymentId = u64;

/// Watcher identifier, handed out by `Deployer::watch`
pub type WatcherId = u64;

/// A single entry of a deployment change log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Deployment this change belongs to
    pub deployment_id: DeploymentId,

    /// Status after the transition
    pub status: DeploymentStatus,

    /// Unix timestamp (seconds) of the transition
    pub time: i64,

    /// Position in the queue, present while scheduled or started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,

    /// Failure description, present only on a failed completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Change {
    pub fn new(
        deployment_id: DeploymentId,
        status: DeploymentStatus,
        queue_position: Option<usize>,
        error: Option<String>,
    ) -> Self {
        Self {
            deployment_id,
            status,
            time: chrono::Utc::now().timestamp(),
            queue_position,
            error,
        }
    }
}

impl From<Change> for deployer_protocol::Change {
    fn from(change: Change) -> Self {
        let status = match change.status {
            DeploymentStatus::Scheduled => deployer_protocol::ChangeStatus::Scheduled,
            DeploymentStatus::Started => deployer_protocol::ChangeStatus::Started,
            DeploymentStatus::Completed => deployer_protocol::ChangeStatus::Completed,
        };
        deployer_protocol::Change {
            deployment_id: change.deployment_id,
            status,
            time: change.time,
            queue: change.queue_position,
            error: change.error,
        }
    }
}
