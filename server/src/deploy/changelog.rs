//! Per-deployment change history

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentStatus};
use crate::models::deployment::{Change, DeploymentId};

/// Append-only history of the status transitions of one deployment.
///
/// The log is never empty: it is created with its `scheduled` entry, and the
/// status of the last entry always matches the deployment status. Once the
/// `completed` entry is appended the log is sealed.
#[derive(Debug, Clone)]
pub struct ChangeLog {
    deployment_id: DeploymentId,
    entries: Vec<Change>,
    fsm: DeploymentFsm,
}

impl ChangeLog {
    /// Create the log of a freshly scheduled deployment
    pub fn new(deployment_id: DeploymentId, queue_position: usize) -> Self {
        Self {
            deployment_id,
            entries: vec![Change::new(
                deployment_id,
                DeploymentStatus::Scheduled,
                Some(queue_position),
                None,
            )],
            fsm: DeploymentFsm::new(),
        }
    }

    pub fn deployment_id(&self) -> DeploymentId {
        self.deployment_id
    }

    /// Current deployment status
    pub fn status(&self) -> DeploymentStatus {
        self.fsm.status()
    }

    pub fn is_terminal(&self) -> bool {
        self.fsm.status().is_terminal()
    }

    /// Failure recorded on completion, if any
    pub fn error(&self) -> Option<&str> {
        self.fsm.error()
    }

    /// Record the `started` transition
    pub fn start(&mut self) -> Result<&Change, String> {
        self.fsm.process(DeploymentEvent::Start)?;
        Ok(self.push(Change::new(
            self.deployment_id,
            DeploymentStatus::Started,
            Some(0),
            None,
        )))
    }

    /// Record the terminal `completed` transition
    pub fn complete(&mut self, error: Option<String>) -> Result<&Change, String> {
        self.fsm.process(DeploymentEvent::Complete(error.clone()))?;
        Ok(self.push(Change::new(
            self.deployment_id,
            DeploymentStatus::Completed,
            None,
            error,
        )))
    }

    fn push(&mut self, change: Change) -> &Change {
        self.entries.push(change);
        &self.entries[self.entries.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Most recent change
    pub fn last(&self) -> &Change {
        // new() always seeds the scheduled entry
        &self.entries[self.entries.len() - 1]
    }

    /// Index of the terminal entry, once the deployment completed
    pub fn terminal_index(&self) -> Option<usize> {
        self.is_terminal().then(|| self.entries.len() - 1)
    }

    /// Entries from `cursor` (inclusive) to the end of the log
    pub fn read_from(&self, cursor: usize) -> &[Change] {
        self.entries.get(cursor..).unwrap_or(&[])
    }
}
