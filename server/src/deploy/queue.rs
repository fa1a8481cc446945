//! Deployment queue

use std::collections::VecDeque;

use crate::models::deployment::DeploymentId;

/// FIFO of scheduled deployments plus the single executing slot.
///
/// Queue positions are never stored: they are derived from the live queue
/// every time they are asked for. A deployment's position is the number of
/// deployments ahead of it that have not completed, so the executing one is
/// always at 0 and the FIFO head follows it at 1.
#[derive(Debug, Default)]
pub struct DeploymentQueue {
    pending: VecDeque<DeploymentId>,
    running: Option<DeploymentId>,
}

impl DeploymentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a deployment to the FIFO tail and return its position
    pub fn push(&mut self, id: DeploymentId) -> usize {
        self.pending.push_back(id);
        self.active_len() - 1
    }

    /// Move the FIFO head into the executing slot.
    ///
    /// Returns `None` when the queue is empty or a deployment is already
    /// executing.
    pub fn pop_next(&mut self) -> Option<DeploymentId> {
        if self.running.is_some() {
            return None;
        }
        let id = self.pending.pop_front()?;
        self.running = Some(id);
        Some(id)
    }

    /// Release the executing slot held by `id`
    pub fn finish(&mut self, id: DeploymentId) -> bool {
        if self.running == Some(id) {
            self.running = None;
            true
        } else {
            false
        }
    }

    /// Live position of a deployment, `None` once it left the queue
    pub fn position(&self, id: DeploymentId) -> Option<usize> {
        if self.running == Some(id) {
            return Some(0);
        }
        let offset = usize::from(self.running.is_some());
        self.pending
            .iter()
            .position(|pending| *pending == id)
            .map(|index| index + offset)
    }

    /// Number of deployments not yet completed
    pub fn active_len(&self) -> usize {
        self.pending.len() + usize::from(self.running.is_some())
    }
}
