//! Finite State Machine for bundle deployments

use serde::{Deserialize, Serialize};

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Waiting in the queue
    Scheduled,

    /// Being imported by the worker
    Started,

    /// Import finished, successfully or not
    Completed,
}

impl DeploymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Scheduled => "scheduled",
            DeploymentStatus::Started => "started",
            DeploymentStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// The worker picked the deployment up
    Start,

    /// The import call returned
    Complete(Option<String>),
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    status: DeploymentStatus,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in scheduled state
    pub fn new() -> Self {
        Self {
            status: DeploymentStatus::Scheduled,
            error: None,
        }
    }

    /// Get current status
    pub fn status(&self) -> DeploymentStatus {
        self.status
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<(), String> {
        let new_status = match (&self.status, event) {
            (DeploymentStatus::Scheduled, DeploymentEvent::Start) => DeploymentStatus::Started,
            (DeploymentStatus::Started, DeploymentEvent::Complete(error)) => {
                self.error = error;
                DeploymentStatus::Completed
            }

            // Invalid transitions
            (status, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", status, event));
            }
        };

        self.status = new_status;
        Ok(())
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsm_transitions() {
        let mut fsm = DeploymentFsm::new();
        assert_eq!(fsm.status(), DeploymentStatus::Scheduled);

        fsm.process(DeploymentEvent::Start).unwrap();
        assert_eq!(fsm.status(), DeploymentStatus::Started);

        fsm.process(DeploymentEvent::Complete(None)).unwrap();
        assert_eq!(fsm.status(), DeploymentStatus::Completed);
        assert!(fsm.error().is_none());
    }

    #[test]
    fn test_fsm_error_handling() {
        let mut fsm = DeploymentFsm::new();

        fsm.process(DeploymentEvent::Start).unwrap();
        fsm.process(DeploymentEvent::Complete(Some("test error".to_string())))
            .unwrap();

        assert_eq!(fsm.status(), DeploymentStatus::Completed);
        assert_eq!(fsm.error(), Some("test error"));
    }

    #[test]
    fn test_fsm_invalid_transition() {
        let mut fsm = DeploymentFsm::new();

        // Cannot complete without starting
        assert!(fsm.process(DeploymentEvent::Complete(None)).is_err());
        assert_eq!(fsm.status(), DeploymentStatus::Scheduled);

        fsm.process(DeploymentEvent::Start).unwrap();
        fsm.process(DeploymentEvent::Complete(None)).unwrap();

        // Completed is terminal
        assert!(fsm.process(DeploymentEvent::Start).is_err());
        assert!(fsm.process(DeploymentEvent::Complete(None)).is_err());
    }
}
