//! Shared test fixtures
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bundled::deploy::backend::{BackendError, BundleBackend};
use bundled::deploy::deployer::Deployer;
use bundled::models::bundle::Bundle;
use bundled::models::user::User;
use tokio::sync::mpsc;

/// Bundle name refused by `ScriptedBackend::validate`
pub const REJECTED: &str = "rejected";

/// Bundle name whose validation times out
pub const SLOW: &str = "slow";

/// Result handed to a blocked import call
#[derive(Debug)]
pub enum Outcome {
    Succeed,
    Fail(String),
    Panic(String),
}

/// Backend whose imports block until the test scripts their outcome
pub struct ScriptedBackend {
    gate: Mutex<std_mpsc::Receiver<Outcome>>,
    started: mpsc::UnboundedSender<String>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

/// Test side of a `ScriptedBackend`
pub struct Script {
    /// Releases the current (or next) import call
    pub gate: std_mpsc::Sender<Outcome>,

    /// Receives the bundle name of every import as it begins
    pub started: mpsc::UnboundedReceiver<String>,
}

impl Script {
    pub fn release(&self, outcome: Outcome) {
        self.gate.send(outcome).unwrap();
    }

    /// Wait for the next import call to begin
    pub async fn import_started(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(10), self.started.recv())
            .await
            .expect("import did not start")
            .expect("backend dropped")
    }
}

impl ScriptedBackend {
    /// Highest number of imports observed running at once
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

pub fn scripted() -> (Arc<ScriptedBackend>, Script) {
    let (gate_tx, gate_rx) = std_mpsc::channel();
    let (started_tx, started_rx) = mpsc::unbounded_channel();
    let backend = Arc::new(ScriptedBackend {
        gate: Mutex::new(gate_rx),
        started: started_tx,
        running: AtomicUsize::new(0),
        max_running: AtomicUsize::new(0),
    });
    let script = Script {
        gate: gate_tx,
        started: started_rx,
    };
    (backend, script)
}

#[async_trait]
impl BundleBackend for ScriptedBackend {
    async fn validate(&self, _user: &User, name: &str, _bundle: &Bundle) -> Result<(), BackendError> {
        match name {
            REJECTED => Err(BackendError::Rejected("service mysql already exists".to_string())),
            SLOW => Err(BackendError::TimedOut(Duration::from_secs(60))),
            _ => Ok(()),
        }
    }

    fn import_bundle(&self, _user: &User, name: &str, _bundle: &Bundle) -> Result<(), BackendError> {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        let _ = self.started.send(name.to_string());

        let outcome = self
            .gate
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .recv_timeout(Duration::from_secs(10));
        self.running.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(Outcome::Succeed) => Ok(()),
            Ok(Outcome::Fail(reason)) => Err(BackendError::Rejected(reason)),
            Ok(Outcome::Panic(message)) => panic!("{}", message),
            Err(_) => Err(BackendError::Fault("no outcome scripted".to_string())),
        }
    }

    fn kind(&self) -> &'static str {
        "scripted"
    }
}

/// Deployer driven by a fresh scripted backend
pub fn deployer() -> (Arc<Deployer>, Arc<ScriptedBackend>, Script) {
    let (backend, script) = scripted();
    let deployer = Arc::new(Deployer::new(backend.clone()));
    (deployer, backend, script)
}

pub fn bundle() -> Bundle {
    Bundle::new(serde_json::json!({
        "services": {
            "wordpress": {"charm": "cs:precise/wordpress", "num_units": 1},
            "mysql": {"charm": "cs:precise/mysql"}
        }
    }))
}

pub fn admin() -> User {
    User::new("admin")
}

pub const BUNDLES_YAML: &str = r#"
wordpress-simple:
  services:
    wordpress:
      charm: cs:precise/wordpress
    mysql:
      charm: cs:precise/mysql
  relations:
    - [wordpress, mysql]
rejected:
  services:
    mysql:
      charm: cs:precise/mysql
"#;
