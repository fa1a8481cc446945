//! Bundle deployer
//!
//! The deployer admits bundles, queues them, runs them one at a time through
//! the configured backend and lets any number of watchers follow their
//! progress.
//!
//! All shared state (queue, change logs, watcher cursors) lives behind a
//! single mutex. Critical sections are short and never span a backend call:
//! the blocking import runs on the blocking thread pool and only its terminal
//! bookkeeping re-enters the lock. Watchers wait on a per-deployment
//! `watch` channel that is bumped under the lock on every append, so a
//! waiter that subscribed while holding the lock cannot miss a change.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

use crate::deploy::backend::{BackendError, BundleBackend};
use crate::deploy::changelog::ChangeLog;
use crate::deploy::fsm::DeploymentStatus;
use crate::deploy::queue::DeploymentQueue;
use crate::deploy::watchers::WatcherRegistry;
use crate::errors::DeployerError;
use crate::models::bundle::Bundle;
use crate::models::deployment::{Change, DeploymentId, WatcherId};
use crate::models::user::User;

/// A deployment handed to the worker for execution
#[derive(Debug)]
pub struct Job {
    pub id: DeploymentId,
    pub user: User,
    pub name: String,
    pub bundle: Bundle,
}

struct Deployment {
    name: String,
    user: User,

    /// Owned until the worker takes it
    payload: Option<Bundle>,

    changelog: ChangeLog,

    /// Carries the change log length; bumped on every append
    notifier: watch::Sender<usize>,
}

struct DeployerState {
    next_id: DeploymentId,
    deployments: BTreeMap<DeploymentId, Deployment>,
    queue: DeploymentQueue,
    watchers: WatcherRegistry,
}

impl DeployerState {
    /// Changes of `log` from `cursor` on. The last one, when it is the
    /// current state of a pending deployment, carries its live queue
    /// position.
    fn read_live(&self, log: &ChangeLog, cursor: usize) -> Vec<Change> {
        let mut changes = log.read_from(cursor).to_vec();
        if !log.is_terminal() {
            if let Some(current) = changes.last_mut() {
                current.queue_position = self
                    .queue
                    .position(log.deployment_id())
                    .or(current.queue_position);
            }
        }
        changes
    }
}

/// Admission, sequencing and observation of bundle deployments
pub struct Deployer {
    backend: Arc<dyn BundleBackend>,
    state: Mutex<DeployerState>,
    queue_notify: Notify,
}

impl Deployer {
    /// Create a deployer driving `backend`
    pub fn new(backend: Arc<dyn BundleBackend>) -> Self {
        info!("Creating deployer with {} backend", backend.kind());
        Self {
            backend,
            state: Mutex::new(DeployerState {
                next_id: 1,
                deployments: BTreeMap::new(),
                queue: DeploymentQueue::new(),
                watchers: WatcherRegistry::new(),
            }),
            queue_notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeployerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check a bundle against the current environment.
    ///
    /// Does not touch the queue or any history. A bundle that validates may
    /// still fail when it is eventually imported.
    pub async fn validate(&self, user: &User, name: &str, bundle: &Bundle) -> Result<(), DeployerError> {
        match self.backend.validate(user, name, bundle).await {
            Ok(()) => Ok(()),
            Err(BackendError::Rejected(reason)) => {
                debug!("Bundle {} rejected: {}", name, reason);
                Err(DeployerError::ValidationError(reason))
            }
            Err(e) => {
                warn!("Unable to validate bundle {}: {}", name, e);
                Err(DeployerError::ExecutionError(format!(
                    "unable to validate bundle: {}",
                    e
                )))
            }
        }
    }

    /// Schedule a bundle for deployment and return its id.
    ///
    /// Never waits for execution.
    pub fn import_bundle(&self, user: &User, name: &str, bundle: Bundle) -> DeploymentId {
        let (id, position) = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;

            let position = state.queue.push(id);
            let changelog = ChangeLog::new(id, position);
            let (notifier, _) = watch::channel(changelog.len());
            state.deployments.insert(
                id,
                Deployment {
                    name: name.to_string(),
                    user: user.clone(),
                    payload: Some(bundle),
                    changelog,
                    notifier,
                },
            );
            (id, position)
        };

        info!(
            "Scheduled deployment {} of bundle {} for {} (queue position {})",
            id, name, user.username, position
        );
        self.queue_notify.notify_one();
        id
    }

    /// Register a watcher on a deployment.
    ///
    /// A watcher on a deployment that already completed starts at the
    /// terminal change, so its first `next` returns exactly that change.
    pub fn watch(&self, deployment_id: DeploymentId) -> Result<WatcherId, DeployerError> {
        let mut state = self.lock();
        let cursor = state
            .deployments
            .get(&deployment_id)
            .map(|d| d.changelog.terminal_index().unwrap_or(0))
            .ok_or_else(|| DeployerError::NotFound("deployment not found".to_string()))?;

        let watcher_id = state.watchers.register(deployment_id, cursor);
        debug!("Watcher {} registered on deployment {}", watcher_id, deployment_id);
        Ok(watcher_id)
    }

    /// Wait for changes the watcher has not seen yet.
    ///
    /// Returns every unseen change in append order. Once the watcher has
    /// seen the terminal change, returns that change again immediately.
    /// Dropping the returned future leaves the watcher untouched.
    pub async fn next(&self, watcher_id: WatcherId) -> Result<Vec<Change>, DeployerError> {
        loop {
            let mut changed = {
                let mut guard = self.lock();
                let state = &mut *guard;

                let watcher = state
                    .watchers
                    .get(watcher_id)
                    .cloned()
                    .ok_or_else(|| DeployerError::NotFound("watcher not found".to_string()))?;
                let deployment = state.deployments.get(&watcher.deployment_id).ok_or_else(|| {
                    DeployerError::Internal(format!(
                        "watcher {} refers to unknown deployment {}",
                        watcher_id, watcher.deployment_id
                    ))
                })?;
                let log = &deployment.changelog;

                let changes = state.read_live(log, watcher.cursor);
                if !changes.is_empty() {
                    let end = log.len();
                    state.watchers.advance(watcher_id, end);
                    debug!("Watcher {} received {} change(s)", watcher_id, changes.len());
                    return Ok(changes);
                }

                if log.is_terminal() {
                    return Ok(vec![log.last().clone()]);
                }

                deployment.notifier.subscribe()
            };

            if changed.changed().await.is_err() {
                return Err(DeployerError::Internal(
                    "deployment notifier closed".to_string(),
                ));
            }
        }
    }

    /// Most recent change of every deployment, ordered by id
    pub fn status(&self) -> Vec<Change> {
        let state = self.lock();
        state
            .deployments
            .values()
            .flat_map(|d| state.read_live(&d.changelog, d.changelog.len() - 1))
            .collect()
    }

    /// Take the next scheduled deployment off the queue and mark it started.
    ///
    /// Returns `None` when the queue is empty or a deployment is running.
    pub fn start_next(&self) -> Option<Job> {
        loop {
            let mut guard = self.lock();
            let state = &mut *guard;
            let id = state.queue.pop_next()?;
            let deployment = match state.deployments.get_mut(&id) {
                Some(deployment) => deployment,
                None => {
                    error!("Queued deployment {} is unknown, skipping", id);
                    state.queue.finish(id);
                    continue;
                }
            };

            if let Err(e) = deployment.changelog.start() {
                error!("Cannot start deployment {}: {}", id, e);
                state.queue.finish(id);
                continue;
            }
            deployment.notifier.send_replace(deployment.changelog.len());

            let Some(bundle) = deployment.payload.take() else {
                let _ = deployment
                    .changelog
                    .complete(Some("bundle payload missing".to_string()));
                deployment.notifier.send_replace(deployment.changelog.len());
                state.queue.finish(id);
                continue;
            };

            info!("Started deployment {} of bundle {}", id, deployment.name);
            return Some(Job {
                id,
                user: deployment.user.clone(),
                name: deployment.name.clone(),
                bundle,
            });
        }
    }

    /// Wait until a deployment can be started, then start it
    pub async fn next_job(&self) -> Job {
        loop {
            if let Some(job) = self.start_next() {
                return job;
            }
            self.queue_notify.notified().await;
        }
    }

    /// Record the outcome of the running deployment and free the queue slot
    pub fn complete(&self, id: DeploymentId, error: Option<String>) {
        let outcome = {
            let mut state = self.lock();
            let state = &mut *state;
            let Some(deployment) = state.deployments.get_mut(&id) else {
                error!("Cannot complete unknown deployment {}", id);
                return;
            };

            if let Err(e) = deployment.changelog.complete(error) {
                error!("Cannot complete deployment {}: {}", id, e);
            }
            deployment.notifier.send_replace(deployment.changelog.len());
            state.queue.finish(id);
            deployment.changelog.error().map(str::to_string)
        };

        match outcome {
            Some(error) => warn!("Deployment {} completed with error: {}", id, error),
            None => info!("Deployment {} completed", id),
        }
        self.queue_notify.notify_one();
    }

    /// Run a started deployment through the backend import call.
    ///
    /// The call runs on the blocking pool. Failures and panics become the
    /// deployment's terminal error.
    pub async fn execute(&self, job: Job) {
        let backend = self.backend.clone();
        let Job {
            id,
            user,
            name,
            bundle,
        } = job;

        let result =
            tokio::task::spawn_blocking(move || backend.import_bundle(&user, &name, &bundle)).await;

        let error = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(join_error) if join_error.is_panic() => {
                let panic = join_error.into_panic();
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "import panicked".to_string());
                Some(BackendError::Fault(message).to_string())
            }
            Err(join_error) => Some(BackendError::Fault(join_error.to_string()).to_string()),
        };

        self.complete(id, error);
    }

    /// Number of deployments not yet completed
    pub fn active_count(&self) -> usize {
        self.lock().queue.active_len()
    }

    /// Status of a single deployment
    pub fn deployment_status(&self, id: DeploymentId) -> Option<DeploymentStatus> {
        self.lock().deployments.get(&id).map(|d| d.changelog.status())
    }
}
