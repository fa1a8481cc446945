//! Deployment worker
//!
//! The single execution context of the deployer: it drains the queue one
//! deployment at a time, so the backend import call never runs concurrently
//! with itself.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info};

use crate::deploy::deployer::Deployer;

/// Run the deployer worker
pub async fn run(
    deployer: Arc<Deployer>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Deployer worker starting...");

    loop {
        let job = tokio::select! {
            biased;
            _ = &mut shutdown_signal => {
                info!("Deployer worker shutting down...");
                return;
            }
            job = deployer.next_job() => job,
        };

        debug!("Executing deployment {} ({})", job.id, job.name);

        // A running import is always allowed to finish
        deployer.execute(job).await;
    }
}
