//! WebSocket connection handling
//!
//! Each request on a connection runs as its own task, so a `Next` waiting
//! for changes never holds up later requests. Responses are written as their
//! tasks finish and may leave out of order; clients match them by
//! `RequestId`. Closing the connection aborts whatever is still pending.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use deployer_protocol::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::deploy::deployer::Deployer;
use crate::errors::DeployerError;
use crate::models::user::User;
use crate::server::middleware::{handle_request, parse_frame};

/// Serve deployer requests on an upgraded connection until it closes
pub async fn handle_socket(socket: WebSocket, deployer: Arc<Deployer>, user: User) {
    debug!("Deployer connection opened for {}", user.username);

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match parse_frame(text.as_str()) {
                        Ok(request) => {
                            let deployer = deployer.clone();
                            let user = user.clone();
                            let tx = tx.clone();
                            tasks.spawn(async move {
                                let response = handle_request(&deployer, &user, request).await;
                                // Receiver is gone once the connection closed
                                let _ = tx.send(response);
                            });
                        }
                        Err(Some(response)) => {
                            let _ = tx.send(response);
                        }
                        Err(None) => {
                            warn!("Ignoring malformed frame from {}", user.username);
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("{}", DeployerError::TransportError(e.to_string()));
                        break;
                    }
                    // Ping/pong are answered by axum, binary frames are not part of the protocol
                    Some(Ok(_)) => {}
                }
            }
            Some(response) = rx.recv() => {
                let text = match serde_json::to_string(&response) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to encode response {}: {}", response.request_id, e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!("Failed to send response {}: {}", response.request_id, e);
                    break;
                }
            }
            Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = result {
                    if e.is_panic() {
                        error!("Deployer request task panicked: {}", e);
                    }
                }
            }
        }
    }

    if !tasks.is_empty() {
        debug!("Aborting {} pending request(s) for {}", tasks.len(), user.username);
    }
    tasks.shutdown().await;
    let _ = sink.close().await;

    debug!("Deployer connection closed for {}", user.username);
}
