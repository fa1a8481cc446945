//! Deployer WebSocket client

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use deployer_protocol::{
    Change, ImportParams, ImportResponse, NextParams, NextResponse, Request, Response,
    StatusResponse, WatchParams, WatchResponse,
};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

use crate::errors::ClientError;

/// Header naming the user the connection acts on behalf of
pub const USER_HEADER: &str = "x-deployer-user";

/// Calls waiting for their response. `None` once the connection is gone.
type Pending = Arc<Mutex<Option<HashMap<u64, oneshot::Sender<Response>>>>>;

fn lock_pending(
    pending: &Pending,
) -> MutexGuard<'_, Option<HashMap<u64, oneshot::Sender<Response>>>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

/// Normalize a server address to a WebSocket URL.
///
/// `http` and `https` are rewritten to `ws` and `wss`. An address without a
/// path gets the deployer endpoint `/ws`.
pub fn build_ws_url(address: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(address).map_err(|e| ClientError::Url(e.to_string()))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ClientError::Url(format!("unsupported scheme {}", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::Url("failed to set scheme".to_string()))?;

    if url.path() == "/" || url.path().is_empty() {
        url.set_path("/ws");
    }

    Ok(url)
}

/// A connection to the deployer
pub struct DeployerClient {
    next_id: AtomicU64,
    pending: Pending,
    outgoing: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl DeployerClient {
    /// Connect to the deployer, optionally on behalf of `user`
    pub async fn connect(address: &str, user: Option<&str>) -> Result<Self, ClientError> {
        let url = build_ws_url(address)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        if let Some(user) = user {
            let value = HeaderValue::from_str(user).map_err(|e| ClientError::Connect(e.to_string()))?;
            request.headers_mut().insert(USER_HEADER, value);
        }

        debug!("Connecting to deployer at {}", url);
        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        let (mut sink, mut stream) = ws_stream.split();

        let pending: Pending = Arc::new(Mutex::new(Some(HashMap::new())));
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    warn!("Failed to send deployer request: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let response: Response = match serde_json::from_str(text.as_str()) {
                            Ok(response) => response,
                            Err(e) => {
                                warn!("Ignoring malformed deployer response: {}", e);
                                continue;
                            }
                        };
                        let sender = lock_pending(&reader_pending)
                            .as_mut()
                            .and_then(|calls| calls.remove(&response.request_id));
                        match sender {
                            Some(sender) => {
                                let _ = sender.send(response);
                            }
                            None => debug!("No pending call for response {}", response.request_id),
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Deployer connection error: {}", e);
                        break;
                    }
                }
            }

            // Dropping the senders fails every call still waiting
            lock_pending(&reader_pending).take();
            debug!("Deployer connection closed");
        });

        Ok(Self {
            next_id: AtomicU64::new(1),
            pending,
            outgoing,
            reader,
            writer,
        })
    }

    /// Send a raw deployer request and wait for its response
    pub async fn call<P: Serialize>(&self, request: &str, params: &P) -> Result<serde_json::Value, ClientError> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Request::deployer(request_id, request, serde_json::to_value(params)?);
        let text = serde_json::to_string(&frame)?;

        let (tx, rx) = oneshot::channel();
        match lock_pending(&self.pending).as_mut() {
            Some(calls) => {
                calls.insert(request_id, tx);
            }
            None => return Err(ClientError::Closed),
        }

        if self.outgoing.send(Message::Text(text.into())).is_err() {
            if let Some(calls) = lock_pending(&self.pending).as_mut() {
                calls.remove(&request_id);
            }
            return Err(ClientError::Closed);
        }

        let response = rx.await.map_err(|_| ClientError::Closed)?;
        match response.error {
            Some(error) => Err(ClientError::Remote(error)),
            None => Ok(response.response),
        }
    }

    async fn call_typed<P: Serialize, R: DeserializeOwned>(&self, request: &str, params: &P) -> Result<R, ClientError> {
        let value = self.call(request, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Schedule the bundle `name` from `yaml` and return its deployment id
    pub async fn import(&self, name: &str, yaml: &str) -> Result<u64, ClientError> {
        let params = ImportParams {
            name: name.to_string(),
            yaml: yaml.to_string(),
        };
        let response: ImportResponse = self.call_typed("Import", &params).await?;
        Ok(response.deployment_id)
    }

    /// Start watching a deployment
    pub async fn watch(&self, deployment_id: u64) -> Result<u64, ClientError> {
        let response: WatchResponse = self.call_typed("Watch", &WatchParams { deployment_id }).await?;
        Ok(response.watcher_id)
    }

    /// Wait for the next changes seen by a watcher
    pub async fn next(&self, watcher_id: u64) -> Result<Vec<Change>, ClientError> {
        let response: NextResponse = self.call_typed("Next", &NextParams { watcher_id }).await?;
        Ok(response.changes)
    }

    /// Latest change of every deployment
    pub async fn status(&self) -> Result<Vec<Change>, ClientError> {
        let response: StatusResponse = self.call_typed("Status", &serde_json::Value::Null).await?;
        Ok(response.last_changes)
    }

    /// Close the connection
    pub async fn close(mut self) {
        let _ = self.outgoing.send(Message::Close(None));
        let _ = (&mut self.writer).await;
        self.reader.abort();
        lock_pending(&self.pending).take();
    }
}

impl Drop for DeployerClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_ws_url() {
        assert_eq!(
            build_ws_url("http://localhost:8080").unwrap().as_str(),
            "ws://localhost:8080/ws"
        );
        assert_eq!(
            build_ws_url("https://deployer.example.com/api/ws").unwrap().as_str(),
            "wss://deployer.example.com/api/ws"
        );
        assert_eq!(
            build_ws_url("ws://127.0.0.1:17070/ws").unwrap().as_str(),
            "ws://127.0.0.1:17070/ws"
        );
        assert!(matches!(build_ws_url("ftp://localhost"), Err(ClientError::Url(_))));
        assert!(matches!(build_ws_url("not a url"), Err(ClientError::Url(_))));
    }
}
