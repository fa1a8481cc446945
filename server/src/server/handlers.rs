//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::models::user::User;
use crate::server::socket::handle_socket;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Header naming the user a connection acts on behalf of
pub const USER_HEADER: &str = "x-deployer-user";

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub active_deployments: usize,
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "bundled".to_string(),
        version: version.version,
        active_deployments: state.deployer.active_count(),
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Upgrade to a deployer WebSocket connection
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    let user = user_from_headers(&headers);
    let deployer = state.deployer.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, deployer, user))
}

/// Resolve the connection user, falling back to the anonymous user
pub fn user_from_headers(headers: &HeaderMap) -> User {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(User::new)
        .unwrap_or_default()
}
