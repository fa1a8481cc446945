//! Deployer request middleware
//!
//! Parses deployer frames, checks that they are well formed, calls into the
//! deployer and builds the response frame. Correlation is by `RequestId`:
//! every response carries the id of the request that produced it.

use deployer_protocol::{
    ImportParams, ImportResponse, NextParams, NextResponse, Request, Response, StatusResponse,
    WatchParams, WatchResponse, DEPLOYER_TYPE,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::deploy::deployer::Deployer;
use crate::errors::DeployerError;
use crate::models::bundle::Bundle;
use crate::models::user::User;

/// Requests served by the deployer
pub const ROUTES: [&str; 4] = ["Import", "Watch", "Next", "Status"];

/// Whether the frame is addressed to the deployer
pub fn requested(request: &Request) -> bool {
    request.kind == DEPLOYER_TYPE && ROUTES.contains(&request.request.as_str())
}

/// Decode a text frame.
///
/// A frame that is valid JSON but not a valid request still produces an
/// error response when its `RequestId` can be recovered; otherwise there is
/// nobody to answer and `Err(None)` is returned.
pub fn parse_frame(text: &str) -> Result<Request, Option<Response>> {
    let value: Value = serde_json::from_str(text).map_err(|_| None::<Response>)?;
    let request_id = value.get("RequestId").and_then(Value::as_u64);

    serde_json::from_value::<Request>(value).map_err(|e| {
        request_id.map(|id| {
            Response::error(id, error_message(&DeployerError::InvalidRequest(e.to_string())))
        })
    })
}

/// Handle one deployer request and build its response
pub async fn handle_request(deployer: &Deployer, user: &User, request: Request) -> Response {
    let request_id = request.request_id;

    let result = if !requested(&request) {
        Err(DeployerError::InvalidRequest(format!(
            "unsupported request {}.{}",
            request.kind, request.request
        )))
    } else {
        debug!("Handling {} request {}", request.request, request_id);
        match request.request.as_str() {
            "Import" => import_bundle(deployer, user, request.params).await,
            "Watch" => watch(deployer, request.params),
            "Next" => next(deployer, request.params).await,
            _ => status(deployer),
        }
    };

    match result {
        Ok(response) => Response::ok(request_id, response),
        Err(e) => {
            debug!("Request {} failed: {}", request_id, e);
            Response::error(request_id, error_message(&e))
        }
    }
}

/// Error text sent back to the client
pub fn error_message(error: &DeployerError) -> String {
    match error {
        DeployerError::InvalidRequest(detail)
        | DeployerError::ValidationError(detail)
        | DeployerError::NotFound(detail) => format!("invalid request: {}", detail),
        DeployerError::YamlError(e) => format!("invalid request: invalid YAML contents: {}", e),
        DeployerError::ExecutionError(detail) => detail.clone(),
        other => other.to_string(),
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, DeployerError> {
    serde_json::from_value(params)
        .map_err(|e| DeployerError::InvalidRequest(format!("invalid data parameters: {}", e)))
}

async fn import_bundle(deployer: &Deployer, user: &User, params: Value) -> Result<Value, DeployerError> {
    let params: ImportParams = parse_params(params)?;
    let bundle = Bundle::from_yaml_file(&params.yaml, &params.name)?;

    deployer.validate(user, &params.name, &bundle).await?;
    let deployment_id = deployer.import_bundle(user, &params.name, bundle);

    Ok(serde_json::to_value(ImportResponse { deployment_id })?)
}

fn watch(deployer: &Deployer, params: Value) -> Result<Value, DeployerError> {
    let params: WatchParams = parse_params(params)?;
    let watcher_id = deployer.watch(params.deployment_id)?;
    Ok(serde_json::to_value(WatchResponse { watcher_id })?)
}

async fn next(deployer: &Deployer, params: Value) -> Result<Value, DeployerError> {
    let params: NextParams = parse_params(params)?;
    let changes = deployer.next(params.watcher_id).await?;
    Ok(serde_json::to_value(NextResponse {
        changes: changes.into_iter().map(Into::into).collect(),
    })?)
}

fn status(deployer: &Deployer) -> Result<Value, DeployerError> {
    let last_changes = deployer.status().into_iter().map(Into::into).collect();
    Ok(serde_json::to_value(StatusResponse { last_changes })?)
}
