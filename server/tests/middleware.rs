//! Request handling tests

mod common;

use bundled::server::middleware::handle_request;
use deployer_protocol::Request;
use serde_json::{json, Value};

use common::{admin, deployer, BUNDLES_YAML, REJECTED};

fn import(id: u64, name: &str, yaml: &str) -> Request {
    Request::deployer(id, "Import", json!({"Name": name, "YAML": yaml}))
}

#[tokio::test]
async fn test_import_returns_deployment_id() {
    let (deployer, _backend, _script) = deployer();

    let response = handle_request(&deployer, &admin(), import(1, "wordpress-simple", BUNDLES_YAML)).await;
    assert_eq!(response.request_id, 1);
    assert_eq!(response.error, None);
    assert_eq!(response.response, json!({"DeploymentId": 1}));

    let response = handle_request(&deployer, &admin(), import(2, "wordpress-simple", BUNDLES_YAML)).await;
    assert_eq!(response.response, json!({"DeploymentId": 2}));
}

#[tokio::test]
async fn test_import_static_validation() {
    let (deployer, _backend, _script) = deployer();

    let response = handle_request(&deployer, &admin(), import(3, "missing", BUNDLES_YAML)).await;
    assert_eq!(response.request_id, 3);
    assert_eq!(response.error.as_deref(), Some("invalid request: bundle missing not found"));
    assert_eq!(response.response, json!({}));

    let response = handle_request(&deployer, &admin(), import(4, "a", "- a\n- b\n")).await;
    assert_eq!(
        response.error.as_deref(),
        Some("invalid request: invalid YAML contents: expected a mapping")
    );

    let response = handle_request(&deployer, &admin(), import(5, "a", "a: [unclosed")).await;
    assert!(response
        .error
        .unwrap()
        .starts_with("invalid request: invalid YAML contents: "));

    let request = Request::deployer(6, "Import", json!({"Name": "a"}));
    let response = handle_request(&deployer, &admin(), request).await;
    assert!(response
        .error
        .unwrap()
        .starts_with("invalid request: invalid data parameters: "));

    // Nothing was scheduled
    assert!(deployer.status().is_empty());
}

#[tokio::test]
async fn test_import_rejected_by_validation() {
    let (deployer, _backend, _script) = deployer();

    let response = handle_request(&deployer, &admin(), import(7, REJECTED, BUNDLES_YAML)).await;
    assert_eq!(
        response.error.as_deref(),
        Some("invalid request: service mysql already exists")
    );
    assert!(deployer.status().is_empty());
}

#[tokio::test]
async fn test_watch_and_next_errors() {
    let (deployer, _backend, _script) = deployer();

    let request = Request::deployer(1, "Watch", json!({"DeploymentId": 12}));
    let response = handle_request(&deployer, &admin(), request).await;
    assert_eq!(response.error.as_deref(), Some("invalid request: deployment not found"));

    let request = Request::deployer(2, "Next", json!({"WatcherId": 12}));
    let response = handle_request(&deployer, &admin(), request).await;
    assert_eq!(response.error.as_deref(), Some("invalid request: watcher not found"));

    let request = Request::deployer(3, "Watch", json!({"DeploymentId": -1}));
    let response = handle_request(&deployer, &admin(), request).await;
    assert!(response
        .error
        .unwrap()
        .starts_with("invalid request: invalid data parameters: "));
}

#[tokio::test]
async fn test_watch_next_and_status() {
    let (deployer, _backend, _script) = deployer();
    handle_request(&deployer, &admin(), import(1, "wordpress-simple", BUNDLES_YAML)).await;

    let request = Request::deployer(2, "Watch", json!({"DeploymentId": 1}));
    let response = handle_request(&deployer, &admin(), request).await;
    assert_eq!(response.response, json!({"WatcherId": 1}));

    let request = Request::deployer(3, "Next", json!({"WatcherId": 1}));
    let response = handle_request(&deployer, &admin(), request).await;
    let changes = response.response["Changes"].as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["DeploymentId"], json!(1));
    assert_eq!(changes[0]["Status"], json!("scheduled"));
    assert_eq!(changes[0]["Queue"], json!(0));
    assert!(changes[0].get("Error").is_none());
    assert!(changes[0]["Time"].is_i64());

    let request = Request::deployer(4, "Status", Value::Null);
    let response = handle_request(&deployer, &admin(), request).await;
    let last_changes = response.response["LastChanges"].as_array().unwrap();
    assert_eq!(last_changes.len(), 1);
    assert_eq!(last_changes[0]["Status"], json!("scheduled"));
}

#[tokio::test]
async fn test_unsupported_requests() {
    let (deployer, _backend, _script) = deployer();

    let request = Request::deployer(8, "Cancel", Value::Null);
    let response = handle_request(&deployer, &admin(), request).await;
    assert_eq!(
        response.error.as_deref(),
        Some("invalid request: unsupported request Deployer.Cancel")
    );

    let request = Request {
        kind: "Client".to_string(),
        ..Request::deployer(9, "Status", Value::Null)
    };
    let response = handle_request(&deployer, &admin(), request).await;
    assert_eq!(response.request_id, 9);
    assert_eq!(
        response.error.as_deref(),
        Some("invalid request: unsupported request Client.Status")
    );
}
