//! Bundle deployer client
//!
//! Talks to the deployer over its WebSocket protocol. Requests are tagged
//! with increasing `RequestId`s and may be answered out of order.

pub mod client;
pub mod errors;

pub use client::{build_ws_url, DeployerClient};
pub use errors::ClientError;
