//! Bundle Deployer Protocol
//!
//! Request and response frames exchanged over the deployer WebSocket.

pub mod models;

pub use models::*;
