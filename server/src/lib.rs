//! Bundle deployer library
//!
//! Core modules of the bundle deployment server.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
