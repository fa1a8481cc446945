//! Deployment models

pub mod bundle;
pub mod deployment;
pub mod user;
