//! Deployment module

pub mod backend;
pub mod changelog;
pub mod deployer;
pub mod fsm;
pub mod queue;
pub mod watchers;
