//! Deployment module

pub mod deployer;
pub mod executor;
pub mod fsm;
pub mod guard;
pub mod id;
pub mod registry;
pub mod runner;
