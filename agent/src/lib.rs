//! Deploy Agent Library
//!
//! Core modules for the webhook-triggered deployment agent.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod utils;
