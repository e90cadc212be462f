//! Persistent storage

pub mod layout;
pub mod run_log;
pub mod settings;
