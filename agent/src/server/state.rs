//! Server state

use std::sync::Arc;

use crate::deploy::deployer::Deployer;
use crate::filesys::file::File;
use crate::server::auth::{AccessControl, RateLimiter};
use crate::storage::run_log::LogStore;

/// Server state shared across handlers
pub struct ServerState {
    pub deployer: Arc<Deployer>,
    pub log_store: Arc<LogStore>,
    /// Re-read by the reload endpoint
    pub settings_file: File,
    pub access: AccessControl,
    pub rate_limiter: RateLimiter,
}

impl ServerState {
    pub fn new(
        deployer: Arc<Deployer>,
        log_store: Arc<LogStore>,
        settings_file: File,
        access: AccessControl,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            deployer,
            log_store,
            settings_file,
            access,
            rate_limiter,
        }
    }
}
