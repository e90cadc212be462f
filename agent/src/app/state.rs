//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::deploy::deployer::Deployer;
use crate::deploy::executor::ShellExecutor;
use crate::deploy::guard::RunGuard;
use crate::deploy::registry::{AppRegistry, RegistryHandle};
use crate::deploy::runner::DeploymentRunner;
use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::storage::run_log::LogStore;

/// Main application state
pub struct AppState {
    /// Current application registry
    pub registry: Arc<RegistryHandle>,

    /// In-flight run slots
    pub guard: Arc<RunGuard>,

    /// Run log partitions
    pub log_store: Arc<LogStore>,

    /// Trigger boundary
    pub deployer: Arc<Deployer>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions, registry: AppRegistry) -> Result<Self, AgentError> {
        info!("Initializing application state...");

        let logs_dir = Dir::new(&options.logs_dir);
        if let Err(e) = logs_dir.create().await {
            // Appends create the directory again, so a failure here is not fatal
            warn!(
                "Unable to create logs directory {}: {}",
                logs_dir.path().display(),
                e
            );
        }
        let log_store = Arc::new(LogStore::new(logs_dir));

        let executor = Arc::new(ShellExecutor::new(options.execution.shell.clone()));
        info!(
            "Steps run with {:?}, timeout {:?}",
            executor.shell(),
            options.execution.step_timeout
        );

        let runner = Arc::new(DeploymentRunner::new(
            executor,
            log_store.clone(),
            options.execution.step_timeout,
        ));

        let registry = Arc::new(RegistryHandle::new(registry));
        let guard = Arc::new(RunGuard::new());
        let deployer = Arc::new(Deployer::new(registry.clone(), guard.clone(), runner));

        Ok(Self {
            registry,
            guard,
            log_store,
            deployer,
        })
    }

    /// Shutdown application state, giving in-flight runs a chance to finish
    /// and persist their records first
    pub async fn shutdown(&self, lifecycle: &LifecycleOptions) -> Result<(), AgentError> {
        info!("Shutting down application state...");

        let drained = tokio::time::timeout(lifecycle.run_drain_timeout, async {
            loop {
                let active = self.guard.active();
                if active.is_empty() {
                    return;
                }
                info!(
                    "Waiting for {} deployment(s) to finish: {}",
                    active.len(),
                    active.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", ")
                );
                tokio::time::sleep(lifecycle.run_drain_poll_interval).await;
            }
        })
        .await;

        if drained.is_err() {
            let active = self.guard.active();
            warn!(
                "Abandoning {} deployment(s) after {:?}: {:?}",
                active.len(),
                lifecycle.run_drain_timeout,
                active.iter().map(|k| k.to_string()).collect::<Vec<_>>()
            );
        }
        Ok(())
    }
}
