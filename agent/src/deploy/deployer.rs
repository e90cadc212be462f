//! Trigger boundary: resolve, acquire, spawn

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::deploy::guard::RunGuard;
use crate::deploy::id::DeployIdGenerator;
use crate::deploy::registry::RegistryHandle;
use crate::deploy::runner::DeploymentRunner;
use crate::errors::AgentError;
use crate::models::deployment::RunKey;
use crate::models::run::RunRecord;

/// A run that has been handed to the runtime
#[derive(Debug)]
pub struct StartedRun {
    pub deploy_id: String,

    /// Completes with the finished record; callers may drop it
    pub handle: JoinHandle<RunRecord>,
}

/// Starts deployment runs for registered application environments
pub struct Deployer {
    registry: Arc<RegistryHandle>,
    guard: Arc<RunGuard>,
    runner: Arc<DeploymentRunner>,
    ids: DeployIdGenerator,
}

impl Deployer {
    pub fn new(
        registry: Arc<RegistryHandle>,
        guard: Arc<RunGuard>,
        runner: Arc<DeploymentRunner>,
    ) -> Self {
        Self {
            registry,
            guard,
            runner,
            ids: DeployIdGenerator::new(),
        }
    }

    pub fn registry(&self) -> &Arc<RegistryHandle> {
        &self.registry
    }

    pub fn guard(&self) -> &Arc<RunGuard> {
        &self.guard
    }

    pub fn runner(&self) -> &Arc<DeploymentRunner> {
        &self.runner
    }

    /// Start a run for `app`/`env` and return without waiting for it.
    ///
    /// Fails with `NotFound` for an unknown app or environment and with
    /// `AlreadyRunning` while another run holds the slot. Neither failure
    /// has side effects. Must be called from within a tokio runtime.
    pub fn acquire_and_run(&self, app: &str, env: &str) -> Result<StartedRun, AgentError> {
        let registry = self.registry.current();
        let definition = registry
            .lookup(app, env)
            .cloned()
            .ok_or_else(|| AgentError::NotFound(format!("{}/{}", app, env)))?;

        let slot = self
            .guard
            .claim(RunKey::new(app, env))
            .ok_or_else(|| AgentError::AlreadyRunning {
                app: app.to_string(),
                env: env.to_string(),
            })?;

        let deploy_id = self.ids.next(app, env);
        info!("Queued deployment {}", deploy_id);

        let runner = self.runner.clone();
        let id = deploy_id.clone();
        let handle = tokio::spawn(async move { runner.execute(slot, &id, &definition).await });

        Ok(StartedRun { deploy_id, handle })
    }
}
