//! Deployment runner: executes one run's steps in order

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tracing::{error, info, warn};

use crate::deploy::executor::StepExecutor;
use crate::deploy::fsm::{RunEvent, RunFsm};
use crate::deploy::guard::RunSlot;
use crate::errors::AgentError;
use crate::models::deployment::AppEnvironmentDefinition;
use crate::models::run::{
    RunRecord, RunStatus, StepResult, StepStatus, MAX_OUTPUT_CHARS, MAX_STDERR_CHARS,
};
use crate::storage::run_log::LogStore;
use crate::utils::tail_chars;

/// Runs deployment procedures and persists their records
pub struct DeploymentRunner {
    executor: Arc<dyn StepExecutor>,
    log_store: Arc<LogStore>,
    step_timeout: Duration,
}

impl DeploymentRunner {
    pub fn new(
        executor: Arc<dyn StepExecutor>,
        log_store: Arc<LogStore>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            log_store,
            step_timeout,
        }
    }

    pub fn log_store(&self) -> &Arc<LogStore> {
        &self.log_store
    }

    /// Execute a run to completion.
    ///
    /// Steps run strictly in order and the first failure aborts the rest.
    /// The slot is released before the record is persisted, and a failure
    /// to persist is logged without affecting the returned record.
    pub async fn execute(
        &self,
        slot: RunSlot,
        deploy_id: &str,
        definition: &AppEnvironmentDefinition,
    ) -> RunRecord {
        let key = slot.key().clone();
        let started = Instant::now();
        let mut record = RunRecord::begin(
            deploy_id,
            &key.app,
            &key.env,
            &definition.working_directory.display().to_string(),
        );
        let mut fsm = RunFsm::new();

        info!(
            "Starting deployment {} ({} steps in {})",
            deploy_id,
            definition.steps.len(),
            record.path
        );

        if let Err(e) = fsm.process(RunEvent::Start) {
            error!("Deployment {}: {}", deploy_id, e);
        }

        let outcome = AssertUnwindSafe(self.run_steps(deploy_id, definition, &mut record.steps))
            .catch_unwind()
            .await;

        let event = match outcome {
            Ok(Ok(())) => RunEvent::Complete,
            Ok(Err(message)) => RunEvent::Fail(message),
            Err(panic) => {
                let message = AgentError::Internal(panic_message(panic.as_ref())).to_string();
                error!("Deployment {} aborted: {}", deploy_id, message);
                RunEvent::Fail(message)
            }
        };
        if let Err(e) = fsm.process(event) {
            error!("Deployment {}: {}", deploy_id, e);
        }

        record.status = fsm.state().run_status();
        record.error = fsm.error().map(str::to_string);
        record.end_time = Some(Utc::now());
        record.duration_ms = elapsed_ms(started);

        drop(slot);

        match record.status {
            RunStatus::Success => info!(
                "Deployment {} succeeded in {}ms",
                deploy_id, record.duration_ms
            ),
            _ => warn!(
                "Deployment {} failed after {}ms: {}",
                deploy_id,
                record.duration_ms,
                record.error.as_deref().unwrap_or("unknown error")
            ),
        }

        if let Err(e) = self.log_store.append(&record).await {
            error!("Failed to persist deployment {}: {}", deploy_id, e);
        }

        record
    }

    async fn run_steps(
        &self,
        deploy_id: &str,
        definition: &AppEnvironmentDefinition,
        results: &mut Vec<StepResult>,
    ) -> Result<(), String> {
        let count = definition.steps.len();

        for (i, step) in definition.steps.iter().enumerate() {
            let order = (i + 1) as u32;
            info!(
                "Deployment {} step {}/{}: {} ({})",
                deploy_id, order, count, step.name, step.command
            );

            let step_started = Instant::now();
            let result = self
                .executor
                .run(&step.command, &definition.working_directory, self.step_timeout)
                .await;
            let duration_ms = elapsed_ms(step_started);

            match result {
                Ok(output) => results.push(StepResult {
                    order,
                    name: step.name.clone(),
                    command: step.command.clone(),
                    status: StepStatus::Success,
                    duration_ms,
                    output: tail_chars(&output.stdout, MAX_OUTPUT_CHARS),
                    stderr: tail_chars(&output.stderr, MAX_STDERR_CHARS),
                    error: None,
                }),
                Err(e) => {
                    warn!(
                        "Deployment {} step {} ({}) failed: {}",
                        deploy_id, order, step.name, e.message
                    );
                    results.push(StepResult {
                        order,
                        name: step.name.clone(),
                        command: step.command.clone(),
                        status: StepStatus::Error,
                        duration_ms,
                        output: tail_chars(&e.stdout, MAX_OUTPUT_CHARS),
                        stderr: tail_chars(&e.stderr, MAX_STDERR_CHARS),
                        error: Some(e.message.clone()),
                    });
                    return Err(e.message);
                }
            }
        }

        Ok(())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
