//! Finite State Machine for a deployment run

use serde::{Deserialize, Serialize};

use crate::models::run::RunStatus;

/// Run state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Created, no step started
    Pending,

    /// Steps are executing
    Running,

    /// Every step succeeded
    Succeeded,

    /// A step failed
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }

    /// Status recorded on the run record for this state
    pub fn run_status(&self) -> RunStatus {
        match self {
            RunState::Pending | RunState::Running => RunStatus::InProgress,
            RunState::Succeeded => RunStatus::Success,
            RunState::Failed => RunStatus::Failed,
        }
    }
}

/// Run event
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// First step is about to run
    Start,

    /// All steps completed successfully
    Complete,

    /// A step failed, or the run aborted
    Fail(String),
}

/// Run FSM
#[derive(Debug, Clone)]
pub struct RunFsm {
    state: RunState,
    error: Option<String>,
}

impl RunFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: RunState::Pending,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: RunEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (RunState::Pending, RunEvent::Start) => RunState::Running,
            // A run can abort before its first step starts
            (RunState::Pending, RunEvent::Fail(err)) => {
                self.error = Some(err.clone());
                RunState::Failed
            }

            (RunState::Running, RunEvent::Complete) => RunState::Succeeded,
            (RunState::Running, RunEvent::Fail(err)) => {
                self.error = Some(err.clone());
                RunState::Failed
            }

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for RunFsm {
    fn default() -> Self {
        Self::new()
    }
}
