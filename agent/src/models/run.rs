//! Run record models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest `output` tail kept per step
pub const MAX_OUTPUT_CHARS: usize = 1000;

/// Longest `stderr` tail kept per step
pub const MAX_STDERR_CHARS: usize = 500;

/// Outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Error,
}

/// Result of one executed step, as persisted in a log partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    /// 1-based position in the procedure
    pub order: u32,
    pub name: String,
    pub command: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    InProgress,
    Success,
    Failed,
}

/// Record of one deployment run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub deploy_id: String,
    pub app: String,
    pub env: String,
    pub path: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    /// Start a new in-progress record
    pub fn begin(deploy_id: &str, app: &str, env: &str, path: &str) -> Self {
        Self {
            deploy_id: deploy_id.to_string(),
            app: app.to_string(),
            env: env.to_string(),
            path: path.to_string(),
            start_time: Utc::now(),
            end_time: None,
            status: RunStatus::InProgress,
            duration_ms: 0,
            steps: Vec::new(),
            error: None,
        }
    }
}

/// One parsed line of a log partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub deploy_id: String,
    pub steps: Vec<StepResult>,
}
