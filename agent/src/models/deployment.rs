//! Deployment definition models

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One command in a deployment procedure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStep {
    /// Human-readable step name
    pub name: String,

    /// Command line handed to the shell
    pub command: String,
}

/// Deployment procedure for one application environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppEnvironmentDefinition {
    /// Working directory every step runs in
    #[serde(rename = "path")]
    pub working_directory: PathBuf,

    /// Ordered steps, never empty once loaded into a registry
    pub steps: Vec<DeploymentStep>,
}

/// Identifies a run slot: one application environment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunKey {
    pub app: String,
    pub env: String,
}

impl RunKey {
    pub fn new(app: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            env: env.into(),
        }
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app, self.env)
    }
}
