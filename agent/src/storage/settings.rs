//! Settings file management

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deploy::executor::STEP_TIMEOUT;
use crate::deploy::registry::{AppEnvironments, AppRegistry};
use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Agent settings
#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit agent logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Directory for rolling agent logs; stdout only when absent
    #[serde(default)]
    pub agent_log_dir: Option<PathBuf>,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Bearer token required on deployment and log routes
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Requests accepted per minute across all clients; 0 disables the limit
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    /// Directory holding the run log partitions
    #[serde(default)]
    pub logs_dir: Option<PathBuf>,

    /// Interpreter argv used to run step commands, e.g. `["bash", "-c"]`
    #[serde(default)]
    pub shell: Option<Vec<String>>,

    /// Per-step timeout in seconds
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,

    /// Deployable applications: app -> env -> definition
    #[serde(default)]
    pub apps: BTreeMap<String, AppEnvironments>,
}

fn default_rate_limit() -> u32 {
    60
}

fn default_step_timeout() -> u64 {
    STEP_TIMEOUT.as_secs()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            agent_log_dir: None,
            server: ServerSettings::default(),
            auth_token: None,
            rate_limit_per_minute: default_rate_limit(),
            logs_dir: None,
            shell: None,
            step_timeout_secs: default_step_timeout(),
            apps: BTreeMap::new(),
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .field("agent_log_dir", &self.agent_log_dir)
            .field("server", &self.server)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("logs_dir", &self.logs_dir)
            .field("shell", &self.shell)
            .field("step_timeout_secs", &self.step_timeout_secs)
            .field("apps", &self.apps.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Settings {
    /// Load settings from a JSON file
    pub async fn load(file: &File) -> Result<Self, AgentError> {
        file.read_json::<Settings>().await.map_err(|e| {
            AgentError::ConfigError(format!(
                "Unable to read settings file {}: {}",
                file.path().display(),
                e
            ))
        })
    }

    /// Build the application registry from `apps`
    pub fn registry(&self) -> Result<AppRegistry, AgentError> {
        AppRegistry::new(self.apps.clone())
    }

    pub fn step_timeout(&self) -> Duration {
        if self.step_timeout_secs == 0 {
            STEP_TIMEOUT
        } else {
            Duration::from_secs(self.step_timeout_secs)
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
