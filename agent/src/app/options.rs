//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::deploy::executor::STEP_TIMEOUT;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Settings file, re-read on reload
    pub settings_file: PathBuf,

    /// Run log partition directory
    pub logs_dir: PathBuf,

    /// Step execution configuration
    pub execution: ExecutionOptions,

    /// Bearer token for protected routes
    pub auth_token: Option<SecretString>,

    /// Requests per minute; 0 disables limiting
    pub rate_limit_per_minute: u32,
}

impl AppOptions {
    /// Derive options from a loaded settings file
    pub fn from_settings(settings: &Settings, layout: &StorageLayout, settings_file: PathBuf) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            settings_file,
            logs_dir: settings
                .logs_dir
                .clone()
                .unwrap_or_else(|| layout.logs_dir().path().to_path_buf()),
            execution: ExecutionOptions {
                shell: settings.shell.clone(),
                step_timeout: settings.step_timeout(),
            },
            auth_token: settings.auth_token.clone().map(SecretString::from),
            rate_limit_per_minute: settings.rate_limit_per_minute,
        }
    }
}

impl Default for AppOptions {
    fn default() -> Self {
        let layout = StorageLayout::default();
        Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions::default(),
            settings_file: layout.settings_file().path().to_path_buf(),
            logs_dir: layout.logs_dir().path().to_path_buf(),
            execution: ExecutionOptions::default(),
            auth_token: None,
            rate_limit_per_minute: 60,
        }
    }
}

/// Lifecycle options for the agent
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,

    /// How long shutdown waits for in-flight runs to finish
    pub run_drain_timeout: Duration,

    /// Poll interval while draining runs
    pub run_drain_poll_interval: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
            run_drain_timeout: Duration::from_secs(20),
            run_drain_poll_interval: Duration::from_millis(250),
        }
    }
}

/// Step execution options
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Interpreter argv; platform shell when `None`
    pub shell: Option<Vec<String>>,

    /// Per-step timeout
    pub step_timeout: Duration,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            shell: None,
            step_timeout: STEP_TIMEOUT,
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
