//! Application registry: (app, env) -> deployment definition

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::errors::AgentError;
use crate::models::deployment::AppEnvironmentDefinition;

/// Environments of one application, keyed by name
pub type AppEnvironments = BTreeMap<String, AppEnvironmentDefinition>;

/// Immutable set of deployable application environments
#[derive(Debug, Clone, Default)]
pub struct AppRegistry {
    apps: BTreeMap<String, AppEnvironments>,
}

impl AppRegistry {
    /// Build a registry, rejecting definitions that cannot be run
    pub fn new(apps: BTreeMap<String, AppEnvironments>) -> Result<Self, AgentError> {
        for (app, envs) in &apps {
            validate_name("App", app)?;
            for (env, definition) in envs {
                validate_name(&format!("App {} environment", app), env)?;
                validate_definition(app, env, definition)?;
            }
        }
        Ok(Self { apps })
    }

    /// Look up the definition for an application environment
    pub fn lookup(&self, app: &str, env: &str) -> Option<&AppEnvironmentDefinition> {
        self.apps.get(app).and_then(|envs| envs.get(env))
    }

    /// Application names with their environment names
    pub fn entries(&self) -> impl Iterator<Item = (&str, Vec<&str>)> {
        self.apps
            .iter()
            .map(|(app, envs)| (app.as_str(), envs.keys().map(String::as_str).collect()))
    }

    /// Number of application environments
    pub fn len(&self) -> usize {
        self.apps.values().map(|envs| envs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Names end up in deploy IDs, log lines and URL paths
fn validate_name(kind: &str, name: &str) -> Result<(), AgentError> {
    if name.is_empty() {
        return Err(AgentError::ConfigError(format!("{} name is empty", kind)));
    }
    if let Some(c) = name
        .chars()
        .find(|c| *c == ':' || *c == '/' || c.is_whitespace() || c.is_control())
    {
        return Err(AgentError::ConfigError(format!(
            "{} name {:?} contains invalid character {:?}",
            kind, name, c
        )));
    }
    Ok(())
}

fn validate_definition(
    app: &str,
    env: &str,
    definition: &AppEnvironmentDefinition,
) -> Result<(), AgentError> {
    if definition.working_directory.as_os_str().is_empty() {
        return Err(AgentError::ConfigError(format!(
            "{}/{}: path is empty",
            app, env
        )));
    }
    if definition.steps.is_empty() {
        return Err(AgentError::ConfigError(format!(
            "{}/{}: no deployment steps",
            app, env
        )));
    }
    for (i, step) in definition.steps.iter().enumerate() {
        if step.command.trim().is_empty() {
            return Err(AgentError::ConfigError(format!(
                "{}/{}: step {} has an empty command",
                app,
                env,
                i + 1
            )));
        }
    }
    Ok(())
}

/// Shared handle to the current registry, swapped wholesale on reload
#[derive(Debug, Default)]
pub struct RegistryHandle {
    current: RwLock<Arc<AppRegistry>>,
}

impl RegistryHandle {
    pub fn new(registry: AppRegistry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    /// Snapshot of the current registry
    pub fn current(&self) -> Arc<AppRegistry> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the registry; runs already started keep their definitions
    pub fn replace(&self, registry: AppRegistry) {
        info!("Loaded {} application environments", registry.len());
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = Arc::new(registry);
    }
}
