//! Deploy Agent - Entry Point
//!
//! Runs configured deployment procedures when triggered over HTTP and keeps
//! a date-partitioned log of every run.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use colored::Colorize;
use deploy_agent::app::options::AppOptions;
use deploy_agent::app::run::run;
use deploy_agent::filesys::file::File;
use deploy_agent::logs::{init_logging, LogOptions};
use deploy_agent::storage::layout::StorageLayout;
use deploy_agent::storage::settings::Settings;
use deploy_agent::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{}", version),
            Err(e) => eprintln!("Failed to encode version info: {e}"),
        }
        return ExitCode::SUCCESS;
    }

    let layout = StorageLayout::default();
    let settings_file = match cli_args.get("config") {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };

    // Retrieve the settings file
    let settings = match Settings::load(&settings_file).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    // Validate the configuration and exit
    if cli_args.contains_key("check") {
        return check_config(&settings, settings_file.path().to_path_buf());
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings.agent_log_dir.clone(),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let registry = match settings.registry() {
        Ok(registry) => registry,
        Err(e) => {
            error!("Invalid application configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let options = AppOptions::from_settings(
        &settings,
        &layout,
        settings_file.path().to_path_buf(),
    );

    info!(
        "Running deploy agent {} on {}:{} with {} application environments, logs in {}",
        version_info().version,
        options.server.host,
        options.server.port,
        registry.len(),
        options.logs_dir.display()
    );

    match run(options, registry, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to run the agent: {e}");
            ExitCode::FAILURE
        }
    }
}

fn check_config(settings: &Settings, path: PathBuf) -> ExitCode {
    let registry = match settings.registry() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("{} {}: {}", "invalid:".red().bold(), path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    println!("{} {}", "valid:".green().bold(), path.display());
    for (app, envs) in registry.entries() {
        for env in envs {
            let steps = registry.lookup(app, env).map(|d| d.steps.len()).unwrap_or(0);
            println!("  {}/{} ({} steps)", app.cyan(), env, steps);
        }
    }
    if settings.auth_token.is_none() {
        println!("{} no auth_token set", "warning:".yellow().bold());
    }
    ExitCode::SUCCESS
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Unable to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
