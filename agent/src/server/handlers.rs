//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::errors::AgentError;
use crate::models::deployment::RunKey;
use crate::models::run::LogEntry;
use crate::server::state::ServerState;
use crate::storage::run_log::{LogQuery, QueryResult};
use crate::storage::settings::Settings;
use crate::utils::version_info;

/// Default number of records returned by `/logs`
pub const DEFAULT_LOG_LIMIT: usize = 50;

/// Upper bound on `limit` for `/logs`
pub const MAX_LOG_LIMIT: usize = 1000;

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = match &self {
            AgentError::NotFound(_) => StatusCode::NOT_FOUND,
            AgentError::AlreadyRunning { .. } => StatusCode::CONFLICT,
            AgentError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AgentError::AuthError(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "deploy-agent".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Deploy response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    pub deploy_id: String,
    pub status: String,
}

/// Trigger a deployment; answers before the run finishes
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path((app, env)): Path<(String, String)>,
) -> Result<impl IntoResponse, AgentError> {
    let started = state.deployer.acquire_and_run(&app, &env)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(DeployResponse {
            deploy_id: started.deploy_id,
            status: "started".to_string(),
        }),
    ))
}

/// Query parameters for `/logs`
#[derive(Debug, Default, Deserialize)]
pub struct LogsParams {
    pub limit: Option<usize>,
    pub app: Option<String>,
    pub env: Option<String>,
    pub date: Option<String>,
}

/// Query one day's run log
pub async fn logs_handler(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<LogsParams>,
) -> Result<Json<QueryResult>, AgentError> {
    let query = LogQuery {
        limit: params.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT),
        app: params.app,
        env: params.env,
        date: params.date,
    };
    Ok(Json(state.log_store.query(&query).await?))
}

/// Look up one run by deploy ID
pub async fn log_handler(
    State(state): State<Arc<ServerState>>,
    Path(deploy_id): Path<String>,
) -> Result<Json<LogEntry>, AgentError> {
    state
        .log_store
        .find_by_id(&deploy_id)
        .await?
        .map(Json)
        .ok_or_else(|| AgentError::NotFound(format!("Deployment {}", deploy_id)))
}

/// Partition dates response
#[derive(Debug, Serialize, Deserialize)]
pub struct DatesResponse {
    pub dates: Vec<String>,
}

/// List the days that have a run log
pub async fn dates_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<DatesResponse>, AgentError> {
    let dates = state.log_store.partitions().await?;
    Ok(Json(DatesResponse { dates }))
}

/// Active runs response
#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveRunsResponse {
    pub runs: Vec<RunKey>,
    pub total: usize,
}

/// List application environments with a run in flight
pub async fn active_runs_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let runs = state.deployer.guard().active();
    let total = runs.len();
    Json(ActiveRunsResponse { runs, total })
}

/// Reload response
#[derive(Debug, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub success: bool,
    pub environments: usize,
}

/// Re-read the settings file and swap in the new registry.
/// The current registry stays in place if the file is invalid.
pub async fn reload_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<ReloadResponse>, AgentError> {
    let settings = Settings::load(&state.settings_file).await?;
    let registry = settings.registry()?;
    let environments = registry.len();
    state.deployer.registry().replace(registry);
    info!(
        "Reloaded registry from {}",
        state.settings_file.path().display()
    );
    Ok(Json(ReloadResponse {
        success: true,
        environments,
    }))
}
