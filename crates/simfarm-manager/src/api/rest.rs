use crate::{DispatchError, LoopState, Manager, ManagerStats};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// REST API routes
pub fn create_rest_api(manager: Arc<Manager>) -> Router {
    Router::new()
        .route("/api/v1/jobs", post(submit_job))
        .route("/api/v1/stats", get(get_stats))
        .route("/health", get(health_check))
        .with_state(manager)
}

#[derive(Debug, Deserialize)]
struct SubmitJobRequest {
    source_dir: PathBuf,
    result_root: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SubmitJobResponse {
    job: String,
    status: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    workers_registered: usize,
    workers_idle: usize,
    stopped_loops: Vec<&'static str>,
}

/// Submit a directory job
async fn submit_job(
    State(manager): State<Arc<Manager>>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    if !req.source_dir.is_dir() {
        return Err(ApiError::BadRequest(format!(
            "{} is not a directory",
            req.source_dir.display()
        )));
    }

    let simulation = manager.directory_job(req.source_dir, req.result_root);
    let name = manager.try_submit(simulation).map_err(|e| match e {
        DispatchError::QueueFull | DispatchError::QueueClosed => {
            ApiError::Unavailable(e.to_string())
        }
        other => ApiError::Internal(other.to_string()),
    })?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitJobResponse {
            job: name.to_string(),
            status: "submitted".to_string(),
        }),
    ))
}

/// Pool, queue and loop status
async fn get_stats(State(manager): State<Arc<Manager>>) -> Json<ManagerStats> {
    Json(manager.stats())
}

/// Healthy while every loop is running
async fn health_check(State(manager): State<Arc<Manager>>) -> (StatusCode, Json<HealthResponse>) {
    let stats = manager.stats();
    let stopped_loops: Vec<&'static str> = stats
        .loops
        .iter()
        .filter(|(_, state)| **state != LoopState::Running)
        .map(|(name, _)| *name)
        .collect();

    let (code, status) = if stopped_loops.is_empty() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            workers_registered: stats.workers_registered,
            workers_idle: stats.workers_idle,
            stopped_loops,
        }),
    )
}

/// API error type
enum ApiError {
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
