//! REST API handlers for the rostering service.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::demo_data::{self, DemoData};
use crate::solver::{prepare, solve_document, validate_full, JobStatus, SolveError, SolveSettings, SolverService};

/// Application state shared across handlers.
pub struct AppState {
    pub service: SolverService,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            service: SolverService::new(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn default_solve_time() -> u64 {
    15
}

fn default_job_time() -> u64 {
    60
}

fn default_workers() -> usize {
    8
}

/// Body for the synchronous solve endpoint.
#[derive(Debug, Deserialize)]
pub struct SolveRequest {
    pub spec: Value,
    #[serde(default = "default_solve_time")]
    pub max_time_seconds: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Body for job submission.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub spec: Value,
    #[serde(default = "default_job_time")]
    pub max_time_seconds: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub spec: Value,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
}

/// Creates the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info_endpoint))
        .route("/demo-data", get(list_demo_data))
        .route("/demo-data/{id}", get(get_demo_data))
        .route("/solve", post(solve))
        .route("/validate", post(validate))
        .route("/jobs", post(submit_job))
        .route("/jobs/{id}", get(job_status))
        .route("/jobs/{id}/result", get(job_result))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health - liveness check.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub solver_engine: &'static str,
}

/// GET /info - application info.
async fn info_endpoint() -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "Shift Rostering",
        version: env!("CARGO_PKG_VERSION"),
        solver_engine: "in-process CP",
    })
}

/// GET /demo-data - list available demo specs.
async fn list_demo_data() -> Json<Vec<&'static str>> {
    Json(demo_data::list_demo_data())
}

/// GET /demo-data/{id} - one generated demo spec.
async fn get_demo_data(Path(id): Path<String>) -> Result<Json<Value>, StatusCode> {
    match id.parse::<DemoData>() {
        Ok(demo) => Ok(Json(demo_data::generate(demo))),
        Err(_) => Err(StatusCode::NOT_FOUND),
    }
}

fn limits_error(max_time_seconds: u64, workers: usize) -> Option<Response> {
    let mut errors = Vec::new();
    if max_time_seconds < 1 {
        errors.push("max_time_seconds must be >= 1".to_string());
    }
    if workers < 1 {
        errors.push("workers must be >= 1".to_string());
    }
    if errors.is_empty() {
        None
    } else {
        Some((StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "errors": errors }))).into_response())
    }
}

/// POST /solve - run the pipeline synchronously and return the result.
async fn solve(Json(req): Json<SolveRequest>) -> Response {
    if let Some(rejection) = limits_error(req.max_time_seconds, req.workers) {
        return rejection;
    }
    let settings = SolveSettings {
        max_time_seconds: req.max_time_seconds,
        workers: req.workers,
    };
    let outcome =
        tokio::task::spawn_blocking(move || solve_document(&req.spec, settings)).await;
    match outcome {
        Ok(Ok(output)) => Json(output).into_response(),
        Ok(Err(SolveError::Invalid { errors })) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "errors": errors })),
        )
            .into_response(),
        Ok(Err(err @ SolveError::Capacity(_))) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "errors": [err.to_string()] })),
        )
            .into_response(),
        Err(join_err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "errors": [join_err.to_string()] })),
        )
            .into_response(),
    }
}

/// POST /validate - full validation report, no job allocated.
async fn validate(Json(req): Json<ValidateRequest>) -> Json<crate::validate::Validation> {
    Json(validate_full(&req.spec))
}

/// POST /jobs - validate synchronously, then solve in the background.
async fn submit_job(State(state): State<Arc<AppState>>, Json(req): Json<SubmitRequest>) -> Response {
    if let Some(rejection) = limits_error(req.max_time_seconds, req.workers) {
        return rejection;
    }
    let norm = match prepare(&req.spec) {
        Ok(norm) => norm,
        Err(errors) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "errors": errors })),
            )
                .into_response();
        }
    };

    let settings = SolveSettings {
        max_time_seconds: req.max_time_seconds,
        workers: req.workers,
    };
    let job_id = state.service.create_job();
    info!(%job_id, "job accepted");

    let worker_state = state.clone();
    let worker_job_id = job_id.clone();
    tokio::task::spawn_blocking(move || {
        worker_state
            .service
            .run_job(&worker_job_id, norm, settings);
    });

    Json(SubmitResponse { job_id }).into_response()
}

/// GET /jobs/{id} - job status plus the best-known bound.
async fn job_status(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.service.job(&id) {
        Some(job) => {
            let mut body = json!({ "job_id": job.job_id, "status": job.status });
            if let Some(bound) = job.bound {
                body["bound"] = json!(bound);
            }
            Json(body).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /jobs/{id}/result - the stored result blob once the job is over.
async fn job_result(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let Some(job) = state.service.job(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match job.status {
        JobStatus::Done | JobStatus::Failed => match job.result {
            Some(result) => Json(result).into_response(),
            None => Json(json!({
                "status": job.status,
                "message": job.error,
            }))
            .into_response(),
        },
        _ => Json(json!({ "job_id": job.job_id, "status": job.status })).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_reject_zero_values() {
        assert!(limits_error(0, 8).is_some());
        assert!(limits_error(15, 0).is_some());
        assert!(limits_error(15, 8).is_none());
    }

    #[test]
    fn demo_ids_parse() {
        assert!("SMALL".parse::<DemoData>().is_ok());
        assert!("large".parse::<DemoData>().is_ok());
        assert!("weird".parse::<DemoData>().is_err());
    }
}
