//! REST endpoints for job records and the current ingestion run.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::warn;

use super::model::JobStatus;
use super::service::{JobService, UpsertKind};
use crate::error::DatabaseError;
use crate::pipeline::RunMonitor;

/// Shared state for the REST routes.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobService>,
    /// The ingestion run, when one was started.
    pub run: Option<RunMonitor>,
}

#[derive(Debug, Deserialize)]
struct CreateJob {
    name: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

#[derive(Debug, Deserialize)]
struct NameQuery {
    name: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn db_error(op: &str, e: DatabaseError) -> Response {
    warn!(op, error = %e, "Job store error");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn not_found(id: impl std::fmt::Display) -> Response {
    error_response(StatusCode::NOT_FOUND, format!("job {id} not found"))
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /jobs
async fn list_jobs(State(state): State<AppState>) -> Response {
    match state.jobs.list().await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => db_error("list", e),
    }
}

/// POST /jobs
///
/// Create-or-update by name: 201 when created, 200 when an existing record
/// was overwritten.
async fn create_job(State(state): State<AppState>, Json(body): Json<CreateJob>) -> Response {
    let name = body.name.trim();
    if name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "name must not be empty");
    }
    let status: JobStatus = match body.status.parse() {
        Ok(status) => status,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    match state.jobs.create_or_update(name, status).await {
        Ok((job, UpsertKind::Created)) => (StatusCode::CREATED, Json(job)).into_response(),
        Ok((job, UpsertKind::Updated)) => Json(job).into_response(),
        Err(e) => db_error("create_or_update", e),
    }
}

/// GET /jobs/{id}
async fn get_job(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.jobs.get(id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => not_found(id),
        Err(e) => db_error("get", e),
    }
}

/// GET /jobs/by-name?name=
async fn get_job_by_name(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Response {
    match state.jobs.find_by_name(&query.name).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => not_found(format!("'{}'", query.name)),
        Err(e) => db_error("find_by_name", e),
    }
}

/// PUT /jobs/{id}/status
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<StatusBody>,
) -> Response {
    let status: JobStatus = match body.status.parse() {
        Ok(status) => status,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    match state.jobs.update_status(id, status).await {
        Ok(Some(_)) => StatusCode::NO_CONTENT.into_response(),
        Ok(None) => not_found(id),
        Err(e) => db_error("update_status", e),
    }
}

/// DELETE /jobs/{id}
async fn delete_job(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.jobs.delete(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(id),
        Err(e) => db_error("delete", e),
    }
}

/// DELETE /jobs
async fn delete_all_jobs(State(state): State<AppState>) -> Response {
    match state.jobs.delete_all().await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => db_error("delete_all", e),
    }
}

/// GET /ingest/stats
///
/// State and counters of the current run, or 404 if ingestion is disabled.
async fn ingest_stats(State(state): State<AppState>) -> Response {
    match &state.run {
        Some(run) => Json(serde_json::json!({
            "run_id": run.run_id(),
            "state": run.state(),
            "stats": run.stats(),
            "report": run.report(),
        }))
        .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "no ingestion run"),
    }
}

/// Build the REST router.
pub fn jobs_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", get(list_jobs).post(create_job).delete(delete_all_jobs))
        .route("/jobs/by-name", get(get_job_by_name))
        .route("/jobs/{id}", get(get_job).delete(delete_job))
        .route("/jobs/{id}/status", axum::routing::put(update_status))
        .route("/ingest/stats", get(ingest_stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
