//! Ingestion routes
//!
//! Submission returns immediately with a job id; status is a lock-free
//! snapshot and never waits on the worker path.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use super::commands::{submit::handle as handle_submit, SubmitBatchCommand};
use super::queries::{get_status::handle as handle_get_status, GetStatusQuery};
use crate::error::AppError;
use crate::ingest::JobScheduler;

/// Create ingestion routes
pub fn ingestion_routes() -> Router<Arc<JobScheduler>> {
    Router::new()
        .route("/ingest", post(submit_batch))
        .route("/ingest/:job_id/status", get(job_status))
}

/// Submit a batch of records for asynchronous ingestion
///
/// POST /ingest
async fn submit_batch(
    State(scheduler): State<Arc<JobScheduler>>,
    Json(command): Json<SubmitBatchCommand>,
) -> Result<Response, AppError> {
    let response = handle_submit(&scheduler, command)?;
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Real-time status of an ingestion job
///
/// GET /ingest/:job_id/status
async fn job_status(
    State(scheduler): State<Arc<JobScheduler>>,
    Path(job_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let status = handle_get_status(&scheduler, GetStatusQuery { job_id })?;
    Ok((StatusCode::OK, Json(status)).into_response())
}
