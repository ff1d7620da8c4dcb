//! Job status query
//!
//! Snapshot of one job's progress, served from the scheduler's in-memory
//! registry without touching the worker path.

use chrono::{DateTime, Utc};
use mediator::Request;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::ingest::{JobRecord, JobScheduler, StatusError};

/// Query for a job's current status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetStatusQuery {
    pub job_id: Uuid,
}

/// Job status snapshot for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: String,
    pub total_records: u32,
    pub processed_records: u32,
    pub failed_records: u32,
    pub progress_percentage: u8,
    pub duration_secs: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_summary: Option<String>,
}

impl From<JobRecord> for JobStatusResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            job_id: job.id,
            status: job.status.as_str().to_string(),
            total_records: job.total_records,
            processed_records: job.processed_records,
            failed_records: job.failed_records,
            progress_percentage: job.progress_percentage(),
            duration_secs: job.duration_secs(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error_summary: job.error_summary,
        }
    }
}

impl Request<Result<JobStatusResponse, StatusError>> for GetStatusQuery {}

pub fn handle(
    scheduler: &Arc<JobScheduler>,
    query: GetStatusQuery,
) -> Result<JobStatusResponse, StatusError> {
    let snapshot = scheduler.get_status(query.job_id)?;
    Ok(snapshot.into())
}
