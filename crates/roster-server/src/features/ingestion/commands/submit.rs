//! Submit batch command
//!
//! Accepts a batch of roster records and hands it to the scheduler; the
//! response carries the job id for status polling.

use mediator::Request;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::ingest::{JobScheduler, RecordDraft, SubmitError};

/// Command to submit a batch of roster records for asynchronous ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitBatchCommand {
    pub records: Vec<RecordDraft>,
}

/// Response returned when a job is accepted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitBatchResponse {
    pub job_id: Uuid,
    pub status: String,
    pub message: String,
    pub total_records: usize,
}

impl Request<Result<SubmitBatchResponse, SubmitError>> for SubmitBatchCommand {}

pub fn handle(
    scheduler: &Arc<JobScheduler>,
    command: SubmitBatchCommand,
) -> Result<SubmitBatchResponse, SubmitError> {
    let total_records = command.records.len();
    let job_id = scheduler.submit(command.records)?;

    Ok(SubmitBatchResponse {
        job_id,
        status: "PENDING".to_string(),
        message: "Ingestion job created successfully".to_string(),
        total_records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{FixedLatency, IngestConfig, MemoryGateway};
    use std::time::Duration;

    fn scheduler() -> Arc<JobScheduler> {
        JobScheduler::new(
            IngestConfig::default(),
            Arc::new(MemoryGateway::new()),
            Arc::new(FixedLatency::new(Duration::from_millis(500))),
        )
    }

    #[tokio::test]
    async fn test_handle_accepts_batch() {
        let scheduler = scheduler();
        let command = SubmitBatchCommand {
            records: vec![RecordDraft::minimal("STU001", "a@example.com", "10")],
        };

        let response = handle(&scheduler, command).unwrap();

        assert_eq!(response.status, "PENDING");
        assert_eq!(response.total_records, 1);
        assert!(scheduler.get_status(response.job_id).is_ok());
    }

    #[tokio::test]
    async fn test_handle_rejects_oversized_batch() {
        let scheduler = scheduler();
        let records = (0..1001)
            .map(|i| RecordDraft::minimal(&format!("STU{i}"), "a@example.com", "10"))
            .collect();

        let err = handle(&scheduler, SubmitBatchCommand { records }).unwrap_err();
        assert!(matches!(err, SubmitError::Capacity { got: 1001, .. }));
    }
}
