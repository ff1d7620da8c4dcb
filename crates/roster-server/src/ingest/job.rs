//! Job record and state machine
//!
//! A [`JobRecord`] tracks one bulk ingestion job end-to-end. Transitions
//! follow `PENDING -> PROCESSING -> {COMPLETED, FAILED}`; terminal states are
//! final. Only the worker that owns a job mutates its record, so counters are
//! monotonic by construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Ingestion job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PENDING" => JobStatus::Pending,
            "PROCESSING" => JobStatus::Processing,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            _ => JobStatus::Pending,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from invalid state-machine operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid transition: job is {from} and cannot become {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("chunk counters would exceed total_records")]
    CountOverflow,

    #[error("whole-job retry is only allowed before processing starts")]
    RetryAfterStart,
}

/// Durable state describing one ingestion job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub status: JobStatus,
    pub total_records: u32,
    pub processed_records: u32,
    pub failed_records: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal failure cause, present only when status is FAILED
    pub error_summary: Option<String>,
    /// Whole-job retry attempts consumed so far
    pub retry_count: u32,
}

impl JobRecord {
    /// Create a new PENDING job for `total_records` records
    pub fn new(total_records: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            total_records,
            processed_records: 0,
            failed_records: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_summary: None,
            retry_count: 0,
        }
    }

    /// Progress as a whole percentage, floored
    pub fn progress_percentage(&self) -> u8 {
        if self.total_records == 0 {
            return 0;
        }
        (self.processed_records as u64 * 100 / self.total_records as u64) as u8
    }

    /// Seconds spent processing so far, or total once terminal
    pub fn duration_secs(&self) -> Option<f64> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some((end - started).num_milliseconds() as f64 / 1000.0)
    }

    /// PENDING -> PROCESSING; sets `started_at` on the first transition
    pub fn begin_processing(&mut self) -> Result<(), StateError> {
        if self.status != JobStatus::Pending {
            return Err(StateError::InvalidTransition {
                from: self.status,
                to: JobStatus::Processing,
            });
        }
        self.status = JobStatus::Processing;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Fold one chunk's counters into the record
    ///
    /// `processed` counts every record that reached an outcome in the chunk,
    /// `failed` the subset that failed validation or persistence.
    pub fn record_chunk(&mut self, processed: u32, failed: u32) -> Result<(), StateError> {
        if self.status != JobStatus::Processing {
            return Err(StateError::InvalidTransition {
                from: self.status,
                to: JobStatus::Processing,
            });
        }
        if failed > processed
            || self.processed_records + processed > self.total_records
        {
            return Err(StateError::CountOverflow);
        }
        self.processed_records += processed;
        self.failed_records += failed;
        Ok(())
    }

    /// PROCESSING -> COMPLETED once every chunk has been folded in
    pub fn complete(&mut self) -> Result<(), StateError> {
        if self.status != JobStatus::Processing
            || self.processed_records != self.total_records
        {
            return Err(StateError::InvalidTransition {
                from: self.status,
                to: JobStatus::Completed,
            });
        }
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// PENDING/PROCESSING -> FAILED with a terminal cause
    ///
    /// Counters keep whatever progress was committed before the failure.
    pub fn fail(&mut self, summary: impl Into<String>) -> Result<(), StateError> {
        if self.status.is_terminal() {
            return Err(StateError::InvalidTransition {
                from: self.status,
                to: JobStatus::Failed,
            });
        }
        self.status = JobStatus::Failed;
        self.error_summary = Some(summary.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Consume one whole-job retry attempt
    ///
    /// Only valid while PENDING and before any chunk committed.
    pub fn note_retry(&mut self) -> Result<(), StateError> {
        if self.status != JobStatus::Pending || self.processed_records > 0 {
            return Err(StateError::RetryAfterStart);
        }
        self.retry_count += 1;
        Ok(())
    }
}
