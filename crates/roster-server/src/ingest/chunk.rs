//! Chunk processing
//!
//! A chunk is an ephemeral slice of up to [`CHUNK_SIZE`] records drawn from a
//! job's submission, owned by the worker for the duration of one processing
//! step. Processing a chunk validates every record, makes one rate-limited
//! external call, and bulk-writes the survivors; the job record itself is
//! never touched here.

use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::dependency::ExternalDependency;
use super::gateway::{GatewayError, PersistenceGateway};
use super::record::{RecordDraft, ValidRecord};
use super::validator::{self, RecordError};

/// Records per chunk; one external-dependency call is made per chunk
pub const CHUNK_SIZE: usize = 100;

/// One fixed-size slice of a submission, carrying original positions
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Zero-based position of this chunk within the job
    pub index: u32,
    /// Records paired with their position in the original submission
    pub records: Vec<(usize, RecordDraft)>,
}

impl Chunk {
    /// Split a submission into chunks of at most `chunk_size` records,
    /// preserving submission order
    pub fn split(drafts: Vec<RecordDraft>, chunk_size: usize) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut records = Vec::new();

        for (position, draft) in drafts.into_iter().enumerate() {
            records.push((position, draft));
            if records.len() == chunk_size {
                chunks.push(Chunk {
                    index: chunks.len() as u32,
                    records: std::mem::take(&mut records),
                });
            }
        }

        if !records.is_empty() {
            chunks.push(Chunk {
                index: chunks.len() as u32,
                records,
            });
        }

        chunks
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Why one record failed while the rest of its chunk went through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFailure {
    /// Schema violations; never retried
    Validation(RecordError),
    /// The store refused this row while storing its siblings
    Persistence { index: usize, reason: String },
}

impl RecordFailure {
    /// Position of the record in the original submission
    pub fn index(&self) -> usize {
        match self {
            RecordFailure::Validation(e) => e.index,
            RecordFailure::Persistence { index, .. } => *index,
        }
    }

    /// Failure class, for retained error rows
    pub fn kind(&self) -> &'static str {
        match self {
            RecordFailure::Validation(_) => "ValidationError",
            RecordFailure::Persistence { .. } => "PersistenceError",
        }
    }
}

impl std::fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordFailure::Validation(e) => e.fmt(f),
            RecordFailure::Persistence { index, reason } => {
                write!(f, "record {}: {}", index, reason)
            }
        }
    }
}

/// Aggregate outcome of one chunk
///
/// Every record in the chunk lands in exactly one of the two lists.
#[derive(Debug, Clone, Default)]
pub struct ChunkOutcome {
    /// Rows confirmed durably stored
    pub succeeded: Vec<ValidRecord>,
    /// Per-record failures, counted but never retried
    pub failed: Vec<RecordFailure>,
}

impl ChunkOutcome {
    /// Records that reached an outcome in this chunk
    pub fn processed(&self) -> u32 {
        (self.succeeded.len() + self.failed.len()) as u32
    }
}

/// Whole-chunk failures, subject to the retry policy
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("transient chunk failure: {0}")]
    Transient(String),

    #[error("{0}")]
    Fatal(String),
}

fn map_gateway(e: GatewayError) -> ChunkError {
    match e {
        GatewayError::Transient(msg) => ChunkError::Transient(msg),
        GatewayError::Fatal(msg) => ChunkError::Fatal(msg),
    }
}

/// Processes one chunk end-to-end
pub struct ChunkProcessor {
    gateway: Arc<dyn PersistenceGateway>,
    dependency: Arc<dyn ExternalDependency>,
}

impl ChunkProcessor {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        dependency: Arc<dyn ExternalDependency>,
    ) -> Self {
        Self {
            gateway,
            dependency,
        }
    }

    /// Process one chunk: validate, call the external dependency once, bulk
    /// write, retain failures
    ///
    /// Returns the aggregate outcome; whole-chunk errors surface as
    /// [`ChunkError`] for the caller's retry policy. Safe to call again for
    /// the same chunk: the gateway writes are conflict-free.
    pub async fn process(&self, job_id: Uuid, chunk: &Chunk) -> Result<ChunkOutcome, ChunkError> {
        let mut valid = Vec::new();
        let mut failed = Vec::new();

        for (position, draft) in &chunk.records {
            match validator::validate(*position, draft) {
                Ok(record) => valid.push(record),
                Err(e) => failed.push(RecordFailure::Validation(e)),
            }
        }

        // One upstream round-trip per chunk, however many records survived
        // validation
        self.dependency
            .call(chunk.len())
            .await
            .map_err(|e| ChunkError::Transient(e.to_string()))?;

        let mut succeeded = Vec::new();
        if !valid.is_empty() {
            let report = self
                .gateway
                .bulk_persist(job_id, &valid)
                .await
                .map_err(map_gateway)?;

            let stored: HashSet<usize> = report.stored.into_iter().collect();
            for rejection in report.rejected {
                failed.push(RecordFailure::Persistence {
                    index: rejection.index,
                    reason: rejection.reason,
                });
            }
            succeeded = valid
                .into_iter()
                .filter(|record| stored.contains(&record.index))
                .collect();
        }

        if !failed.is_empty() {
            self.gateway
                .record_failures(job_id, &failed)
                .await
                .map_err(map_gateway)?;
        }

        Ok(ChunkOutcome { succeeded, failed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::dependency::FixedLatency;
    use crate::ingest::gateway::MemoryGateway;
    use std::time::Duration;

    fn drafts(count: usize) -> Vec<RecordDraft> {
        (0..count)
            .map(|i| RecordDraft::minimal(&format!("STU{i:04}"), &format!("s{i}@example.com"), "10"))
            .collect()
    }

    fn processor(gateway: Arc<MemoryGateway>, delay_ms: u64) -> ChunkProcessor {
        ChunkProcessor::new(gateway, Arc::new(FixedLatency::new(Duration::from_millis(delay_ms))))
    }

    #[test]
    fn test_split_preserves_order_and_positions() {
        let chunks = Chunk::split(drafts(250), 100);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 100);
        assert_eq!(chunks[1].len(), 100);
        assert_eq!(chunks[2].len(), 50);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[2].index, 2);
        assert_eq!(chunks[1].records[0].0, 100);
        assert_eq!(chunks[2].records[49].0, 249);
    }

    #[test]
    fn test_split_exact_multiple() {
        let chunks = Chunk::split(drafts(200), 100);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].len(), 100);
    }

    #[test]
    fn test_split_empty() {
        assert!(Chunk::split(Vec::new(), 100).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_applies_one_delay_per_chunk() {
        let gateway = Arc::new(MemoryGateway::new());
        let processor = processor(gateway.clone(), 500);
        let job_id = Uuid::new_v4();
        let chunks = Chunk::split(drafts(100), 100);

        let before = tokio::time::Instant::now();
        let outcome = processor.process(job_id, &chunks[0]).await.unwrap();

        // 500ms once for the whole chunk, not per record
        assert_eq!(before.elapsed(), Duration::from_millis(500));
        assert_eq!(outcome.succeeded.len(), 100);
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.processed(), 100);
        assert_eq!(gateway.row_count(job_id), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_delay_applies_even_when_all_records_invalid() {
        let gateway = Arc::new(MemoryGateway::new());
        let processor = processor(gateway.clone(), 500);
        let job_id = Uuid::new_v4();
        let invalid = vec![RecordDraft::default(); 10];
        let chunks = Chunk::split(invalid, 100);

        let before = tokio::time::Instant::now();
        let outcome = processor.process(job_id, &chunks[0]).await.unwrap();

        assert_eq!(before.elapsed(), Duration::from_millis(500));
        assert!(outcome.succeeded.is_empty());
        assert_eq!(outcome.failed.len(), 10);
        assert_eq!(gateway.failure_count(job_id), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_partitions_valid_and_invalid() {
        let gateway = Arc::new(MemoryGateway::new());
        let processor = processor(gateway.clone(), 500);
        let job_id = Uuid::new_v4();

        let mut batch = drafts(10);
        batch[3].email = Some("broken".to_string());
        batch[7] = RecordDraft::default();
        let chunks = Chunk::split(batch, 100);

        let outcome = processor.process(job_id, &chunks[0]).await.unwrap();

        assert_eq!(outcome.succeeded.len(), 8);
        assert_eq!(outcome.failed.len(), 2);
        assert_eq!(outcome.processed(), 10);
        let failed_positions: Vec<usize> = outcome.failed.iter().map(RecordFailure::index).collect();
        assert_eq!(failed_positions, vec![3, 7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_row_rejection_does_not_abort_siblings() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.reject_student_ids(["STU0005".to_string()]);
        let processor = processor(gateway.clone(), 500);
        let job_id = Uuid::new_v4();
        let chunks = Chunk::split(drafts(10), 100);

        let outcome = processor.process(job_id, &chunks[0]).await.unwrap();

        assert_eq!(outcome.succeeded.len(), 9);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].kind(), "PersistenceError");
        assert_eq!(gateway.row_count(job_id), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_surfaces_transient_gateway_failure() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.script_bulk_outcomes([Some(GatewayError::Transient("store offline".to_string()))]);
        let processor = processor(gateway.clone(), 500);
        let job_id = Uuid::new_v4();
        let chunks = Chunk::split(drafts(10), 100);

        let err = processor.process(job_id, &chunks[0]).await.unwrap_err();
        assert!(matches!(err, ChunkError::Transient(_)));

        // A later delivery of the same chunk succeeds without double counting
        let outcome = processor.process(job_id, &chunks[0]).await.unwrap();
        assert_eq!(outcome.succeeded.len(), 10);
        assert_eq!(gateway.row_count(job_id), 10);
    }
}
