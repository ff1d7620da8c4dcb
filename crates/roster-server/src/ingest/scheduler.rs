//! Job scheduler
//!
//! Admits bulk submissions, bounds concurrency with a semaphore-gated worker
//! pool, and drives each admitted job through its chunks on a dedicated
//! worker task. The scheduler owns the in-memory job registry: workers write
//! through their [`ProgressTracker`], every other caller reads lock-free
//! snapshots, and terminal records stay queryable until externally purged.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::chunk::{Chunk, ChunkError, ChunkOutcome, ChunkProcessor};
use super::config::IngestConfig;
use super::dependency::ExternalDependency;
use super::gateway::PersistenceGateway;
use super::job::{JobRecord, JobStatus};
use super::progress::ProgressTracker;
use super::record::RecordDraft;
use super::retry::Backoff;

/// Submission-time rejections; no job record exists when these fire
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("batch of {got} records exceeds the maximum of {max}")]
    Capacity { got: usize, max: usize },

    #[error("invalid batch: {0}")]
    Validation(String),

    #[error("scheduler is saturated, retry later")]
    Overloaded,
}

/// Status-query failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("job not found: {0}")]
    NotFound(Uuid),
}

/// Schedules and executes ingestion jobs
pub struct JobScheduler {
    config: IngestConfig,
    gateway: Arc<dyn PersistenceGateway>,
    dependency: Arc<dyn ExternalDependency>,
    jobs: RwLock<HashMap<Uuid, watch::Receiver<JobRecord>>>,
    permits: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
}

impl JobScheduler {
    /// Create a scheduler over the given collaborators
    pub fn new(
        config: IngestConfig,
        gateway: Arc<dyn PersistenceGateway>,
        dependency: Arc<dyn ExternalDependency>,
    ) -> Arc<Self> {
        let permits = Arc::new(Semaphore::new(config.pool_size));
        Arc::new(Self {
            config,
            gateway,
            dependency,
            jobs: RwLock::new(HashMap::new()),
            permits,
            queued: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Submit a batch for asynchronous ingestion
    ///
    /// Validates the batch structurally, applies the admission gate, creates
    /// the job record (PENDING), and hands the job to a worker task. Returns
    /// immediately with the job id.
    pub fn submit(&self, batch: Vec<RecordDraft>) -> Result<Uuid, SubmitError> {
        if batch.len() > self.config.max_batch_size {
            return Err(SubmitError::Capacity {
                got: batch.len(),
                max: self.config.max_batch_size,
            });
        }
        if batch.is_empty() {
            return Err(SubmitError::Validation(
                "batch must contain at least one record".to_string(),
            ));
        }

        // Duplicate ids make the batch structurally ambiguous: reject the
        // whole submission rather than guessing which row wins
        let mut seen = HashSet::new();
        for draft in &batch {
            if let Some(id) = draft.student_id.as_deref() {
                if !seen.insert(id) {
                    return Err(SubmitError::Validation(format!(
                        "duplicate student_id in batch: {id}"
                    )));
                }
            }
        }

        if self.permits.available_permits() == 0
            && self.queued.load(Ordering::Acquire) >= self.config.backlog_limit
        {
            return Err(SubmitError::Overloaded);
        }

        let job = JobRecord::new(batch.len() as u32);
        let job_id = job.id;
        let (tracker, rx) = ProgressTracker::new(job);
        self.jobs_write().insert(job_id, rx);
        self.queued.fetch_add(1, Ordering::AcqRel);

        info!(
            job_id = %job_id,
            total_records = batch.len(),
            "ingestion job accepted"
        );

        let worker = JobWorker {
            config: self.config.clone(),
            gateway: Arc::clone(&self.gateway),
            dependency: Arc::clone(&self.dependency),
            permits: Arc::clone(&self.permits),
            queued: Arc::clone(&self.queued),
        };
        tokio::spawn(async move {
            worker.run(tracker, batch).await;
        });

        Ok(job_id)
    }

    /// Lock-free snapshot of a job's current state
    pub fn get_status(&self, job_id: Uuid) -> Result<JobRecord, StatusError> {
        self.jobs_read()
            .get(&job_id)
            .map(|rx| rx.borrow().clone())
            .ok_or(StatusError::NotFound(job_id))
    }

    /// Watch a job's record as it changes; useful for callers that want to
    /// await progress instead of polling
    pub fn subscribe(&self, job_id: Uuid) -> Result<watch::Receiver<JobRecord>, StatusError> {
        self.jobs_read()
            .get(&job_id)
            .cloned()
            .ok_or(StatusError::NotFound(job_id))
    }

    /// Jobs currently holding PROCESSING status
    pub fn processing_count(&self) -> usize {
        self.jobs_read()
            .values()
            .filter(|rx| rx.borrow().status == JobStatus::Processing)
            .count()
    }

    fn jobs_read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, watch::Receiver<JobRecord>>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn jobs_write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, watch::Receiver<JobRecord>>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Worker owning one job for its whole lifetime
///
/// Holds clones of the scheduler's shared handles so the scheduler itself
/// never blocks on worker progress.
struct JobWorker {
    config: IngestConfig,
    gateway: Arc<dyn PersistenceGateway>,
    dependency: Arc<dyn ExternalDependency>,
    permits: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
}

impl JobWorker {
    /// Wait for a pool slot, then run the job to a terminal state
    async fn run(self, mut tracker: ProgressTracker, drafts: Vec<RecordDraft>) {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.queued.fetch_sub(1, Ordering::AcqRel);
                return;
            }
        };
        self.queued.fetch_sub(1, Ordering::AcqRel);

        let job_id = tracker.snapshot().id;

        if !self.start_job(job_id, &mut tracker).await {
            drop(permit);
            return;
        }

        let processor = ChunkProcessor::new(self.gateway.clone(), self.dependency.clone());
        let chunks = Chunk::split(drafts, self.config.chunk_size);
        let total_chunks = chunks.len();

        for chunk in &chunks {
            match self.process_with_retry(&processor, job_id, chunk).await {
                Ok(outcome) => {
                    if let Err(e) = tracker.apply_chunk(chunk.index, &outcome) {
                        error!(job_id = %job_id, chunk = chunk.index, error = %e, "failed to fold chunk outcome");
                    }
                    self.persist_snapshot(&tracker).await;

                    let snapshot = tracker.snapshot();
                    debug!(
                        job_id = %job_id,
                        chunk = chunk.index,
                        total_chunks,
                        processed = snapshot.processed_records,
                        progress = snapshot.progress_percentage(),
                        "chunk committed"
                    );
                }
                Err(summary) => {
                    warn!(job_id = %job_id, chunk = chunk.index, error = %summary, "job failed");
                    if let Err(e) = tracker.fail(&summary) {
                        error!(job_id = %job_id, error = %e, "failed to mark job as failed");
                    }
                    self.persist_snapshot(&tracker).await;
                    drop(permit);
                    return;
                }
            }
        }

        if let Err(e) = tracker.complete() {
            error!(job_id = %job_id, error = %e, "failed to mark job as completed");
        }
        self.persist_snapshot(&tracker).await;

        let snapshot = tracker.snapshot();
        info!(
            job_id = %job_id,
            processed = snapshot.processed_records,
            failed = snapshot.failed_records,
            "job completed"
        );
        drop(permit);
    }

    /// Create the durable job record and transition to PROCESSING
    ///
    /// Infrastructure failures here happen before any chunk has started, so
    /// the job is re-enqueued from scratch, bounded by `max_job_retries`.
    /// Returns false when the job went terminal instead of starting.
    async fn start_job(&self, job_id: Uuid, tracker: &mut ProgressTracker) -> bool {
        loop {
            match self.gateway.create_job(&tracker.snapshot()).await {
                Ok(()) => break,
                Err(e) if e.is_transient() => {
                    let attempt = tracker.snapshot().retry_count;
                    if attempt >= self.config.max_job_retries {
                        let summary = format!("job retries exhausted: {e}");
                        warn!(job_id = %job_id, error = %e, "job failed before processing");
                        if let Err(e) = tracker.fail(&summary) {
                            error!(job_id = %job_id, error = %e, "failed to mark job as failed");
                        }
                        return false;
                    }
                    if let Err(e) = tracker.note_retry() {
                        error!(job_id = %job_id, error = %e, "failed to count job retry");
                        return false;
                    }
                    let delay = self.config.retry_policy().delay_for(attempt);
                    warn!(
                        job_id = %job_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "job record creation failed, re-enqueueing"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "job failed before processing");
                    if let Err(e) = tracker.fail(&e.to_string()) {
                        error!(job_id = %job_id, error = %e, "failed to mark job as failed");
                    }
                    return false;
                }
            }
        }

        if let Err(e) = tracker.begin_processing() {
            error!(job_id = %job_id, error = %e, "failed to mark job as processing");
            return false;
        }
        self.persist_snapshot(tracker).await;
        true
    }

    /// Process one chunk under the retry policy
    ///
    /// Transient failures back off and retry until the policy is exhausted;
    /// exhaustion or a fatal error returns the terminal failure cause.
    async fn process_with_retry(
        &self,
        processor: &ChunkProcessor,
        job_id: Uuid,
        chunk: &Chunk,
    ) -> Result<ChunkOutcome, String> {
        let mut backoff = Backoff::new(self.config.retry_policy());

        loop {
            match processor.process(job_id, chunk).await {
                Ok(outcome) => return Ok(outcome),
                Err(ChunkError::Transient(cause)) => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(
                            job_id = %job_id,
                            chunk = chunk.index,
                            attempt = backoff.attempt(),
                            delay_ms = delay.as_millis() as u64,
                            error = %cause,
                            "transient chunk failure, backing off"
                        );
                        sleep(delay).await;
                    }
                    None => {
                        return Err(format!(
                            "chunk {} failed after {} retries: {}",
                            chunk.index, self.config.max_chunk_retries, cause
                        ));
                    }
                },
                Err(ChunkError::Fatal(cause)) => {
                    return Err(format!("chunk {}: {}", chunk.index, cause));
                }
            }
        }
    }

    /// Write the current snapshot through the gateway, best effort
    ///
    /// The in-memory record is the status source of truth while the job is
    /// active; a failed durability write is logged and processing continues.
    async fn persist_snapshot(&self, tracker: &ProgressTracker) {
        let snapshot = tracker.snapshot();
        if let Err(e) = self.gateway.update_job(&snapshot).await {
            warn!(job_id = %snapshot.id, error = %e, "failed to persist job snapshot");
        }
    }
}
