//! Progress tracking
//!
//! The tracker is the single writer for one job's record. Readers hold the
//! watch side and take lock-free snapshots; the worker folds chunk outcomes
//! in through here. A committed-chunk high-water mark makes re-applied chunks
//! (at-least-once redelivery) a no-op, so counters never double-count.

use tokio::sync::watch;

use super::chunk::ChunkOutcome;
use super::job::{JobRecord, StateError};

/// Single-writer handle over one job's record
pub struct ProgressTracker {
    tx: watch::Sender<JobRecord>,
    chunks_committed: u32,
}

impl ProgressTracker {
    /// Wrap a job record; the returned receiver serves status snapshots
    pub fn new(job: JobRecord) -> (Self, watch::Receiver<JobRecord>) {
        let (tx, rx) = watch::channel(job);
        (
            Self {
                tx,
                chunks_committed: 0,
            },
            rx,
        )
    }

    /// Current snapshot of the record
    pub fn snapshot(&self) -> JobRecord {
        self.tx.borrow().clone()
    }

    /// Chunks folded in so far
    pub fn chunks_committed(&self) -> u32 {
        self.chunks_committed
    }

    /// Transition PENDING -> PROCESSING
    pub fn begin_processing(&mut self) -> Result<(), StateError> {
        self.update(JobRecord::begin_processing)
    }

    /// Consume one whole-job retry attempt
    pub fn note_retry(&mut self) -> Result<(), StateError> {
        self.update(JobRecord::note_retry)
    }

    /// Fold one chunk outcome into the record
    ///
    /// Chunks commit in submission order. Returns `Ok(false)` when the chunk
    /// index is below the high-water mark: that delivery already committed
    /// and must not change any counter.
    pub fn apply_chunk(
        &mut self,
        chunk_index: u32,
        outcome: &ChunkOutcome,
    ) -> Result<bool, StateError> {
        if chunk_index < self.chunks_committed {
            return Ok(false);
        }

        let processed = outcome.processed();
        let failed = outcome.failed.len() as u32;
        self.update(|job| job.record_chunk(processed, failed))?;
        self.chunks_committed = chunk_index + 1;
        Ok(true)
    }

    /// Terminal transition to COMPLETED
    pub fn complete(&mut self) -> Result<(), StateError> {
        self.update(JobRecord::complete)
    }

    /// Terminal transition to FAILED, retaining committed progress
    pub fn fail(&mut self, summary: &str) -> Result<(), StateError> {
        self.update(|job| job.fail(summary))
    }

    /// Mutate the record and notify watchers; the record is left untouched
    /// when the mutation is invalid
    fn update(
        &self,
        f: impl FnOnce(&mut JobRecord) -> Result<(), StateError>,
    ) -> Result<(), StateError> {
        let mut result = Ok(());
        self.tx.send_modify(|job| result = f(job));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::job::JobStatus;
    use crate::ingest::record::RecordDraft;
    use crate::ingest::validator;

    fn outcome(succeeded: usize, failed: usize) -> ChunkOutcome {
        let mut result = ChunkOutcome::default();
        for i in 0..succeeded {
            let draft = RecordDraft::minimal(&format!("S{i}"), "s@example.com", "10");
            result.succeeded.push(validator::validate(i, &draft).unwrap());
        }
        for i in 0..failed {
            let err = validator::validate(succeeded + i, &RecordDraft::default()).unwrap_err();
            result
                .failed
                .push(crate::ingest::chunk::RecordFailure::Validation(err));
        }
        result
    }

    #[test]
    fn test_snapshot_follows_writer() {
        let (mut tracker, rx) = ProgressTracker::new(JobRecord::new(200));
        assert_eq!(rx.borrow().status, JobStatus::Pending);

        tracker.begin_processing().unwrap();
        assert_eq!(rx.borrow().status, JobStatus::Processing);

        tracker.apply_chunk(0, &outcome(100, 0)).unwrap();
        assert_eq!(rx.borrow().processed_records, 100);
        assert_eq!(rx.borrow().progress_percentage(), 50);
    }

    #[test]
    fn test_apply_chunk_counts_failures_as_processed() {
        let (mut tracker, _rx) = ProgressTracker::new(JobRecord::new(100));
        tracker.begin_processing().unwrap();

        tracker.apply_chunk(0, &outcome(80, 20)).unwrap();

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.processed_records, 100);
        assert_eq!(snapshot.failed_records, 20);
    }

    #[test]
    fn test_redelivered_chunk_is_ignored() {
        let (mut tracker, _rx) = ProgressTracker::new(JobRecord::new(300));
        tracker.begin_processing().unwrap();

        assert!(tracker.apply_chunk(0, &outcome(100, 0)).unwrap());
        assert!(tracker.apply_chunk(1, &outcome(100, 5)).unwrap());

        // Redelivery of an already-committed chunk changes nothing
        assert!(!tracker.apply_chunk(0, &outcome(100, 0)).unwrap());
        assert!(!tracker.apply_chunk(1, &outcome(100, 5)).unwrap());

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.processed_records, 200);
        assert_eq!(snapshot.failed_records, 5);
        assert_eq!(tracker.chunks_committed(), 2);
    }

    #[test]
    fn test_failed_update_leaves_record_untouched() {
        let (mut tracker, _rx) = ProgressTracker::new(JobRecord::new(100));
        tracker.begin_processing().unwrap();
        tracker.apply_chunk(0, &outcome(100, 0)).unwrap();

        // Folding another chunk would overflow total_records
        assert!(tracker.apply_chunk(1, &outcome(1, 0)).is_err());
        assert_eq!(tracker.snapshot().processed_records, 100);
    }

    #[test]
    fn test_complete_and_fail_are_terminal() {
        let (mut tracker, _rx) = ProgressTracker::new(JobRecord::new(100));
        tracker.begin_processing().unwrap();
        tracker.apply_chunk(0, &outcome(100, 0)).unwrap();
        tracker.complete().unwrap();

        assert_eq!(tracker.snapshot().status, JobStatus::Completed);
        assert!(tracker.fail("too late").is_err());
    }
}
