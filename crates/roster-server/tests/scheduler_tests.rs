//! End-to-end scheduler scenarios
//!
//! Drives the scheduler against the in-memory gateway with the tokio clock
//! paused, so the fixed dependency delay and the backoff schedule are exact.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use roster_server::ingest::{
    dependency::DependencyError, gateway::GatewayError, ExternalDependency, FixedLatency,
    IngestConfig, JobRecord, JobScheduler, JobStatus, MemoryGateway, RecordDraft,
};

const DEPENDENCY_DELAY: Duration = Duration::from_millis(500);

fn test_config() -> IngestConfig {
    IngestConfig {
        dependency_delay_ms: 500,
        retry_base_delay_ms: 1000,
        retry_max_delay_ms: 30_000,
        ..Default::default()
    }
}

fn scheduler_over(config: IngestConfig, gateway: Arc<MemoryGateway>) -> Arc<JobScheduler> {
    JobScheduler::new(
        config,
        gateway,
        Arc::new(FixedLatency::new(DEPENDENCY_DELAY)),
    )
}

fn well_formed(count: usize) -> Vec<RecordDraft> {
    (0..count)
        .map(|i| {
            RecordDraft::minimal(&format!("STU{i:04}"), &format!("s{i}@example.com"), "10")
        })
        .collect()
}

/// Await a job's terminal snapshot
async fn wait_terminal(scheduler: &Arc<JobScheduler>, job_id: Uuid) -> JobRecord {
    let mut rx = scheduler.subscribe(job_id).expect("job is registered");
    let snapshot = rx
        .wait_for(|job| job.status.is_terminal())
        .await
        .expect("worker keeps the watch alive until terminal")
        .clone();
    snapshot
}

#[tokio::test(start_paused = true)]
async fn test_thousand_well_formed_records_complete() {
    let gateway = Arc::new(MemoryGateway::new());
    let scheduler = scheduler_over(test_config(), gateway.clone());

    let job_id = scheduler.submit(well_formed(1000)).unwrap();
    let job = wait_terminal(&scheduler, job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_records, 1000);
    assert_eq!(job.failed_records, 0);
    assert_eq!(job.progress_percentage(), 100);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    assert!(job.error_summary.is_none());

    // Every record persisted, and the terminal snapshot written through
    assert_eq!(gateway.row_count(job_id), 1000);
    let durable = gateway.job(job_id).unwrap();
    assert_eq!(durable.status, JobStatus::Completed);
    assert_eq!(durable.processed_records, 1000);
}

#[tokio::test(start_paused = true)]
async fn test_snapshots_stay_consistent_while_processing() {
    let gateway = Arc::new(MemoryGateway::new());
    let scheduler = scheduler_over(test_config(), gateway);

    let job_id = scheduler.submit(well_formed(1000)).unwrap();

    let mut last_processed = 0;
    let mut last_progress = 0;
    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let job = scheduler.get_status(job_id).unwrap();

        // Counters only ever grow, and the ordering invariant always holds
        assert!(job.failed_records <= job.processed_records);
        assert!(job.processed_records <= job.total_records);
        assert!(job.processed_records >= last_processed);
        assert!(job.progress_percentage() >= last_progress);
        last_processed = job.processed_records;
        last_progress = job.progress_percentage();

        if job.status.is_terminal() {
            assert_eq!(job.status, JobStatus::Completed);
            assert_eq!(job.processed_records, 1000);
            break;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_malformed_records_count_as_failed_not_fatal() {
    let gateway = Arc::new(MemoryGateway::new());
    let scheduler = scheduler_over(test_config(), gateway.clone());

    // Records 500-599 are malformed: missing email and an invalid grade
    let mut batch = well_formed(1000);
    for draft in &mut batch[500..600] {
        draft.email = None;
        draft.grade = Some("college".to_string());
    }

    let job_id = scheduler.submit(batch).unwrap();
    let job = wait_terminal(&scheduler, job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_records, 1000);
    assert_eq!(job.failed_records, 100);
    assert_eq!(job.progress_percentage(), 100);
    assert!(job.error_summary.is_none());

    assert_eq!(gateway.row_count(job_id), 900);
    assert_eq!(gateway.failure_count(job_id), 100);
}

#[tokio::test(start_paused = true)]
async fn test_oversized_batch_creates_no_job() {
    let gateway = Arc::new(MemoryGateway::new());
    let scheduler = scheduler_over(test_config(), gateway.clone());

    let result = scheduler.submit(well_formed(1001));

    assert!(matches!(
        result,
        Err(roster_server::ingest::SubmitError::Capacity {
            got: 1001,
            max: 1000
        })
    ));
    tokio::task::yield_now().await;
    assert_eq!(gateway.job_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_chunk_failures_recover_with_backoff() {
    let gateway = Arc::new(MemoryGateway::new());
    // Chunk 2 (the third bulk write) fails twice, then succeeds
    gateway.script_bulk_outcomes([
        None,
        None,
        Some(GatewayError::Transient("store offline".to_string())),
        Some(GatewayError::Transient("store offline".to_string())),
    ]);
    let scheduler = scheduler_over(test_config(), gateway.clone());

    let before = tokio::time::Instant::now();
    let job_id = scheduler.submit(well_formed(300)).unwrap();
    let job = wait_terminal(&scheduler, job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_records, 300);
    assert_eq!(job.failed_records, 0);
    assert_eq!(gateway.row_count(job_id), 300);

    // Three chunk delays, two extra attempts on chunk 2, and the backoff
    // schedule in between: 500*5 + 1000 + 2000
    assert_eq!(before.elapsed(), Duration::from_millis(5500));
}

#[tokio::test(start_paused = true)]
async fn test_chunk_retry_exhaustion_fails_job_with_progress_retained() {
    let gateway = Arc::new(MemoryGateway::new());
    // Chunk 1 fails on every attempt (1 initial + 3 retries)
    gateway.script_bulk_outcomes([
        None,
        Some(GatewayError::Transient("store offline".to_string())),
        Some(GatewayError::Transient("store offline".to_string())),
        Some(GatewayError::Transient("store offline".to_string())),
        Some(GatewayError::Transient("store offline".to_string())),
    ]);
    let scheduler = scheduler_over(test_config(), gateway.clone());

    let job_id = scheduler.submit(well_formed(300)).unwrap();
    let job = wait_terminal(&scheduler, job_id).await;

    assert_eq!(job.status, JobStatus::Failed);
    let summary = job.error_summary.as_deref().unwrap();
    assert!(summary.contains("chunk 1"));
    assert!(summary.contains("after 3 retries"));

    // Progress frozen at the last committed chunk; chunk 0 stays committed
    assert_eq!(job.processed_records, 100);
    assert_eq!(job.failed_records, 0);
    assert_eq!(gateway.row_count(job_id), 100);

    let durable = gateway.job(job_id).unwrap();
    assert_eq!(durable.status, JobStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_gateway_error_fails_job_without_retry() {
    let gateway = Arc::new(MemoryGateway::new());
    gateway.script_bulk_outcomes([Some(GatewayError::Fatal(
        "relation does not exist".to_string(),
    ))]);
    let scheduler = scheduler_over(test_config(), gateway.clone());

    let before = tokio::time::Instant::now();
    let job_id = scheduler.submit(well_formed(100)).unwrap();
    let job = wait_terminal(&scheduler, job_id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.processed_records, 0);
    assert!(job
        .error_summary
        .as_deref()
        .unwrap()
        .contains("relation does not exist"));

    // One dependency call, no backoff sleeps
    assert_eq!(before.elapsed(), DEPENDENCY_DELAY);
}

#[tokio::test(start_paused = true)]
async fn test_partial_row_rejection_does_not_fail_job() {
    let gateway = Arc::new(MemoryGateway::new());
    gateway.reject_student_ids(["STU0042".to_string()]);
    let scheduler = scheduler_over(test_config(), gateway.clone());

    let job_id = scheduler.submit(well_formed(100)).unwrap();
    let job = wait_terminal(&scheduler, job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_records, 100);
    assert_eq!(job.failed_records, 1);
    assert_eq!(gateway.row_count(job_id), 99);
    assert_eq!(gateway.failure_count(job_id), 1);
}

#[tokio::test(start_paused = true)]
async fn test_whole_job_retry_on_transient_create_failure() {
    let gateway = Arc::new(MemoryGateway::new());
    gateway.script_create_outcomes([
        Some(GatewayError::Transient("store offline".to_string())),
        Some(GatewayError::Transient("store offline".to_string())),
    ]);
    let scheduler = scheduler_over(test_config(), gateway.clone());

    let job_id = scheduler.submit(well_formed(100)).unwrap();
    let job = wait_terminal(&scheduler, job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.retry_count, 2);
    assert_eq!(job.processed_records, 100);
    assert_eq!(gateway.row_count(job_id), 100);
}

#[tokio::test(start_paused = true)]
async fn test_whole_job_retries_exhaust_before_processing() {
    let gateway = Arc::new(MemoryGateway::new());
    gateway.script_create_outcomes(
        std::iter::repeat_with(|| Some(GatewayError::Transient("store offline".to_string())))
            .take(4),
    );
    let scheduler = scheduler_over(test_config(), gateway.clone());

    let job_id = scheduler.submit(well_formed(100)).unwrap();
    let job = wait_terminal(&scheduler, job_id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 3);
    assert_eq!(job.processed_records, 0);
    assert!(job
        .error_summary
        .as_deref()
        .unwrap()
        .contains("job retries exhausted"));
    assert_eq!(gateway.row_count(job_id), 0);
}

/// Dependency wrapper that records how many chunks are in flight at once
struct GaugedDependency {
    delay: Duration,
    current: AtomicUsize,
    max_seen: AtomicUsize,
}

impl GaugedDependency {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            current: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ExternalDependency for GaugedDependency {
    async fn call(&self, _records: usize) -> Result<(), DependencyError> {
        let in_flight = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(in_flight, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_pool_size_bounds_concurrent_processing() {
    let gateway = Arc::new(MemoryGateway::new());
    let dependency = Arc::new(GaugedDependency::new(DEPENDENCY_DELAY));
    let config = IngestConfig {
        pool_size: 2,
        ..test_config()
    };
    let scheduler = JobScheduler::new(config, gateway, dependency.clone());

    let job_ids: Vec<Uuid> = (0..6)
        .map(|_| scheduler.submit(well_formed(200)).unwrap())
        .collect();

    // Sample the registry while the fleet drains
    let mut max_processing = 0;
    loop {
        tokio::time::sleep(Duration::from_millis(50)).await;
        max_processing = max_processing.max(scheduler.processing_count());

        let all_terminal = job_ids
            .iter()
            .all(|id| scheduler.get_status(*id).unwrap().status.is_terminal());
        if all_terminal {
            break;
        }
    }

    assert!(max_processing <= 2, "observed {max_processing} jobs PROCESSING");
    assert!(dependency.max_seen.load(Ordering::SeqCst) <= 2);

    for id in job_ids {
        let job = scheduler.get_status(id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed_records, 200);
    }
}
