//! Persistence gateway
//!
//! Seam between the job core and the durable store. The core only depends on
//! the [`PersistenceGateway`] trait; bindings are provided for PostgreSQL and
//! for an in-memory store used by tests and local runs.
//!
//! Writes are conflict-free: re-delivering an already-committed chunk must
//! not change the persisted row count, so inserts are keyed on identifiers
//! that repeat across deliveries.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

use super::chunk::RecordFailure;
use super::job::JobRecord;
use super::record::ValidRecord;

/// Whole-call gateway failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Worth retrying: the store was briefly unavailable
    #[error("transient persistence failure: {0}")]
    Transient(String),

    /// Not worth retrying: the store rejected the operation outright
    #[error("fatal persistence failure: {0}")]
    Fatal(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

/// One row the store refused while its siblings went through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRejection {
    /// Position of the row in the original submission
    pub index: usize,
    pub reason: String,
}

/// Per-row outcome of a bulk write
///
/// Every input row lands in exactly one of `stored` or `rejected`.
#[derive(Debug, Clone, Default)]
pub struct PersistReport {
    /// Submission indices of rows that are durably stored
    pub stored: Vec<usize>,
    pub rejected: Vec<RowRejection>,
}

/// Durable store for job records and validated rows
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Create the durable job record; idempotent under re-delivery
    async fn create_job(&self, job: &JobRecord) -> Result<(), GatewayError>;

    /// Write the current job snapshot
    async fn update_job(&self, job: &JobRecord) -> Result<(), GatewayError>;

    /// Bulk-write validated rows; per-row outcomes are independent
    async fn bulk_persist(
        &self,
        job_id: Uuid,
        records: &[ValidRecord],
    ) -> Result<PersistReport, GatewayError>;

    /// Retain per-record failures for later inspection; idempotent
    async fn record_failures(
        &self,
        job_id: Uuid,
        failures: &[RecordFailure],
    ) -> Result<(), GatewayError>;
}

// ============================================================================
// PostgreSQL gateway
// ============================================================================

/// PostgreSQL-backed gateway
///
/// Uses runtime-bound queries against the tables created by the workspace
/// migrations. Row inserts are `ON CONFLICT DO NOTHING` so chunk re-delivery
/// never double-counts.
pub struct PostgresGateway {
    pool: PgPool,
}

impl PostgresGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Classify a sqlx error: connection-level trouble is transient, anything
/// else is fatal
fn map_sqlx(e: sqlx::Error) -> GatewayError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => GatewayError::Transient(e.to_string()),
        other => GatewayError::Fatal(other.to_string()),
    }
}

#[async_trait]
impl PersistenceGateway for PostgresGateway {
    async fn create_job(&self, job: &JobRecord) -> Result<(), GatewayError> {
        sqlx::query(
            r#"
            INSERT INTO ingestion_jobs (
                id, status, total_records, processed_records, failed_records,
                error_summary, retry_count, created_at, started_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.total_records as i64)
        .bind(job.processed_records as i64)
        .bind(job.failed_records as i64)
        .bind(job.error_summary.as_deref())
        .bind(job.retry_count as i32)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn update_job(&self, job: &JobRecord) -> Result<(), GatewayError> {
        sqlx::query(
            r#"
            UPDATE ingestion_jobs
            SET status = $2,
                processed_records = $3,
                failed_records = $4,
                error_summary = $5,
                retry_count = $6,
                started_at = $7,
                completed_at = $8
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.processed_records as i64)
        .bind(job.failed_records as i64)
        .bind(job.error_summary.as_deref())
        .bind(job.retry_count as i32)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn bulk_persist(
        &self,
        job_id: Uuid,
        records: &[ValidRecord],
    ) -> Result<PersistReport, GatewayError> {
        let mut report = PersistReport::default();

        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO roster_records (
                    job_id, record_index, student_id, first_name, last_name,
                    email, phone, date_of_birth, grade, section, roll_number,
                    address, city, state, postal_code, country
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                ON CONFLICT (job_id, student_id) DO NOTHING
                "#,
            )
            .bind(job_id)
            .bind(record.index as i64)
            .bind(&record.student_id)
            .bind(&record.first_name)
            .bind(&record.last_name)
            .bind(&record.email)
            .bind(&record.phone)
            .bind(record.date_of_birth)
            .bind(&record.grade)
            .bind(&record.section)
            .bind(&record.roll_number)
            .bind(&record.address)
            .bind(&record.city)
            .bind(&record.state)
            .bind(&record.postal_code)
            .bind(&record.country)
            .execute(&self.pool)
            .await;

            match result {
                // rows_affected 0 means the conflict target matched: the row
                // is already stored from a previous delivery
                Ok(_) => report.stored.push(record.index),
                Err(sqlx::Error::Database(db)) if db.constraint().is_some() => {
                    report.rejected.push(RowRejection {
                        index: record.index,
                        reason: db.message().to_string(),
                    });
                }
                Err(e) => return Err(map_sqlx(e)),
            }
        }

        Ok(report)
    }

    async fn record_failures(
        &self,
        job_id: Uuid,
        failures: &[RecordFailure],
    ) -> Result<(), GatewayError> {
        for failure in failures {
            sqlx::query(
                r#"
                INSERT INTO ingestion_record_errors (job_id, record_index, error_type, error_message)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (job_id, record_index) DO NOTHING
                "#,
            )
            .bind(job_id)
            .bind(failure.index() as i64)
            .bind(failure.kind())
            .bind(failure.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        }

        Ok(())
    }
}

// ============================================================================
// In-memory gateway
// ============================================================================

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<Uuid, JobRecord>,
    rows: HashMap<Uuid, BTreeMap<usize, ValidRecord>>,
    failures: HashMap<Uuid, BTreeMap<usize, String>>,
    /// Scripted outcome per `create_job` call; empty means success
    create_outcomes: VecDeque<Option<GatewayError>>,
    /// Scripted outcome per `bulk_persist` call; empty means success
    bulk_outcomes: VecDeque<Option<GatewayError>>,
    /// Rows whose student id is listed here are rejected per-row
    reject_student_ids: HashSet<String>,
}

/// In-memory gateway for tests and local development
///
/// Failure behavior is scriptable: queue one outcome per upcoming call, where
/// `None` means the call succeeds. Once a queue drains, calls succeed.
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Script outcomes for upcoming `create_job` calls
    pub fn script_create_outcomes(&self, outcomes: impl IntoIterator<Item = Option<GatewayError>>) {
        self.lock().create_outcomes.extend(outcomes);
    }

    /// Script outcomes for upcoming `bulk_persist` calls
    pub fn script_bulk_outcomes(&self, outcomes: impl IntoIterator<Item = Option<GatewayError>>) {
        self.lock().bulk_outcomes.extend(outcomes);
    }

    /// Reject rows with these student ids while storing their siblings
    pub fn reject_student_ids(&self, ids: impl IntoIterator<Item = String>) {
        self.lock().reject_student_ids.extend(ids);
    }

    /// Durable job snapshot, if one was written
    pub fn job(&self, job_id: Uuid) -> Option<JobRecord> {
        self.lock().jobs.get(&job_id).cloned()
    }

    /// Number of durable job records
    pub fn job_count(&self) -> usize {
        self.lock().jobs.len()
    }

    /// Number of rows stored for a job
    pub fn row_count(&self, job_id: Uuid) -> usize {
        self.lock().rows.get(&job_id).map_or(0, BTreeMap::len)
    }

    /// Number of per-record failures retained for a job
    pub fn failure_count(&self, job_id: Uuid) -> usize {
        self.lock().failures.get(&job_id).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn create_job(&self, job: &JobRecord) -> Result<(), GatewayError> {
        let mut state = self.lock();
        if let Some(Some(err)) = state.create_outcomes.pop_front() {
            return Err(err);
        }
        state.jobs.entry(job.id).or_insert_with(|| job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &JobRecord) -> Result<(), GatewayError> {
        self.lock().jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn bulk_persist(
        &self,
        job_id: Uuid,
        records: &[ValidRecord],
    ) -> Result<PersistReport, GatewayError> {
        let mut state = self.lock();
        if let Some(Some(err)) = state.bulk_outcomes.pop_front() {
            return Err(err);
        }

        let mut report = PersistReport::default();
        for record in records {
            if state.reject_student_ids.contains(&record.student_id) {
                report.rejected.push(RowRejection {
                    index: record.index,
                    reason: format!("storage rejected row for {}", record.student_id),
                });
                continue;
            }
            state
                .rows
                .entry(job_id)
                .or_default()
                .insert(record.index, record.clone());
            report.stored.push(record.index);
        }

        Ok(report)
    }

    async fn record_failures(
        &self,
        job_id: Uuid,
        failures: &[RecordFailure],
    ) -> Result<(), GatewayError> {
        let mut state = self.lock();
        let entry = state.failures.entry(job_id).or_default();
        for failure in failures {
            entry.entry(failure.index()).or_insert_with(|| failure.to_string());
        }
        Ok(())
    }
}
