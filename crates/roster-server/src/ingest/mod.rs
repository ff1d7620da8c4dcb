//! Asynchronous bulk ingestion core
//!
//! Accepts bulk roster submissions, processes them in chunks on a bounded
//! worker pool, and exposes real-time progress until completion or failure.
//!
//! # Architecture
//!
//! - **config**: Processing knobs (`INGEST_*` environment variables)
//! - **record**: Submission drafts and normalized records
//! - **validator**: Pure per-record schema checks
//! - **job**: Job record and its state machine
//! - **chunk**: Chunk splitting and the chunk processor
//! - **retry**: Exponential backoff policy for transient chunk failures
//! - **progress**: Single-writer progress tracking with snapshot reads
//! - **gateway**: Persistence seam (PostgreSQL and in-memory bindings)
//! - **dependency**: Rate-limited external call seam (fixed-latency default)
//! - **scheduler**: Admission gate, worker pool, and job execution
//!
//! The public API endpoints live in `features::ingestion`:
//! - `POST /api/v1/ingest` - Submit a batch
//! - `GET /api/v1/ingest/:job_id/status` - Job status snapshot

pub mod chunk;
pub mod config;
pub mod dependency;
pub mod gateway;
pub mod job;
pub mod progress;
pub mod record;
pub mod retry;
pub mod scheduler;
pub mod validator;

pub use chunk::{Chunk, ChunkOutcome, ChunkProcessor, CHUNK_SIZE};
pub use config::IngestConfig;
pub use dependency::{ExternalDependency, FixedLatency};
pub use gateway::{MemoryGateway, PersistenceGateway, PostgresGateway};
pub use job::{JobRecord, JobStatus};
pub use record::{RecordDraft, ValidRecord};
pub use scheduler::{JobScheduler, StatusError, SubmitError};
