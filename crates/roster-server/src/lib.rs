//! Roster Server Library
//!
//! HTTP service for asynchronous bulk ingestion of roster records.
//!
//! # Overview
//!
//! Submissions of up to 1,000 records are accepted in one request and
//! processed asynchronously: the scheduler admits each job into a bounded
//! worker pool, the worker runs the job chunk by chunk against a simulated
//! rate-limited upstream, and callers poll real-time progress until the job
//! reaches COMPLETED or FAILED.
//!
//! # Architecture
//!
//! - **ingest**: The job processing core (state machine, chunked execution,
//!   bounded concurrency, retry policy)
//! - **features**: Thin CQRS-style HTTP slices over the core
//! - **config** / **middleware** / **error**: Environment configuration,
//!   tower middleware, and HTTP error mapping
//!
//! ## Framework Stack
//!
//! - **Axum**: HTTP surface
//! - **Tokio**: Worker pool and timers
//! - **SQLx**: PostgreSQL persistence gateway
//!
//! # Example
//!
//! ```no_run
//! use roster_server::ingest::{
//!     FixedLatency, IngestConfig, JobScheduler, MemoryGateway, RecordDraft,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::default();
//!     let scheduler = JobScheduler::new(
//!         config.clone(),
//!         Arc::new(MemoryGateway::new()),
//!         Arc::new(FixedLatency::new(config.dependency_delay())),
//!     );
//!
//!     let job_id = scheduler.submit(vec![RecordDraft::minimal(
//!         "STU001",
//!         "asha@example.com",
//!         "10",
//!     )])?;
//!     let snapshot = scheduler.get_status(job_id)?;
//!     println!("{}: {}%", snapshot.status, snapshot.progress_percentage());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;

// Re-export commonly used types
pub use error::{AppError, ServerResult};
