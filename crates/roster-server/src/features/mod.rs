//! Feature modules implementing the roster API
//!
//! Each feature is a vertical slice with its own commands, queries, and
//! routes, following the CQRS pattern:
//!
//! - `commands/` - Write operations (submit a batch)
//! - `queries/` - Read operations (job status)
//! - `routes.rs` - HTTP route definitions
//!
//! Commands and queries implement the mediator request marker, keeping
//! handlers free of HTTP concerns and easy to test directly.

pub mod ingestion;

use axum::Router;
use std::sync::Arc;

use crate::ingest::JobScheduler;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// Scheduler driving the asynchronous ingestion core
    pub scheduler: Arc<JobScheduler>,
}

/// Creates the main API router with all feature routes mounted
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().merge(ingestion::ingestion_routes().with_state(state.scheduler))
}
