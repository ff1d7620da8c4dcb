//! External dependency seam
//!
//! The chunk processor makes one rate-limited external call per chunk. The
//! call is behind a trait so the fixed-latency simulation can be swapped for
//! a real client without touching chunk control flow.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failures from the external dependency; all are transient
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("external dependency timed out after {0:?}")]
    Timeout(Duration),

    #[error("external dependency unavailable: {0}")]
    Unavailable(String),
}

/// Rate-limited external call made once per chunk
#[async_trait]
pub trait ExternalDependency: Send + Sync {
    /// Perform the per-chunk call; `records` is the chunk size, for
    /// implementations that bill by volume
    async fn call(&self, records: usize) -> Result<(), DependencyError>;
}

/// Fixed-latency simulation of the external dependency
///
/// Models one upstream API round-trip per chunk, independent of how many
/// records the chunk holds.
#[derive(Debug, Clone)]
pub struct FixedLatency {
    delay: Duration,
}

impl FixedLatency {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ExternalDependency for FixedLatency {
    async fn call(&self, _records: usize) -> Result<(), DependencyError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}
