//! Ingestion configuration
//!
//! Knobs for the job processing core, loaded from `INGEST_*` environment
//! variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::retry::RetryPolicy;

/// Default worker pool size (jobs in PROCESSING concurrently)
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Default backlog limit before submissions are shed
pub const DEFAULT_BACKLOG_LIMIT: usize = 50;

/// Default maximum records per submission
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Default records per chunk
pub const DEFAULT_CHUNK_SIZE: usize = super::chunk::CHUNK_SIZE;

/// Default simulated external-dependency delay per chunk, in milliseconds
pub const DEFAULT_DEPENDENCY_DELAY_MS: u64 = 500;

/// Default retries per chunk before the job fails
pub const DEFAULT_MAX_CHUNK_RETRIES: u32 = 3;

/// Default base backoff delay in milliseconds
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Default backoff cap in milliseconds
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Default whole-job retries for infrastructure failures before any chunk
pub const DEFAULT_MAX_JOB_RETRIES: u32 = 3;

/// Job processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Jobs allowed in PROCESSING concurrently
    pub pool_size: usize,
    /// Jobs allowed to wait for a worker slot before submissions are shed
    pub backlog_limit: usize,
    /// Maximum records per submission
    pub max_batch_size: usize,
    /// Records per chunk; one external call is made per chunk
    pub chunk_size: usize,
    /// Simulated external-dependency delay per chunk, in milliseconds
    pub dependency_delay_ms: u64,
    /// Retries per chunk before the whole job fails
    pub max_chunk_retries: u32,
    /// Base backoff delay in milliseconds
    pub retry_base_delay_ms: u64,
    /// Backoff cap in milliseconds
    pub retry_max_delay_ms: u64,
    /// Whole-job retries for infrastructure failures before any chunk starts
    pub max_job_retries: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            backlog_limit: DEFAULT_BACKLOG_LIMIT,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            dependency_delay_ms: DEFAULT_DEPENDENCY_DELAY_MS,
            max_chunk_retries: DEFAULT_MAX_CHUNK_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            max_job_retries: DEFAULT_MAX_JOB_RETRIES,
        }
    }
}

impl IngestConfig {
    /// Load configuration from `INGEST_*` environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let config = Self {
            pool_size: env_parse("INGEST_POOL_SIZE", defaults.pool_size),
            backlog_limit: env_parse("INGEST_BACKLOG_LIMIT", defaults.backlog_limit),
            max_batch_size: env_parse("INGEST_MAX_BATCH_SIZE", defaults.max_batch_size),
            chunk_size: env_parse("INGEST_CHUNK_SIZE", defaults.chunk_size),
            dependency_delay_ms: env_parse(
                "INGEST_DEPENDENCY_DELAY_MS",
                defaults.dependency_delay_ms,
            ),
            max_chunk_retries: env_parse("INGEST_MAX_CHUNK_RETRIES", defaults.max_chunk_retries),
            retry_base_delay_ms: env_parse(
                "INGEST_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay_ms,
            ),
            retry_max_delay_ms: env_parse(
                "INGEST_RETRY_MAX_DELAY_MS",
                defaults.retry_max_delay_ms,
            ),
            max_job_retries: env_parse("INGEST_MAX_JOB_RETRIES", defaults.max_job_retries),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pool_size == 0 {
            anyhow::bail!("INGEST_POOL_SIZE must be greater than 0");
        }
        if self.chunk_size == 0 {
            anyhow::bail!("INGEST_CHUNK_SIZE must be greater than 0");
        }
        if self.max_batch_size == 0 {
            anyhow::bail!("INGEST_MAX_BATCH_SIZE must be greater than 0");
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            anyhow::bail!(
                "INGEST_RETRY_BASE_DELAY_MS ({}) cannot exceed INGEST_RETRY_MAX_DELAY_MS ({})",
                self.retry_base_delay_ms,
                self.retry_max_delay_ms
            );
        }
        Ok(())
    }

    /// Simulated dependency delay as a Duration
    pub fn dependency_delay(&self) -> Duration {
        Duration::from_millis(self.dependency_delay_ms)
    }

    /// Chunk retry policy derived from the delay knobs
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_chunk_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
