//! Ingestion queries

pub mod get_status;

pub use get_status::{GetStatusQuery, JobStatusResponse};
