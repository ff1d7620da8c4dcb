//! Ingestion commands

pub mod submit;

pub use submit::{SubmitBatchCommand, SubmitBatchResponse};
