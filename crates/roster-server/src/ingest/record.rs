//! Roster record types
//!
//! A submission arrives as a batch of drafts. Validation turns each draft
//! into a normalized record ready for persistence, or a per-record error
//! carrying every violated field.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Raw record as submitted, before validation
///
/// Required fields are optional here so a missing field is a classifiable
/// validation outcome rather than a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordDraft {
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub roll_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Record that passed validation, normalized for persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidRecord {
    /// Position of this record in the original submission
    pub index: usize,
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: Option<NaiveDate>,
    pub grade: String,
    pub section: String,
    pub roll_number: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

impl RecordDraft {
    /// Minimal well-formed draft, useful for tests and fixtures
    pub fn minimal(student_id: &str, email: &str, grade: &str) -> Self {
        Self {
            student_id: Some(student_id.to_string()),
            first_name: Some("First".to_string()),
            last_name: Some("Last".to_string()),
            email: Some(email.to_string()),
            grade: Some(grade.to_string()),
            ..Default::default()
        }
    }
}
