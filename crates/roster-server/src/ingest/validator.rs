//! Record validation
//!
//! Pure, synchronous schema checks for roster records. Every violation found
//! on a record is collected into a single [`RecordError`] so callers see the
//! full picture in one pass; malformed input is a normal outcome, never a
//! panic.

use chrono::Utc;
use thiserror::Error;

use super::record::{RecordDraft, ValidRecord};

/// Maximum length for student identifiers
pub const MAX_STUDENT_ID_LEN: usize = 50;
/// Maximum length for first and last names
pub const MAX_NAME_LEN: usize = 100;
/// Maximum length for email addresses
pub const MAX_EMAIL_LEN: usize = 255;
/// Maximum length for phone numbers
pub const MAX_PHONE_LEN: usize = 20;
/// Maximum length for section labels
pub const MAX_SECTION_LEN: usize = 10;
/// Maximum length for roll numbers
pub const MAX_ROLL_NUMBER_LEN: usize = 50;
/// Maximum length for city, state, and country fields
pub const MAX_LOCALITY_LEN: usize = 100;
/// Maximum length for postal codes
pub const MAX_POSTAL_CODE_LEN: usize = 20;

/// Default country applied when the submission omits one
pub const DEFAULT_COUNTRY: &str = "India";

/// Accepted grade values
pub const VALID_GRADES: &[&str] = &[
    "Nursery", "LKG", "UKG", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12",
];

/// A single schema violation on one field
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldViolation {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("email is not a valid address")]
    InvalidEmail,

    #[error("date_of_birth cannot be in the future")]
    DateOfBirthInFuture,

    #[error("invalid grade: {value}")]
    InvalidGrade { value: String },
}

/// All violations found on a single record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    /// Position of the offending record in the original submission
    pub index: usize,
    pub violations: Vec<FieldViolation>,
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let details: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        write!(f, "record {}: {}", self.index, details.join("; "))
    }
}

impl std::error::Error for RecordError {}

/// Validate one draft against the roster schema
///
/// Returns the normalized record, or a single error enumerating every
/// violation found.
pub fn validate(index: usize, draft: &RecordDraft) -> Result<ValidRecord, RecordError> {
    let mut violations = Vec::new();

    let student_id = required(
        &draft.student_id,
        "student_id",
        MAX_STUDENT_ID_LEN,
        &mut violations,
    );
    let first_name = required(&draft.first_name, "first_name", MAX_NAME_LEN, &mut violations);
    let last_name = required(&draft.last_name, "last_name", MAX_NAME_LEN, &mut violations);

    let email = required(&draft.email, "email", MAX_EMAIL_LEN, &mut violations);
    if let Some(ref email) = email {
        if !is_valid_email(email) {
            violations.push(FieldViolation::InvalidEmail);
        }
    }

    let grade = required(&draft.grade, "grade", MAX_NAME_LEN, &mut violations);
    if let Some(ref grade) = grade {
        if !VALID_GRADES.contains(&grade.as_str()) {
            violations.push(FieldViolation::InvalidGrade {
                value: grade.clone(),
            });
        }
    }

    if let Some(dob) = draft.date_of_birth {
        if dob > Utc::now().date_naive() {
            violations.push(FieldViolation::DateOfBirthInFuture);
        }
    }

    let phone = optional(&draft.phone, "phone", MAX_PHONE_LEN, &mut violations);
    let section = optional(&draft.section, "section", MAX_SECTION_LEN, &mut violations);
    let roll_number = optional(
        &draft.roll_number,
        "roll_number",
        MAX_ROLL_NUMBER_LEN,
        &mut violations,
    );
    let city = optional(&draft.city, "city", MAX_LOCALITY_LEN, &mut violations);
    let state = optional(&draft.state, "state", MAX_LOCALITY_LEN, &mut violations);
    let postal_code = optional(
        &draft.postal_code,
        "postal_code",
        MAX_POSTAL_CODE_LEN,
        &mut violations,
    );
    let country = optional(&draft.country, "country", MAX_LOCALITY_LEN, &mut violations);

    if !violations.is_empty() {
        return Err(RecordError { index, violations });
    }

    // Required fields are all Some here: a None pushed a Missing violation above
    Ok(ValidRecord {
        index,
        student_id: student_id.unwrap_or_default(),
        first_name: first_name.unwrap_or_default(),
        last_name: last_name.unwrap_or_default(),
        email: email.unwrap_or_default(),
        phone: phone.unwrap_or_default(),
        date_of_birth: draft.date_of_birth,
        grade: grade.unwrap_or_default(),
        section: section.unwrap_or_default(),
        roll_number: roll_number.unwrap_or_default(),
        address: draft.address.clone().unwrap_or_default(),
        city: city.unwrap_or_default(),
        state: state.unwrap_or_default(),
        postal_code: postal_code.unwrap_or_default(),
        country: country.unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
    })
}

/// Check a required field: present, non-blank, within the length limit
fn required(
    value: &Option<String>,
    field: &'static str,
    max: usize,
    violations: &mut Vec<FieldViolation>,
) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => {
            if v.len() > max {
                violations.push(FieldViolation::TooLong { field, max });
            }
            Some(v.trim().to_string())
        }
        _ => {
            violations.push(FieldViolation::Missing { field });
            None
        }
    }
}

/// Check an optional field: only the length limit applies
fn optional(
    value: &Option<String>,
    field: &'static str,
    max: usize,
    violations: &mut Vec<FieldViolation>,
) -> Option<String> {
    if let Some(v) = value {
        if v.len() > max {
            violations.push(FieldViolation::TooLong { field, max });
        }
    }
    value.clone()
}

/// Basic well-formedness check for an email address
#[inline]
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();

    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.contains('@')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn valid_draft() -> RecordDraft {
        RecordDraft {
            student_id: Some("STU001".to_string()),
            first_name: Some("Asha".to_string()),
            last_name: Some("Verma".to_string()),
            email: Some("asha.verma@example.com".to_string()),
            grade: Some("10".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_well_formed_record() {
        let record = validate(0, &valid_draft()).unwrap();

        assert_eq!(record.index, 0);
        assert_eq!(record.student_id, "STU001");
        assert_eq!(record.email, "asha.verma@example.com");
        assert_eq!(record.country, DEFAULT_COUNTRY);
    }

    #[test]
    fn test_validate_preserves_optional_fields() {
        let mut draft = valid_draft();
        draft.section = Some("B".to_string());
        draft.country = Some("Nepal".to_string());
        draft.date_of_birth = NaiveDate::from_ymd_opt(2010, 4, 12);

        let record = validate(3, &draft).unwrap();
        assert_eq!(record.section, "B");
        assert_eq!(record.country, "Nepal");
        assert_eq!(record.date_of_birth, NaiveDate::from_ymd_opt(2010, 4, 12));
    }

    #[test]
    fn test_validate_missing_required_fields_collapse_into_one_error() {
        let err = validate(7, &RecordDraft::default()).unwrap_err();

        assert_eq!(err.index, 7);
        // student_id, first_name, last_name, email, grade
        assert_eq!(err.violations.len(), 5);
        assert!(err
            .violations
            .contains(&FieldViolation::Missing { field: "student_id" }));
        assert!(err
            .violations
            .contains(&FieldViolation::Missing { field: "grade" }));
    }

    #[test]
    fn test_validate_blank_required_field_is_missing() {
        let mut draft = valid_draft();
        draft.first_name = Some("   ".to_string());

        let err = validate(0, &draft).unwrap_err();
        assert_eq!(
            err.violations,
            vec![FieldViolation::Missing { field: "first_name" }]
        );
    }

    #[test]
    fn test_validate_invalid_email() {
        let mut draft = valid_draft();
        draft.email = Some("not-an-address".to_string());

        let err = validate(0, &draft).unwrap_err();
        assert_eq!(err.violations, vec![FieldViolation::InvalidEmail]);
    }

    #[test]
    fn test_validate_future_date_of_birth() {
        let mut draft = valid_draft();
        draft.date_of_birth = Some(Utc::now().date_naive() + chrono::Duration::days(30));

        let err = validate(0, &draft).unwrap_err();
        assert_eq!(err.violations, vec![FieldViolation::DateOfBirthInFuture]);
    }

    #[test]
    fn test_validate_invalid_grade() {
        let mut draft = valid_draft();
        draft.grade = Some("13".to_string());

        let err = validate(0, &draft).unwrap_err();
        assert_eq!(
            err.violations,
            vec![FieldViolation::InvalidGrade {
                value: "13".to_string()
            }]
        );
    }

    #[test]
    fn test_validate_too_long_field() {
        let mut draft = valid_draft();
        draft.student_id = Some("x".repeat(MAX_STUDENT_ID_LEN + 1));

        let err = validate(0, &draft).unwrap_err();
        assert_eq!(
            err.violations,
            vec![FieldViolation::TooLong {
                field: "student_id",
                max: MAX_STUDENT_ID_LEN
            }]
        );
    }

    #[test]
    fn test_validate_multiple_violations_on_one_record() {
        let mut draft = valid_draft();
        draft.email = Some("bad".to_string());
        draft.grade = Some("college".to_string());
        draft.phone = Some("9".repeat(MAX_PHONE_LEN + 1));

        let err = validate(0, &draft).unwrap_err();
        assert_eq!(err.violations.len(), 3);
    }

    #[test]
    fn test_record_error_display_lists_all_violations() {
        let err = validate(2, &RecordDraft::default()).unwrap_err();
        let rendered = err.to_string();

        assert!(rendered.starts_with("record 2:"));
        assert!(rendered.contains("student_id is required"));
        assert!(rendered.contains("email is required"));
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("a@example.com"));
        assert!(is_valid_email("first.last@sub.example.org"));
        assert!(!is_valid_email("missing-at.example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("user@.com"));
        assert!(!is_valid_email("two words@example.com"));
    }
}
