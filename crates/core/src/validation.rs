//! Patient identifier validation.
//!
//! Identifier semantics belong to the matching service; the client only
//! rejects input that would make the request meaningless.

use crate::error::ValidationError;

/// Trims surrounding whitespace and rejects an empty result.
///
/// Internal whitespace is preserved and no format is imposed, so
/// `"  PATIENT 001 "` yields `"PATIENT 001"`.
pub fn validate_patient_id(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyIdentifier);
    }
    Ok(trimmed.to_string())
}
