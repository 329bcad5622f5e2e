//! Error types for data validation in airwatch-types.

use core::fmt;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Errors that can occur when building or parsing AirWatch records.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A status string did not name a known device status.
    #[error("Unknown device status: {0}")]
    UnknownStatus(String),

    /// A patch was used to create a device but lacked required fields.
    #[error("Device {id} is incomplete, missing: {}", .missing.join(", "))]
    IncompleteDevice {
        /// Device the patch targeted.
        id: String,
        /// Names of the missing fields (wire names).
        missing: Vec<&'static str>,
    },

    /// One or more fields failed validation.
    #[error("Invalid data: {}", format_field_errors(.0))]
    Invalid(Vec<FieldError>),
}

/// Result type alias using airwatch-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldError {
    /// The field path (e.g., `battery` or `location.lat`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl FieldError {
    /// Create a new field error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error_display() {
        let error = FieldError::new("battery", "must be between 0 and 100");
        assert_eq!(error.to_string(), "battery: must be between 0 and 100");
    }

    #[test]
    fn test_incomplete_device_display() {
        let error = ParseError::IncompleteDevice {
            id: "SN-009".to_string(),
            missing: vec!["name", "location"],
        };
        let display = error.to_string();
        assert!(display.contains("SN-009"));
        assert!(display.contains("name, location"));
    }

    #[test]
    fn test_invalid_display_joins_fields() {
        let error = ParseError::Invalid(vec![
            FieldError::new("battery", "too high"),
            FieldError::new("coLevel", "negative"),
        ]);
        let display = error.to_string();
        assert!(display.contains("battery: too high"));
        assert!(display.contains("coLevel: negative"));
    }
}
