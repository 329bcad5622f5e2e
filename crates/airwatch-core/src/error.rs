//! Error types for airwatch-core.
//!
//! # Error Classes
//!
//! | Error Type | Retry? | Typical cause |
//! |------------|--------|---------------|
//! | [`Error::Validation`] | Never | Caller sent malformed input |
//! | [`Error::Transport`] | Caller's choice | Store or model unreachable |
//! | [`Error::Schema`] | No | Model replied with JSON that violates the output schema |
//! | [`Error::NotFound`] | No | Unknown device |
//! | [`Error::IncompleteDevice`] | No | Partial write for a device that does not exist |
//! | [`Error::NotConfigured`] | No | Forecast model has no API key |
//! | [`Error::Closed`] | No | Store was closed |
//!
//! Nothing in this crate retries on its own.

use airwatch_types::{FieldError, ParseError};

/// Result type alias using airwatch-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in device synchronization and forecasting.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Input failed validation; every offending field is listed.
    #[error("Validation failed: {}", format_fields(.0))]
    Validation(Vec<FieldError>),

    /// The store or the model could not be reached.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An external response was well-formed but violated the expected schema.
    #[error("Schema error: {0}")]
    Schema(String),

    /// The requested device does not exist.
    #[error("Device not found: {0}")]
    NotFound(String),

    /// A write would create a device without every required field.
    #[error("Device {id} does not exist and the write is missing: {}", .missing.join(", "))]
    IncompleteDevice {
        id: String,
        missing: Vec<&'static str>,
    },

    /// A required external service is not configured.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// The store has been closed.
    #[error("Store is closed")]
    Closed,
}

impl Error {
    /// Create a validation error for a single field.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation(vec![FieldError::new(field, message)])
    }
}

fn format_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::IncompleteDevice { id, missing } => Error::IncompleteDevice { id, missing },
            ParseError::Invalid(fields) => Error::Validation(fields),
            other => Error::Schema(other.to_string()),
        }
    }
}

impl From<airwatch_store::Error> for Error {
    fn from(err: airwatch_store::Error) -> Self {
        match err {
            airwatch_store::Error::Invalid(parse) => parse.into(),
            other => Error::Transport(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs may carry credentials
        Error::Transport(err.without_url().to_string())
    }
}
