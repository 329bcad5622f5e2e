//! Error types for airwatch-store.

use std::path::PathBuf;

/// Result type for airwatch-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in airwatch-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A write could not be turned into a complete record.
    #[error(transparent)]
    Invalid(#[from] airwatch_types::ParseError),

    /// The database was written by a newer release.
    #[error("Unsupported schema version {found} (this build supports up to {supported})")]
    UnsupportedSchema { found: i32, supported: i32 },

    /// Invalid timestamp.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
