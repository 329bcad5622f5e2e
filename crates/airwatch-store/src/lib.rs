//! Local data persistence for AirWatch sensor devices.
//!
//! This crate provides SQLite-based storage for the device collection,
//! the CO readings recorded on every write, and alert rule configuration.
//!
//! # Features
//!
//! - Merge-write device records (absent fields keep their stored values)
//! - Transactional seed-if-empty for the default device set
//! - Reading history queries by device and time range, with pagination
//! - Alert rule records
//!
//! # Example
//!
//! ```
//! use airwatch_store::Store;
//! use airwatch_types::DevicePatch;
//!
//! let store = Store::open_in_memory()?;
//! assert!(store.get_device("SN-001")?.is_none());
//!
//! // Partial writes to unknown devices are rejected
//! assert!(store.upsert_device(&DevicePatch::new("SN-001").battery(10)).is_err());
//! # Ok::<(), airwatch_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{SeedOutcome, SeedState, StoredReading};
pub use queries::ReadingQuery;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/airwatch/data.db`
/// - macOS: `~/Library/Application Support/airwatch/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\airwatch\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("airwatch")
        .join("data.db")
}
