//! Platform-agnostic types for AirWatch CO monitoring.
//!
//! This crate provides the shared data model used by the store, the
//! synchronization core and the HTTP service.
//!
//! # Features
//!
//! - Sensor device records and merge-write patches
//! - Alert rule configuration records
//! - Trend points, status summaries and battery classification
//! - Field-level validation errors
//!
//! # Example
//!
//! ```
//! use airwatch_types::{DevicePatch, DeviceStatus};
//!
//! let patch = DevicePatch::new("SN-002").status(DeviceStatus::Warning).co_level(12.0);
//! assert!(patch.validate().is_empty());
//! ```

pub mod error;
pub mod types;

pub use error::{FieldError, ParseError, ParseResult};
pub use types::{
    AlertRule, BatteryLevel, DevicePatch, DeviceStatus, DeviceSummary, HistoricalPoint, Location,
    LocationPatch, MAX_BATTERY, OverallStatus, SensorDevice,
};
