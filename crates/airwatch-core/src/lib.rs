//! Device synchronization, seeding and breach forecasting for AirWatch.
//!
//! This crate sits between the SQLite store and the HTTP service. It
//! provides:
//!
//! - **Device store client**: the [`DeviceStore`] trait with a watchable
//!   SQLite implementation and an in-memory mock
//! - **Seeding policy**: single-flight seed-on-empty of the default devices
//! - **Device sync**: per-subscriber snapshot streams with explicit state and
//!   cancellation
//! - **Forecasting**: input validation, prompt rendering and output schema
//!   checks around a generative model, with a Gemini client
//! - **Synthetic history**: CO trend series for demos and one-off forecasts
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use airwatch_core::{DeviceSync, SqliteDeviceStore, SyncEvent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> airwatch_core::Result<()> {
//! let store = Arc::new(SqliteDeviceStore::open_in_memory()?);
//! let sync = DeviceSync::new(store);
//!
//! let mut subscription = sync.subscribe();
//! if let Some(SyncEvent::Devices(devices)) = subscription.next().await {
//!     // An empty store is seeded with the default devices
//!     assert_eq!(devices.len(), 5);
//! }
//! subscription.unsubscribe().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod forecast;
pub mod gemini;
pub mod history;
pub mod mock;
pub mod seed;
pub mod sqlite;
pub mod sync;
pub mod traits;

pub use error::{Error, Result};
pub use forecast::{
    BreachRisk, ForecastGateway, ForecastInput, ForecastModel, ForecastOutput, PROMPT_TEMPLATE,
};
pub use gemini::GeminiModel;
pub use history::SyntheticHistory;
pub use mock::MockDeviceStore;
pub use seed::{SeedPolicy, default_devices};
pub use sqlite::SqliteDeviceStore;
pub use sync::{DeviceSubscription, DeviceSync, DeviceWatch, SyncEvent, SyncState};
pub use traits::{DeviceStore, Snapshot, SnapshotWatch};

// Re-export the shared model for convenience
pub use airwatch_store::SeedOutcome;
pub use airwatch_types::{DevicePatch, DeviceStatus, FieldError, Location, SensorDevice};
