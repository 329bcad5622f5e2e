//! Trait abstraction for the device store.
//!
//! [`DeviceStore`] abstracts over the SQLite-backed store and the in-memory
//! [`MockDeviceStore`](crate::MockDeviceStore) used in tests. Both are
//! constructed explicitly and closed explicitly.

use async_trait::async_trait;
use tokio::sync::watch;

use airwatch_store::SeedOutcome;
use airwatch_types::{DevicePatch, SensorDevice};

use crate::error::Result;

/// A full view of the device collection as published by a store.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// The complete device collection, ordered by ID.
    Devices(Vec<SensorDevice>),
    /// The store could not produce a snapshot.
    Failed(String),
}

/// Receiving side of a store's snapshot feed.
///
/// The first call to [`next`](Self::next) yields the current snapshot
/// immediately. Later calls wait for the next change; intermediate snapshots
/// are coalesced, so a slow consumer always receives the newest one. Returns
/// `None` once the store is closed.
#[derive(Debug)]
pub struct SnapshotWatch {
    rx: watch::Receiver<Snapshot>,
    primed: bool,
}

impl SnapshotWatch {
    /// Wrap a watch receiver.
    pub fn new(rx: watch::Receiver<Snapshot>) -> Self {
        Self { rx, primed: false }
    }

    /// Wait for the next snapshot.
    pub async fn next(&mut self) -> Option<Snapshot> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Async client for the `devices` collection.
///
/// # Example
///
/// ```
/// use airwatch_core::{DeviceStore, MockDeviceStore, Result};
///
/// async fn battery_of<S: DeviceStore>(store: &S, id: &str) -> Result<Option<u8>> {
///     Ok(store.get(id).await?.map(|d| d.battery))
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MockDeviceStore::new();
/// assert_eq!(battery_of(&store, "SN-001").await.unwrap(), None);
/// # }
/// ```
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Read the whole collection, ordered by device ID.
    async fn get_all(&self) -> Result<Vec<SensorDevice>>;

    /// Read one device.
    async fn get(&self, id: &str) -> Result<Option<SensorDevice>>;

    /// Merge-write a device.
    ///
    /// Present fields overwrite stored values (last write wins per field);
    /// absent fields are preserved. Creating a device requires every field.
    async fn upsert(&self, patch: DevicePatch) -> Result<SensorDevice>;

    /// Delete a device. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Attach to the snapshot feed.
    async fn watch(&self) -> Result<SnapshotWatch>;

    /// Write `defaults` only if the collection is empty, atomically.
    async fn seed_if_empty(&self, defaults: &[SensorDevice]) -> Result<SeedOutcome>;

    /// Close the store. Every watch ends; later operations fail with
    /// [`Error::Closed`](crate::Error::Closed).
    async fn close(&self);
}
