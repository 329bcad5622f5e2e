//! SQLite-backed [`DeviceStore`].

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use airwatch_store::{SeedOutcome, Store};
use airwatch_types::{DevicePatch, SensorDevice};

use crate::error::{Error, Result};
use crate::traits::{DeviceStore, Snapshot, SnapshotWatch};

struct Inner {
    store: Store,
    snapshots: watch::Sender<Snapshot>,
}

impl Inner {
    fn new(store: Store) -> Self {
        let initial = snapshot_of(&store);
        let (snapshots, _) = watch::channel(initial);
        Self { store, snapshots }
    }

    /// Republish the collection after a mutation.
    fn publish(&self) {
        let snapshot = snapshot_of(&self.store);
        if let Snapshot::Failed(ref err) = snapshot {
            warn!("Failed to read device snapshot: {}", err);
        }
        self.snapshots.send_replace(snapshot);
    }
}

fn snapshot_of(store: &Store) -> Snapshot {
    match store.list_devices() {
        Ok(devices) => Snapshot::Devices(devices),
        Err(e) => Snapshot::Failed(e.to_string()),
    }
}

/// A [`DeviceStore`] over a SQLite [`Store`].
///
/// Access is serialized by a mutex. Every successful mutation publishes a
/// fresh full snapshot to all watchers.
///
/// # Example
///
/// ```
/// use airwatch_core::{DeviceStore, SqliteDeviceStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> airwatch_core::Result<()> {
/// let store = SqliteDeviceStore::open_in_memory()?;
/// assert!(store.get_all().await?.is_empty());
/// store.close().await;
/// assert!(store.get_all().await.is_err());
/// # Ok(())
/// # }
/// ```
pub struct SqliteDeviceStore {
    inner: Mutex<Option<Inner>>,
}

impl std::fmt::Debug for SqliteDeviceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDeviceStore").finish_non_exhaustive()
    }
}

impl SqliteDeviceStore {
    /// Wrap an already opened store.
    pub fn new(store: Store) -> Self {
        Self {
            inner: Mutex::new(Some(Inner::new(store))),
        }
    }

    /// Open or create a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Store::open(path)?))
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Store::open_in_memory()?))
    }

    /// Run a closure against the underlying [`Store`].
    ///
    /// Used for the readings and alert rule tables. Device writes made here
    /// are not published to watchers; use [`DeviceStore::upsert`] for those.
    pub async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Store) -> airwatch_store::Result<T>,
    {
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().ok_or(Error::Closed)?;
        Ok(f(&inner.store)?)
    }

    /// Whether [`DeviceStore::close`] has been called.
    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}

#[async_trait]
impl DeviceStore for SqliteDeviceStore {
    async fn get_all(&self) -> Result<Vec<SensorDevice>> {
        self.with_store(Store::list_devices).await
    }

    async fn get(&self, id: &str) -> Result<Option<SensorDevice>> {
        self.with_store(|store| store.get_device(id)).await
    }

    async fn upsert(&self, patch: DevicePatch) -> Result<SensorDevice> {
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().ok_or(Error::Closed)?;
        let device = inner.store.upsert_device(&patch)?;
        inner.publish();
        Ok(device)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().ok_or(Error::Closed)?;
        let existed = inner.store.delete_device(id)?;
        if existed {
            inner.publish();
        }
        Ok(existed)
    }

    async fn watch(&self) -> Result<SnapshotWatch> {
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().ok_or(Error::Closed)?;
        debug!("Attaching snapshot watch");
        Ok(SnapshotWatch::new(inner.snapshots.subscribe()))
    }

    async fn seed_if_empty(&self, defaults: &[SensorDevice]) -> Result<SeedOutcome> {
        let guard = self.inner.lock().await;
        let inner = guard.as_ref().ok_or(Error::Closed)?;
        let outcome = inner.store.seed_if_empty(defaults)?;
        if outcome.was_seeded() {
            inner.publish();
        }
        Ok(outcome)
    }

    async fn close(&self) {
        // Dropping the sender ends every watch
        if self.inner.lock().await.take().is_some() {
            info!("Device store closed");
        }
    }
}
