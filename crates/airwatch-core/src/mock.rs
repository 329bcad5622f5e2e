//! Mock device store for testing.
//!
//! [`MockDeviceStore`] implements [`DeviceStore`] in memory, so sync and
//! seeding logic can be exercised without a database.
//!
//! # Features
//!
//! - **Failure injection**: fail every operation, or only the next N
//! - **Latency simulation**: delay seed writes to widen race windows
//! - **Counters**: upserts, seed writes and watch attachments

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, watch};

use airwatch_store::SeedOutcome;
use airwatch_types::{DevicePatch, SensorDevice};

use crate::error::{Error, Result};
use crate::traits::{DeviceStore, Snapshot, SnapshotWatch};

/// An in-memory [`DeviceStore`] for tests.
///
/// # Example
///
/// ```
/// use airwatch_core::{DeviceStore, MockDeviceStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MockDeviceStore::new();
/// store.set_should_fail(true, Some("connection reset"));
/// assert!(store.get_all().await.is_err());
/// # }
/// ```
pub struct MockDeviceStore {
    devices: RwLock<BTreeMap<String, SensorDevice>>,
    snapshots: std::sync::Mutex<Option<watch::Sender<Snapshot>>>,
    should_fail: AtomicBool,
    fail_message: std::sync::Mutex<String>,
    /// Operations to fail before succeeding.
    remaining_failures: AtomicU32,
    /// Simulated seed latency in milliseconds (0 = no delay).
    seed_latency_ms: AtomicU64,
    upsert_count: AtomicU32,
    seed_write_count: AtomicU32,
    watch_count: AtomicU32,
}

impl std::fmt::Debug for MockDeviceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDeviceStore")
            .field("upserts", &self.upsert_count())
            .field("seed_writes", &self.seed_write_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Default for MockDeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDeviceStore {
    /// Create an empty mock store.
    pub fn new() -> Self {
        Self::with_devices(Vec::new())
    }

    /// Create a mock store holding `devices`.
    pub fn with_devices(devices: impl IntoIterator<Item = SensorDevice>) -> Self {
        let map: BTreeMap<_, _> = devices.into_iter().map(|d| (d.id.clone(), d)).collect();
        let (tx, _) = watch::channel(Snapshot::Devices(map.values().cloned().collect()));
        Self {
            devices: RwLock::new(map),
            snapshots: std::sync::Mutex::new(Some(tx)),
            should_fail: AtomicBool::new(false),
            fail_message: std::sync::Mutex::new("Mock failure".to_string()),
            remaining_failures: AtomicU32::new(0),
            seed_latency_ms: AtomicU64::new(0),
            upsert_count: AtomicU32::new(0),
            seed_write_count: AtomicU32::new(0),
            watch_count: AtomicU32::new(0),
        }
    }

    /// Make every operation fail (or stop failing).
    pub fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.should_fail.store(fail, Ordering::Relaxed);
        if let Some(msg) = message
            && let Ok(mut current) = self.fail_message.lock()
        {
            *current = msg.to_string();
        }
    }

    /// Fail the next `count` operations, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Delay each seed write by `ms` milliseconds.
    pub fn set_seed_latency(&self, ms: u64) {
        self.seed_latency_ms.store(ms, Ordering::Relaxed);
    }

    /// Publish a store failure to every watcher.
    pub fn publish_failure(&self, message: &str) {
        if let Ok(guard) = self.snapshots.lock()
            && let Some(tx) = guard.as_ref()
        {
            tx.send_replace(Snapshot::Failed(message.to_string()));
        }
    }

    /// Number of successful upserts.
    pub fn upsert_count(&self) -> u32 {
        self.upsert_count.load(Ordering::Relaxed)
    }

    /// Number of times the default set was written.
    pub fn seed_write_count(&self) -> u32 {
        self.seed_write_count.load(Ordering::Relaxed)
    }

    /// Number of watches attached.
    pub fn watch_count(&self) -> u32 {
        self.watch_count.load(Ordering::Relaxed)
    }

    /// Whether the store has been closed.
    pub fn is_closed(&self) -> bool {
        self.snapshots.lock().map(|g| g.is_none()).unwrap_or(true)
    }

    fn check(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::Transport(self.fail_message()));
        }

        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::Transport(self.fail_message()));
        }
        Ok(())
    }

    fn fail_message(&self) -> String {
        self.fail_message
            .lock()
            .map(|m| m.clone())
            .unwrap_or_else(|_| "Mock failure".to_string())
    }

    fn publish(&self, devices: &BTreeMap<String, SensorDevice>) {
        if let Ok(guard) = self.snapshots.lock()
            && let Some(tx) = guard.as_ref()
        {
            tx.send_replace(Snapshot::Devices(devices.values().cloned().collect()));
        }
    }
}

#[async_trait]
impl DeviceStore for MockDeviceStore {
    async fn get_all(&self) -> Result<Vec<SensorDevice>> {
        self.check()?;
        Ok(self.devices.read().await.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<SensorDevice>> {
        self.check()?;
        Ok(self.devices.read().await.get(id).cloned())
    }

    async fn upsert(&self, patch: DevicePatch) -> Result<SensorDevice> {
        self.check()?;
        let errors = patch.validate();
        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }

        let mut devices = self.devices.write().await;
        let existing = devices.get(&patch.id).cloned();
        let device = patch.merge_into(existing)?;
        devices.insert(device.id.clone(), device.clone());
        self.upsert_count.fetch_add(1, Ordering::Relaxed);
        self.publish(&devices);
        Ok(device)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.check()?;
        let mut devices = self.devices.write().await;
        let existed = devices.remove(id).is_some();
        if existed {
            self.publish(&devices);
        }
        Ok(existed)
    }

    async fn watch(&self) -> Result<SnapshotWatch> {
        self.check()?;
        let rx = {
            let guard = self.snapshots.lock().map_err(|_| Error::Closed)?;
            guard.as_ref().ok_or(Error::Closed)?.subscribe()
        };
        self.watch_count.fetch_add(1, Ordering::Relaxed);
        Ok(SnapshotWatch::new(rx))
    }

    async fn seed_if_empty(&self, defaults: &[SensorDevice]) -> Result<SeedOutcome> {
        self.check()?;
        let mut devices = self.devices.write().await;
        if !devices.is_empty() {
            return Ok(SeedOutcome::AlreadyPopulated(
                devices.values().cloned().collect(),
            ));
        }

        let latency = self.seed_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        for device in defaults {
            devices.insert(device.id.clone(), device.clone());
        }
        self.seed_write_count.fetch_add(1, Ordering::Relaxed);
        self.publish(&devices);
        Ok(SeedOutcome::Seeded(devices.values().cloned().collect()))
    }

    async fn close(&self) {
        if let Ok(mut guard) = self.snapshots.lock() {
            guard.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airwatch_types::{DeviceStatus, Location};
    use time::OffsetDateTime;

    fn device(id: &str) -> SensorDevice {
        SensorDevice {
            id: id.to_string(),
            name: format!("Sensor {id}"),
            location: Location::new(40.0, -74.0, "Zone"),
            status: DeviceStatus::Normal,
            battery: 50,
            co_level: 1.0,
            last_reading: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn test_with_devices_is_visible() {
        let store = MockDeviceStore::with_devices([device("SN-002"), device("SN-001")]);
        let ids: Vec<_> = store
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["SN-001", "SN-002"]);

        let mut watch = store.watch().await.unwrap();
        match watch.next().await {
            Some(Snapshot::Devices(devices)) => assert_eq!(devices.len(), 2),
            other => panic!("unexpected snapshot: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transient_failures() {
        let store = MockDeviceStore::new();
        store.set_transient_failures(2);
        assert!(store.get_all().await.is_err());
        assert!(store.get_all().await.is_err());
        assert!(store.get_all().await.is_ok());
    }

    #[tokio::test]
    async fn test_seed_if_empty_counts_writes() {
        let store = MockDeviceStore::new();
        let first = store.seed_if_empty(&[device("SN-001")]).await.unwrap();
        let second = store.seed_if_empty(&[device("SN-001")]).await.unwrap();
        assert!(first.was_seeded());
        assert!(!second.was_seeded());
        assert_eq!(store.seed_write_count(), 1);
    }

    #[tokio::test]
    async fn test_close_rejects_operations() {
        let store = MockDeviceStore::new();
        store.close().await;
        assert!(store.is_closed());
        assert_eq!(store.get("SN-001").await, Err(Error::Closed));
    }
}
