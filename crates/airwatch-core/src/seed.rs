//! Seeding policy for the device collection.
//!
//! A consumer must never observe an empty collection: the first empty
//! observation writes the default device set and hands it straight to the
//! observer. Seed attempts are single-flight. A process-wide gate serializes
//! them and the store checks emptiness and writes the defaults in one
//! transaction, so concurrent observers converge on one write.

use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, info};

use airwatch_store::SeedOutcome;
use airwatch_types::{DeviceStatus, Location, SensorDevice};

use crate::error::Result;
use crate::traits::DeviceStore;

/// The default device set, with reading times relative to `now`.
pub fn default_devices(now: OffsetDateTime) -> Vec<SensorDevice> {
    let device = |id: &str,
                  name: &str,
                  location: Location,
                  status: DeviceStatus,
                  battery: u8,
                  co_level: f64,
                  age: Duration| SensorDevice {
        id: id.to_string(),
        name: name.to_string(),
        location,
        status,
        battery,
        co_level,
        last_reading: now - age,
    };

    vec![
        device(
            "SN-001",
            "Main Atrium Sensor",
            Location::new(40.7128, -74.0060, "Zone A - Atrium"),
            DeviceStatus::Normal,
            95,
            3.0,
            Duration::minutes(2),
        ),
        device(
            "SN-002",
            "Cafeteria Vent Sensor",
            Location::new(40.7135, -74.0065, "Zone B - Cafeteria"),
            DeviceStatus::Warning,
            80,
            12.0,
            Duration::minutes(1),
        ),
        device(
            "SN-003",
            "Lab 2 Exhaust",
            Location::new(40.7140, -74.0055, "Zone C - Lab 2"),
            DeviceStatus::Critical,
            65,
            55.0,
            Duration::minutes(5),
        ),
        device(
            "SN-004",
            "West Wing Corridor",
            Location::new(40.7122, -74.0070, "Zone D - West Wing"),
            DeviceStatus::Normal,
            100,
            2.0,
            Duration::minutes(10),
        ),
        device(
            "SN-005",
            "Parking Garage L1",
            Location::new(40.7118, -74.0080, "Zone E - Garage L1"),
            DeviceStatus::Offline,
            0,
            0.0,
            Duration::hours(3),
        ),
    ]
}

/// Single-flight seed-on-empty policy.
///
/// Share one policy (behind an `Arc`) between every consumer of a store.
#[derive(Debug, Default)]
pub struct SeedPolicy {
    gate: Mutex<()>,
}

impl SeedPolicy {
    /// Create a policy with an open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `observed` unchanged unless it is empty; if empty, seed.
    ///
    /// An observer that loses the race receives the collection the winner
    /// wrote instead of writing again.
    pub async fn ensure_seeded<S>(
        &self,
        store: &S,
        observed: Vec<SensorDevice>,
    ) -> Result<Vec<SensorDevice>>
    where
        S: DeviceStore + ?Sized,
    {
        if !observed.is_empty() {
            return Ok(observed);
        }

        let _guard = self.gate.lock().await;
        let defaults = default_devices(OffsetDateTime::now_utc());
        match store.seed_if_empty(&defaults).await? {
            SeedOutcome::Seeded(devices) => {
                info!("Device collection was empty, seeded {} defaults", devices.len());
                Ok(devices)
            }
            SeedOutcome::AlreadyPopulated(devices) => {
                debug!("Device collection already populated, skipping seed");
                Ok(devices)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDeviceStore;
    use std::sync::Arc;

    #[test]
    fn test_default_devices_table() {
        let now = OffsetDateTime::now_utc();
        let defaults = default_devices(now);

        let ids: Vec<&str> = defaults.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["SN-001", "SN-002", "SN-003", "SN-004", "SN-005"]);

        let statuses: Vec<DeviceStatus> = defaults.iter().map(|d| d.status).collect();
        assert_eq!(
            statuses,
            vec![
                DeviceStatus::Normal,
                DeviceStatus::Warning,
                DeviceStatus::Critical,
                DeviceStatus::Normal,
                DeviceStatus::Offline,
            ]
        );

        assert_eq!(defaults[2].co_level, 55.0);
        assert_eq!(defaults[4].battery, 0);
        assert_eq!(defaults[4].last_reading, now - Duration::hours(3));
        assert!(defaults.iter().all(|d| d.validate().is_empty()));
    }

    #[tokio::test]
    async fn test_non_empty_snapshot_never_seeds() {
        let store = MockDeviceStore::new();
        let policy = SeedPolicy::new();
        let observed = default_devices(OffsetDateTime::now_utc())[..1].to_vec();

        let devices = policy.ensure_seeded(&store, observed.clone()).await.unwrap();
        assert_eq!(devices, observed);
        assert_eq!(store.seed_write_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_snapshot_seeds_defaults() {
        let store = MockDeviceStore::new();
        let policy = SeedPolicy::new();

        let devices = policy.ensure_seeded(&store, Vec::new()).await.unwrap();
        assert_eq!(devices.len(), 5);
        assert_eq!(store.seed_write_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_empty_observations_seed_once() {
        let store = Arc::new(MockDeviceStore::new());
        store.set_seed_latency(20);
        let policy = Arc::new(SeedPolicy::new());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let policy = Arc::clone(&policy);
                tokio::spawn(async move { policy.ensure_seeded(&*store, Vec::new()).await })
            })
            .collect();

        for task in tasks {
            let devices = task.await.unwrap().unwrap();
            assert_eq!(devices.len(), 5);
        }
        assert_eq!(store.seed_write_count(), 1);
        assert_eq!(store.upsert_count(), 0);
    }
}
