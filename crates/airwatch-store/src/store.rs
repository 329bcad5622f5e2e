//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row};
use time::OffsetDateTime;
use tracing::{debug, info};

use airwatch_types::{AlertRule, DevicePatch, DeviceStatus, Location, ParseError, SensorDevice};

use crate::error::{Error, Result};
use crate::models::{SeedOutcome, SeedState, StoredReading};
use crate::queries::ReadingQuery;
use crate::schema;

const DEVICE_COLUMNS: &str =
    "id, name, lat, lng, location_name, status, battery, co_level, last_reading";

/// SQLite-based store for AirWatch devices, readings and alert rules.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    // === Device operations ===

    /// List all devices, ordered by ID.
    pub fn list_devices(&self) -> Result<Vec<SensorDevice>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {DEVICE_COLUMNS} FROM devices ORDER BY id"))?;

        let rows = stmt
            .query_map([], DeviceRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(DeviceRow::into_device).collect()
    }

    /// Get a device by ID.
    pub fn get_device(&self, device_id: &str) -> Result<Option<SensorDevice>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?"))?;

        stmt.query_row([device_id], DeviceRow::from_row)
            .optional()?
            .map(DeviceRow::into_device)
            .transpose()
    }

    /// Number of devices in the collection.
    pub fn count_devices(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Merge-write a device.
    ///
    /// Fields present in the patch overwrite stored values; absent fields
    /// keep their stored values. Creating a device requires a complete patch.
    /// A reading is recorded whenever the patch carries a CO level.
    pub fn upsert_device(&self, patch: &DevicePatch) -> Result<SensorDevice> {
        let errors = patch.validate();
        if !errors.is_empty() {
            return Err(ParseError::Invalid(errors).into());
        }

        let tx = self.conn.unchecked_transaction()?;

        let existing = self.get_device(&patch.id)?;
        let created = existing.is_none();
        let device = patch.clone().merge_into(existing)?;

        tx.execute(
            "INSERT INTO devices (id, name, lat, lng, location_name, status, battery, co_level,
                                  last_reading, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                lat = excluded.lat,
                lng = excluded.lng,
                location_name = excluded.location_name,
                status = excluded.status,
                battery = excluded.battery,
                co_level = excluded.co_level,
                last_reading = excluded.last_reading,
                updated_at = excluded.updated_at",
            rusqlite::params![
                device.id,
                device.name,
                device.location.lat,
                device.location.lng,
                device.location.name,
                device.status.as_str(),
                device.battery,
                device.co_level,
                device.last_reading,
                OffsetDateTime::now_utc().unix_timestamp(),
            ],
        )?;

        if let Some(co_level) = patch.co_level {
            tx.execute(
                "INSERT INTO readings (device_id, captured_at, co_level) VALUES (?1, ?2, ?3)",
                rusqlite::params![device.id, to_millis(OffsetDateTime::now_utc()), co_level],
            )?;
        }

        tx.commit()?;

        debug!(
            "{} device {} (status {}, CO {} ppm)",
            if created { "Created" } else { "Updated" },
            device.id,
            device.status,
            device.co_level
        );
        Ok(device)
    }

    /// Delete a device and its readings. Returns whether it existed.
    pub fn delete_device(&self, device_id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM devices WHERE id = ?", [device_id])?;
        if rows > 0 {
            debug!("Deleted device {}", device_id);
        }
        Ok(rows > 0)
    }

    // === Seeding ===

    /// Write `defaults` if and only if the collection is empty.
    ///
    /// The emptiness check and the writes happen in one transaction, so a
    /// concurrent writer cannot interleave between them.
    pub fn seed_if_empty(&self, defaults: &[SensorDevice]) -> Result<SeedOutcome> {
        let tx = self.conn.unchecked_transaction()?;

        if self.count_devices()? > 0 {
            let devices = self.list_devices()?;
            tx.commit()?;
            return Ok(SeedOutcome::AlreadyPopulated(devices));
        }

        let now = OffsetDateTime::now_utc();
        for device in defaults {
            tx.execute(
                "INSERT INTO devices (id, name, lat, lng, location_name, status, battery,
                                      co_level, last_reading, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    device.id,
                    device.name,
                    device.location.lat,
                    device.location.lng,
                    device.location.name,
                    device.status.as_str(),
                    device.battery,
                    device.co_level,
                    device.last_reading,
                    now.unix_timestamp(),
                ],
            )?;
            tx.execute(
                "INSERT INTO readings (device_id, captured_at, co_level) VALUES (?1, ?2, ?3)",
                rusqlite::params![device.id, to_millis(device.last_reading), device.co_level],
            )?;
        }

        tx.execute(
            "UPDATE seed_state SET seed_count = seed_count + 1, last_seeded_at = ?1 WHERE id = 1",
            [now.unix_timestamp()],
        )?;

        let devices = self.list_devices()?;
        tx.commit()?;

        info!("Seeded {} default devices", defaults.len());
        Ok(SeedOutcome::Seeded(devices))
    }

    /// How often the default set has been written.
    pub fn seed_state(&self) -> Result<SeedState> {
        let (seed_count, last_seeded_at): (i64, Option<i64>) = self.conn.query_row(
            "SELECT seed_count, last_seeded_at FROM seed_state WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let last_seeded_at = last_seeded_at
            .map(|ts| {
                OffsetDateTime::from_unix_timestamp(ts)
                    .map_err(|e| Error::InvalidTimestamp(e.to_string()))
            })
            .transpose()?;

        Ok(SeedState {
            seed_count: seed_count as u64,
            last_seeded_at,
        })
    }

    // === Reading operations ===

    /// Query recorded readings.
    pub fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<StoredReading>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, device_id, captured_at, co_level)| {
                Ok(StoredReading {
                    id,
                    device_id,
                    captured_at: from_millis(captured_at)?,
                    co_level,
                })
            })
            .collect()
    }

    /// Count recorded readings, optionally for one device.
    pub fn count_readings(&self, device_id: Option<&str>) -> Result<u64> {
        let count: i64 = match device_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM readings WHERE device_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    // === Alert rule operations ===

    /// List alert rules in creation order.
    pub fn list_alert_rules(&self) -> Result<Vec<AlertRule>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, threshold, timeframe, enabled FROM alert_rules ORDER BY rowid",
        )?;

        let rules = stmt
            .query_map([], alert_rule_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rules)
    }

    /// Get an alert rule by ID.
    pub fn get_alert_rule(&self, rule_id: &str) -> Result<Option<AlertRule>> {
        let rule = self
            .conn
            .query_row(
                "SELECT id, name, threshold, timeframe, enabled FROM alert_rules WHERE id = ?",
                [rule_id],
                alert_rule_from_row,
            )
            .optional()?;
        Ok(rule)
    }

    /// Insert or replace an alert rule.
    pub fn upsert_alert_rule(&self, rule: &AlertRule) -> Result<()> {
        let errors = rule.validate();
        if !errors.is_empty() {
            return Err(ParseError::Invalid(errors).into());
        }

        self.conn.execute(
            "INSERT INTO alert_rules (id, name, threshold, timeframe, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                threshold = excluded.threshold,
                timeframe = excluded.timeframe,
                enabled = excluded.enabled",
            rusqlite::params![rule.id, rule.name, rule.threshold, rule.timeframe, rule.enabled],
        )?;
        Ok(())
    }

    /// Delete an alert rule. Returns whether it existed.
    pub fn delete_alert_rule(&self, rule_id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM alert_rules WHERE id = ?", [rule_id])?;
        Ok(rows > 0)
    }

    /// Install the default alert rules when no rules exist.
    ///
    /// Returns the number of rules installed.
    pub fn install_default_alert_rules(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM alert_rules", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(0);
        }

        let defaults = AlertRule::defaults();
        for rule in &defaults {
            self.upsert_alert_rule(rule)?;
        }
        debug!("Installed {} default alert rules", defaults.len());
        Ok(defaults.len())
    }
}

/// Raw device columns, before status parsing.
struct DeviceRow {
    id: String,
    name: String,
    lat: f64,
    lng: f64,
    location_name: String,
    status: String,
    battery: u8,
    co_level: f64,
    last_reading: OffsetDateTime,
}

impl DeviceRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            lat: row.get(2)?,
            lng: row.get(3)?,
            location_name: row.get(4)?,
            status: row.get(5)?,
            battery: row.get(6)?,
            co_level: row.get(7)?,
            last_reading: row.get(8)?,
        })
    }

    fn into_device(self) -> Result<SensorDevice> {
        let status: DeviceStatus = self.status.parse()?;
        Ok(SensorDevice {
            id: self.id,
            name: self.name,
            location: Location::new(self.lat, self.lng, self.location_name),
            status,
            battery: self.battery,
            co_level: self.co_level,
            last_reading: self.last_reading,
        })
    }
}

fn alert_rule_from_row(row: &Row<'_>) -> rusqlite::Result<AlertRule> {
    Ok(AlertRule {
        id: row.get(0)?,
        name: row.get(1)?,
        threshold: row.get(2)?,
        timeframe: row.get(3)?,
        enabled: row.get(4)?,
    })
}

/// Unix milliseconds for a timestamp.
pub(crate) fn to_millis(time: OffsetDateTime) -> i64 {
    (time.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(millis: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|e| Error::InvalidTimestamp(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn device(id: &str, co_level: f64) -> SensorDevice {
        SensorDevice {
            id: id.to_string(),
            name: format!("Sensor {id}"),
            location: Location::new(40.7128, -74.0060, "Zone A - Atrium"),
            status: DeviceStatus::Normal,
            battery: 95,
            co_level,
            last_reading: OffsetDateTime::now_utc() - Duration::minutes(2),
        }
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.list_devices().unwrap().is_empty());
        assert_eq!(store.count_devices().unwrap(), 0);
    }

    #[test]
    fn test_open_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.db");

        let store = Store::open(&path).unwrap();
        store.upsert_device(&device("SN-001", 3.0).into()).unwrap();
        drop(store);

        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.count_devices().unwrap(), 1);
    }

    #[test]
    fn test_upsert_creates_and_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let original = device("SN-001", 3.0);

        let written = store.upsert_device(&original.clone().into()).unwrap();
        assert_eq!(written, original);

        let fetched = store.get_device("SN-001").unwrap().unwrap();
        assert_eq!(fetched, original);
    }

    #[test]
    fn test_upsert_merges_partial_patch() {
        let store = Store::open_in_memory().unwrap();
        let original = device("SN-001", 3.0);
        store.upsert_device(&original.clone().into()).unwrap();

        let merged = store
            .upsert_device(&DevicePatch::new("SN-001").battery(10))
            .unwrap();

        assert_eq!(merged.battery, 10);
        assert_eq!(merged.name, original.name);
        assert_eq!(merged.co_level, original.co_level);
        assert_eq!(merged.last_reading, original.last_reading);
    }

    #[test]
    fn test_upsert_partial_patch_for_unknown_device_fails() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .upsert_device(&DevicePatch::new("SN-404").battery(10))
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Invalid(ParseError::IncompleteDevice { .. })
        ));
        assert_eq!(store.count_devices().unwrap(), 0);
    }

    #[test]
    fn test_upsert_rejects_invalid_fields() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .upsert_device(&DevicePatch::new("SN-001").co_level(-1.0))
            .unwrap_err();
        assert!(matches!(err, Error::Invalid(ParseError::Invalid(_))));
    }

    #[test]
    fn test_list_devices_ordered_by_id() {
        let store = Store::open_in_memory().unwrap();
        for id in ["SN-003", "SN-001", "SN-002"] {
            store.upsert_device(&device(id, 1.0).into()).unwrap();
        }

        let ids: Vec<String> = store
            .list_devices()
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["SN-001", "SN-002", "SN-003"]);
    }

    #[test]
    fn test_delete_device_cascades_readings() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_device(&device("SN-003", 55.0).into()).unwrap();
        assert_eq!(store.count_readings(Some("SN-003")).unwrap(), 1);

        assert!(store.delete_device("SN-003").unwrap());
        assert!(store.get_device("SN-003").unwrap().is_none());
        assert_eq!(store.count_readings(Some("SN-003")).unwrap(), 0);

        // Deleting again is not an error
        assert!(!store.delete_device("SN-003").unwrap());
    }

    #[test]
    fn test_readings_recorded_only_with_co_level() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_device(&device("SN-002", 12.0).into()).unwrap();
        store
            .upsert_device(&DevicePatch::new("SN-002").battery(70))
            .unwrap();
        store
            .upsert_device(&DevicePatch::new("SN-002").co_level(14.5))
            .unwrap();

        let readings = store
            .query_readings(&ReadingQuery::new().device("SN-002").oldest_first())
            .unwrap();
        let levels: Vec<f64> = readings.iter().map(|r| r.co_level).collect();
        assert_eq!(levels, vec![12.0, 14.5]);
        assert_eq!(readings[1].to_point().co_level, 14.5);
    }

    #[test]
    fn test_query_readings_time_range() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_device(&device("SN-001", 3.0).into()).unwrap();

        let future = OffsetDateTime::now_utc() + Duration::hours(1);
        let none = store
            .query_readings(&ReadingQuery::new().since(future))
            .unwrap();
        assert!(none.is_empty());

        let past = OffsetDateTime::now_utc() - Duration::hours(1);
        let some = store
            .query_readings(&ReadingQuery::new().since(past).limit(10))
            .unwrap();
        assert_eq!(some.len(), 1);
    }

    #[test]
    fn test_seed_if_empty_seeds_once() {
        let store = Store::open_in_memory().unwrap();
        let defaults = vec![device("SN-001", 3.0), device("SN-002", 12.0)];

        let first = store.seed_if_empty(&defaults).unwrap();
        assert!(first.was_seeded());
        assert_eq!(first.into_devices(), defaults);

        assert_eq!(store.count_readings(Some("SN-001")).unwrap(), 1);
        assert_eq!(store.count_readings(None).unwrap(), 2);
        let seeded = store
            .query_readings(&ReadingQuery::new().device("SN-002"))
            .unwrap();
        assert_eq!(seeded[0].co_level, 12.0);
        assert_eq!(
            to_millis(seeded[0].captured_at),
            to_millis(defaults[1].last_reading)
        );

        let second = store.seed_if_empty(&defaults).unwrap();
        assert!(!second.was_seeded());
        assert_eq!(second.into_devices().len(), 2);
        assert_eq!(store.count_readings(None).unwrap(), 2);

        let state = store.seed_state().unwrap();
        assert_eq!(state.seed_count, 1);
        assert!(state.last_seeded_at.is_some());
    }

    #[test]
    fn test_seed_skipped_when_populated() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_device(&device("SN-099", 1.0).into()).unwrap();

        let outcome = store.seed_if_empty(&[device("SN-001", 3.0)]).unwrap();
        assert_eq!(
            outcome,
            SeedOutcome::AlreadyPopulated(vec![store.get_device("SN-099").unwrap().unwrap()])
        );
        assert_eq!(store.seed_state().unwrap().seed_count, 0);
    }

    #[test]
    fn test_alert_rules_crud() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.install_default_alert_rules().unwrap(), 3);
        assert_eq!(store.install_default_alert_rules().unwrap(), 0);

        let rules = store.list_alert_rules().unwrap();
        let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["RULE-01", "RULE-02", "RULE-03"]);

        let mut rule = store.get_alert_rule("RULE-03").unwrap().unwrap();
        assert!(!rule.enabled);
        rule.enabled = true;
        store.upsert_alert_rule(&rule).unwrap();
        assert!(store.get_alert_rule("RULE-03").unwrap().unwrap().enabled);

        let custom = AlertRule::new("Garage spike", 30.0, 2);
        store.upsert_alert_rule(&custom).unwrap();
        assert_eq!(store.list_alert_rules().unwrap().len(), 4);

        assert!(store.delete_alert_rule(&custom.id).unwrap());
        assert!(!store.delete_alert_rule(&custom.id).unwrap());
    }

    #[test]
    fn test_invalid_alert_rule_rejected() {
        let store = Store::open_in_memory().unwrap();
        let rule = AlertRule::new("", 10.0, 0);
        assert!(matches!(
            store.upsert_alert_rule(&rule),
            Err(Error::Invalid(ParseError::Invalid(errors))) if errors.len() == 2
        ));
    }
}
