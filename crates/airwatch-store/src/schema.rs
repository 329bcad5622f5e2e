//! Database schema and version tracking.

use rusqlite::Connection;

use crate::error::{Error, Result};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if version > SCHEMA_VERSION {
        return Err(Error::UnsupportedSchema {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- One document per device, keyed by device id
        CREATE TABLE IF NOT EXISTS devices (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            lat REAL NOT NULL,
            lng REAL NOT NULL,
            location_name TEXT NOT NULL,
            status TEXT NOT NULL,
            battery INTEGER NOT NULL,
            co_level REAL NOT NULL,
            last_reading TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- CO level recorded on every write that carries one
        CREATE TABLE IF NOT EXISTS readings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
            captured_at INTEGER NOT NULL,
            co_level REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_readings_device_time
            ON readings(device_id, captured_at);

        CREATE TABLE IF NOT EXISTS alert_rules (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            threshold REAL NOT NULL,
            timeframe INTEGER NOT NULL,
            enabled INTEGER NOT NULL
        );

        -- Single-row record of default-set seeding
        CREATE TABLE IF NOT EXISTS seed_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            seed_count INTEGER NOT NULL,
            last_seeded_at INTEGER
        );
        INSERT OR IGNORE INTO seed_state (id, seed_count, last_seeded_at) VALUES (1, 0, NULL);
        "#,
    )?;

    Ok(())
}
