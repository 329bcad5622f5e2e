//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use airwatch_types::{HistoricalPoint, SensorDevice};

/// A CO reading stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    /// Database row ID.
    pub id: i64,
    /// Device identifier.
    pub device_id: String,
    /// When this reading was written.
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    /// CO concentration in ppm.
    pub co_level: f64,
}

impl StoredReading {
    /// Convert to a trend point.
    pub fn to_point(&self) -> HistoricalPoint {
        HistoricalPoint {
            timestamp: self.captured_at,
            co_level: self.co_level,
        }
    }
}

/// Record of default-set seeding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedState {
    /// How many times the default set has been written.
    pub seed_count: u64,
    /// When the default set was last written.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seeded_at: Option<OffsetDateTime>,
}

/// Result of a transactional seed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SeedOutcome {
    /// The collection was empty; the default set was written.
    Seeded(Vec<SensorDevice>),
    /// The collection already had devices; nothing was written.
    AlreadyPopulated(Vec<SensorDevice>),
}

impl SeedOutcome {
    /// The devices a consumer should observe after the attempt.
    pub fn into_devices(self) -> Vec<SensorDevice> {
        match self {
            SeedOutcome::Seeded(devices) | SeedOutcome::AlreadyPopulated(devices) => devices,
        }
    }

    /// Whether this attempt wrote the default set.
    pub fn was_seeded(&self) -> bool {
        matches!(self, SeedOutcome::Seeded(_))
    }
}
