//! Core types for AirWatch sensor data.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{FieldError, ParseError, ParseResult};

/// Maximum battery percentage.
pub const MAX_BATTERY: u8 = 100;

/// Reported status of a sensor device.
///
/// `Offline` is a status the device (or the ingesting system) reports; it is
/// never derived from the age of the last reading.
///
/// Serde uses the variant names ("Normal", "Warning", "Critical", "Offline"),
/// which is also the wire format of the ingestion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DeviceStatus {
    /// CO level within normal parameters.
    Normal,
    /// Elevated CO level.
    Warning,
    /// Critical CO level, immediate action required.
    Critical,
    /// Device is not reporting.
    Offline,
}

impl DeviceStatus {
    /// All statuses in display order.
    pub const ALL: [DeviceStatus; 4] = [
        DeviceStatus::Normal,
        DeviceStatus::Warning,
        DeviceStatus::Critical,
        DeviceStatus::Offline,
    ];

    /// The wire name of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Normal => "Normal",
            DeviceStatus::Warning => "Warning",
            DeviceStatus::Critical => "Critical",
            DeviceStatus::Offline => "Offline",
        }
    }
}

impl FromStr for DeviceStatus {
    type Err = ParseError;

    /// Parse a status from its wire name (case-sensitive).
    ///
    /// # Examples
    ///
    /// ```
    /// use airwatch_types::DeviceStatus;
    ///
    /// assert_eq!("Critical".parse::<DeviceStatus>(), Ok(DeviceStatus::Critical));
    /// assert!("critical".parse::<DeviceStatus>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseError::UnknownStatus(s.to_string()))
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical placement of a sensor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Location {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Human-readable zone name (e.g. "Zone C - Lab 2").
    pub name: String,
}

impl Location {
    /// Create a new location.
    pub fn new(lat: f64, lng: f64, name: impl Into<String>) -> Self {
        Self {
            lat,
            lng,
            name: name.into(),
        }
    }
}

/// A CO sensor device record.
///
/// This is the document stored per device in the `devices` collection.
/// JSON field names are camelCase (`coLevel`, `lastReading`).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct SensorDevice {
    /// Stable unique identifier (e.g. "SN-001").
    pub id: String,
    /// Display name.
    pub name: String,
    /// Where the device is installed.
    pub location: Location,
    /// Reported status.
    pub status: DeviceStatus,
    /// Battery level percentage (0-100).
    pub battery: u8,
    /// CO concentration in ppm.
    pub co_level: f64,
    /// When the last reading was received.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub last_reading: OffsetDateTime,
}

impl SensorDevice {
    /// Validate field ranges, returning every failure.
    pub fn validate(&self) -> Vec<FieldError> {
        DevicePatch::from(self.clone()).validate()
    }

    /// Battery classification for this device.
    #[must_use]
    pub fn battery_level(&self) -> BatteryLevel {
        BatteryLevel::from_percent(self.battery)
    }
}

/// Partial update of a [`Location`].
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LocationPatch {
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub lat: Option<f64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub lng: Option<f64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
}

impl From<Location> for LocationPatch {
    fn from(location: Location) -> Self {
        Self {
            lat: Some(location.lat),
            lng: Some(location.lng),
            name: Some(location.name),
        }
    }
}

/// A merge-write against a single device.
///
/// Only `id` is required. Applying the patch to an existing device overwrites
/// the fields that are present and leaves every other field untouched,
/// including individual `location` sub-fields. A patch that creates a new
/// device must carry every field.
///
/// # Example
///
/// ```
/// use airwatch_types::{DevicePatch, DeviceStatus, Location, SensorDevice};
/// use time::macros::datetime;
///
/// let mut device = SensorDevice {
///     id: "SN-001".to_string(),
///     name: "Main Atrium Sensor".to_string(),
///     location: Location::new(40.7128, -74.0060, "Zone A - Atrium"),
///     status: DeviceStatus::Normal,
///     battery: 95,
///     co_level: 3.0,
///     last_reading: datetime!(2025-01-01 12:00 UTC),
/// };
///
/// DevicePatch::new("SN-001").battery(10).apply_to(&mut device);
/// assert_eq!(device.battery, 10);
/// assert_eq!(device.name, "Main Atrium Sensor");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct DevicePatch {
    pub id: String,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub location: Option<LocationPatch>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub status: Option<DeviceStatus>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub battery: Option<u8>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub co_level: Option<f64>,
    #[cfg_attr(
        feature = "serde",
        serde(
            default,
            with = "time::serde::rfc3339::option",
            skip_serializing_if = "Option::is_none"
        )
    )]
    pub last_reading: Option<OffsetDateTime>,
}

impl DevicePatch {
    /// Create an empty patch for a device.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Set the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the full location.
    pub fn location(mut self, location: Location) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the status.
    pub fn status(mut self, status: DeviceStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the battery percentage.
    pub fn battery(mut self, battery: u8) -> Self {
        self.battery = Some(battery);
        self
    }

    /// Set the CO level in ppm.
    pub fn co_level(mut self, co_level: f64) -> Self {
        self.co_level = Some(co_level);
        self
    }

    /// Set the last reading timestamp.
    pub fn last_reading(mut self, at: OffsetDateTime) -> Self {
        self.last_reading = Some(at);
        self
    }

    /// Whether the patch carries no fields besides the ID.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.location.is_none()
            && self.status.is_none()
            && self.battery.is_none()
            && self.co_level.is_none()
            && self.last_reading.is_none()
    }

    /// Overwrite the fields present in this patch on `device`.
    pub fn apply_to(&self, device: &mut SensorDevice) {
        if let Some(name) = &self.name {
            device.name = name.clone();
        }
        if let Some(location) = &self.location {
            if let Some(lat) = location.lat {
                device.location.lat = lat;
            }
            if let Some(lng) = location.lng {
                device.location.lng = lng;
            }
            if let Some(name) = &location.name {
                device.location.name = name.clone();
            }
        }
        if let Some(status) = self.status {
            device.status = status;
        }
        if let Some(battery) = self.battery {
            device.battery = battery;
        }
        if let Some(co_level) = self.co_level {
            device.co_level = co_level;
        }
        if let Some(at) = self.last_reading {
            device.last_reading = at;
        }
    }

    /// Merge this patch into an existing record, or build a new one.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::IncompleteDevice`] when `existing` is `None` and
    /// the patch does not carry every field.
    pub fn merge_into(self, existing: Option<SensorDevice>) -> ParseResult<SensorDevice> {
        match existing {
            Some(mut device) => {
                self.apply_to(&mut device);
                Ok(device)
            }
            None => self.into_device(),
        }
    }

    /// Convert a complete patch into a device.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::IncompleteDevice`] naming every missing field.
    pub fn into_device(self) -> ParseResult<SensorDevice> {
        let mut missing = Vec::new();
        let location = self.location.unwrap_or_default();
        if self.name.is_none() {
            missing.push("name");
        }
        if location.lat.is_none() {
            missing.push("location.lat");
        }
        if location.lng.is_none() {
            missing.push("location.lng");
        }
        if location.name.is_none() {
            missing.push("location.name");
        }
        if self.status.is_none() {
            missing.push("status");
        }
        if self.battery.is_none() {
            missing.push("battery");
        }
        if self.co_level.is_none() {
            missing.push("coLevel");
        }
        if self.last_reading.is_none() {
            missing.push("lastReading");
        }

        match (
            self.name,
            location.lat,
            location.lng,
            location.name,
            self.status,
            self.battery,
            self.co_level,
            self.last_reading,
        ) {
            (
                Some(name),
                Some(lat),
                Some(lng),
                Some(location_name),
                Some(status),
                Some(battery),
                Some(co_level),
                Some(last_reading),
            ) => Ok(SensorDevice {
                id: self.id,
                name,
                location: Location::new(lat, lng, location_name),
                status,
                battery,
                co_level,
                last_reading,
            }),
            _ => Err(ParseError::IncompleteDevice {
                id: self.id,
                missing,
            }),
        }
    }

    /// Validate the fields present in the patch.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.id.trim().is_empty() {
            errors.push(FieldError::new("id", "device id cannot be empty"));
        }

        if let Some(battery) = self.battery
            && battery > MAX_BATTERY
        {
            errors.push(FieldError::new(
                "battery",
                format!("battery {} is out of range (0-{})", battery, MAX_BATTERY),
            ));
        }

        if let Some(co_level) = self.co_level
            && (!co_level.is_finite() || co_level < 0.0)
        {
            errors.push(FieldError::new(
                "coLevel",
                format!("CO level {} must be a non-negative number", co_level),
            ));
        }

        if let Some(location) = &self.location {
            if let Some(lat) = location.lat
                && !(-90.0..=90.0).contains(&lat)
            {
                errors.push(FieldError::new(
                    "location.lat",
                    format!("latitude {} is out of range (-90 to 90)", lat),
                ));
            }
            if let Some(lng) = location.lng
                && !(-180.0..=180.0).contains(&lng)
            {
                errors.push(FieldError::new(
                    "location.lng",
                    format!("longitude {} is out of range (-180 to 180)", lng),
                ));
            }
        }

        errors
    }
}

impl From<SensorDevice> for DevicePatch {
    fn from(device: SensorDevice) -> Self {
        Self {
            id: device.id,
            name: Some(device.name),
            location: Some(device.location.into()),
            status: Some(device.status),
            battery: Some(device.battery),
            co_level: Some(device.co_level),
            last_reading: Some(device.last_reading),
        }
    }
}

/// A single point in a CO trend series.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct HistoricalPoint {
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// CO concentration in ppm.
    pub co_level: f64,
}

/// A threshold alert rule.
///
/// Rules are configuration records; nothing evaluates them against device
/// state.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    /// CO threshold in ppm.
    pub threshold: f64,
    /// Sustain window in minutes.
    pub timeframe: u32,
    pub enabled: bool,
}

impl AlertRule {
    /// Create an enabled rule with a freshly generated ID.
    pub fn new(name: impl Into<String>, threshold: f64, timeframe: u32) -> Self {
        Self {
            id: Self::generate_id(),
            name: name.into(),
            threshold,
            timeframe,
            enabled: true,
        }
    }

    /// Generate a new unique rule ID (`RULE-<uuid>`).
    pub fn generate_id() -> String {
        format!("RULE-{}", uuid::Uuid::new_v4())
    }

    /// The rules installed on a fresh database.
    pub fn defaults() -> Vec<AlertRule> {
        vec![
            AlertRule {
                id: "RULE-01".to_string(),
                name: "High CO Warning".to_string(),
                threshold: 10.0,
                timeframe: 5,
                enabled: true,
            },
            AlertRule {
                id: "RULE-02".to_string(),
                name: "Critical CO Alert".to_string(),
                threshold: 50.0,
                timeframe: 1,
                enabled: true,
            },
            AlertRule {
                id: "RULE-03".to_string(),
                name: "Sustained Low-level CO".to_string(),
                threshold: 5.0,
                timeframe: 60,
                enabled: false,
            },
        ]
    }

    /// Human-readable trigger description.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "Triggers when CO level is above {} ppm for {} min.",
            self.threshold, self.timeframe
        )
    }

    /// Validate the rule, returning every failure.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.id.trim().is_empty() {
            errors.push(FieldError::new("id", "rule id cannot be empty"));
        }
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "rule name cannot be empty"));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            errors.push(FieldError::new(
                "threshold",
                format!("threshold {} must be a non-negative number", self.threshold),
            ));
        }
        if self.timeframe == 0 {
            errors.push(FieldError::new("timeframe", "timeframe must be at least 1 minute"));
        }
        errors
    }
}

/// Device counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceSummary {
    pub normal: usize,
    pub warning: usize,
    pub critical: usize,
    pub offline: usize,
}

impl DeviceSummary {
    /// Count devices by status.
    pub fn from_devices(devices: &[SensorDevice]) -> Self {
        devices.iter().fold(Self::default(), |mut acc, device| {
            match device.status {
                DeviceStatus::Normal => acc.normal += 1,
                DeviceStatus::Warning => acc.warning += 1,
                DeviceStatus::Critical => acc.critical += 1,
                DeviceStatus::Offline => acc.offline += 1,
            }
            acc
        })
    }

    /// Total number of devices counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.normal + self.warning + self.critical + self.offline
    }
}

/// System-wide status derived from the worst device.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OverallStatus {
    /// Normal, Warning or Critical (never Offline).
    pub status: DeviceStatus,
    pub message: String,
}

impl OverallStatus {
    /// Derive the banner status: any Critical wins, then any Warning.
    pub fn from_devices(devices: &[SensorDevice]) -> Self {
        if let Some(device) = devices.iter().find(|d| d.status == DeviceStatus::Critical) {
            return Self {
                status: DeviceStatus::Critical,
                message: format!(
                    "Critical CO level detected at {}. Immediate action required.",
                    device.location.name
                ),
            };
        }
        if let Some(device) = devices.iter().find(|d| d.status == DeviceStatus::Warning) {
            return Self {
                status: DeviceStatus::Warning,
                message: format!(
                    "Elevated CO level detected at {}. Please monitor the situation.",
                    device.location.name
                ),
            };
        }
        Self {
            status: DeviceStatus::Normal,
            message: "All sensor readings are within normal parameters.".to_string(),
        }
    }
}

/// Battery classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BatteryLevel {
    /// Below 20%.
    Low,
    /// Below 50%.
    Medium,
    Good,
}

impl BatteryLevel {
    #[must_use]
    pub fn from_percent(percent: u8) -> Self {
        if percent < 20 {
            BatteryLevel::Low
        } else if percent < 50 {
            BatteryLevel::Medium
        } else {
            BatteryLevel::Good
        }
    }
}
