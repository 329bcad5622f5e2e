//! Validation of device ingestion payloads.
//!
//! Ingestion bodies must carry every device field except `lastReading`,
//! which the server stamps. Validation reports every offending field.

use serde_json::{Map, Value};
use time::OffsetDateTime;

use airwatch_types::{DevicePatch, DeviceStatus, FieldError, LocationPatch, MAX_BATTERY};

/// Build a complete patch from an ingestion body.
pub fn parse_ingest(body: &Value, now: OffsetDateTime) -> Result<DevicePatch, Vec<FieldError>> {
    let Some(object) = body.as_object() else {
        return Err(vec![FieldError::new("body", "expected a JSON object")]);
    };

    let mut errors = Vec::new();

    let id = string(object, "id", "id", &mut errors);
    let name = string(object, "name", "name", &mut errors);

    let location = match object.get("location") {
        Some(Value::Object(location)) => {
            let lat = number(location, "lat", "location.lat", &mut errors);
            let lng = number(location, "lng", "location.lng", &mut errors);
            let name = string(location, "name", "location.name", &mut errors);
            Some(LocationPatch { lat, lng, name })
        }
        None | Some(Value::Null) => {
            errors.push(FieldError::new("location", "is required"));
            None
        }
        Some(_) => {
            errors.push(FieldError::new("location", "must be an object"));
            None
        }
    };

    let status = string(object, "status", "status", &mut errors).and_then(|s| {
        s.parse::<DeviceStatus>()
            .map_err(|_| {
                errors.push(FieldError::new(
                    "status",
                    format!(
                        "must be one of Normal, Warning, Critical, Offline, got '{}'",
                        s
                    ),
                ))
            })
            .ok()
    });

    let battery = number(object, "battery", "battery", &mut errors).and_then(|b| {
        if b.fract() == 0.0 && (0.0..=f64::from(MAX_BATTERY)).contains(&b) {
            Some(b as u8)
        } else {
            errors.push(FieldError::new(
                "battery",
                format!("battery {} must be a whole number 0-{}", b, MAX_BATTERY),
            ));
            None
        }
    });

    let co_level = number(object, "coLevel", "coLevel", &mut errors);

    let patch = DevicePatch {
        id: id.unwrap_or_default(),
        name,
        location,
        status,
        battery,
        co_level,
        last_reading: Some(now),
    };

    // Range checks for the fields that parsed
    for error in patch.validate() {
        if !errors.iter().any(|e| e.field == error.field) {
            errors.push(error);
        }
    }

    if errors.is_empty() {
        Ok(patch)
    } else {
        Err(errors)
    }
}

fn string(
    object: &Map<String, Value>,
    key: &str,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match object.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        None | Some(Value::Null) => {
            errors.push(FieldError::new(field, "is required"));
            None
        }
        Some(_) => {
            errors.push(FieldError::new(field, "must be a string"));
            None
        }
    }
}

fn number(
    object: &Map<String, Value>,
    key: &str,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<f64> {
    match object.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        None | Some(Value::Null) => {
            errors.push(FieldError::new(field, "is required"));
            None
        }
        Some(_) => {
            errors.push(FieldError::new(field, "must be a number"));
            None
        }
    }
}
