use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::models::Location;

pub const MOWER_STATUS_KEY: &str = "mowerStatus";
pub const BATTERY_PERCENT_KEY: &str = "batteryPercent";
pub const LAST_ERROR_CODE_KEY: &str = "lastErrorCode";
pub const LAST_ERROR_MESSAGE_KEY: &str = "lastErrorMessage";
pub const LAST_ERROR_CODE_TIMESTAMP_KEY: &str = "lastErrorCodeTimestamp";
pub const NEXT_START_TIMESTAMP_KEY: &str = "nextStartTimestamp";
pub const STORED_TIMESTAMP_KEY: &str = "storedTimestamp";
pub const LAST_LOCATIONS_KEY: &str = "lastLocations";

/// Vendor-internal fields that must never reach consumers.
pub const IGNORED_ATTRIBUTES: &[&str] = &["cachedSettingsUUID", LAST_LOCATIONS_KEY, "valueFound"];

const ERROR_MESSAGES: &[(i64, &str)] = &[
    (1, "Outside working area"),
    (2, "No loop signal"),
    (3, "Wrong loop signal"),
    (4, "Loop sensor problem, front"),
    (5, "Loop sensor problem, rear"),
    (6, "Loop sensor problem, left"),
    (7, "Loop sensor problem, right"),
    (8, "Wrong PIN code"),
    (9, "Trapped"),
    (10, "Upside down"),
    (11, "Low battery"),
    (12, "Empty battery"),
    (13, "No drive"),
    (14, "Mower lifted"),
    (15, "Lifted"),
    (16, "Stuck in charging station"),
    (17, "Charging station blocked"),
    (18, "Collision sensor problem, rear"),
    (19, "Collision sensor problem, front"),
    (20, "Wheel motor blocked, right"),
    (21, "Wheel motor blocked, left"),
    (22, "Wheel drive problem, right"),
    (23, "Wheel drive problem, left"),
    (24, "Cutting system blocked"),
    (25, "Cutting system blocked"),
];

#[derive(Clone, Copy)]
enum TimestampScale {
    Millis,
    // storedTimestamp is read as whole seconds; sub-second precision is dropped.
    StoredWholeSeconds,
}

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("status payload must be a JSON object")]
    InvalidPayloadType,
    #[error("malformed status payload: missing or invalid {0}")]
    MalformedStatusPayload(&'static str),
    #[error("invalid timestamp in field {0}")]
    InvalidTimestamp(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedStatus {
    pub mower_status: String,
    pub battery_percent: u8,
    pub last_error_code: Option<i64>,
    pub last_error_message: Option<&'static str>,
    pub last_error_code_timestamp: Option<DateTime<Utc>>,
    pub next_start_timestamp: Option<DateTime<Utc>>,
    pub stored_timestamp: Option<DateTime<Utc>>,
    /// Most recent first. Kept for the tracker, never rendered as an attribute.
    pub last_locations: Vec<Location>,
    pub passthrough: Map<String, Value>,
}

impl NormalizedStatus {
    pub fn latest_location(&self) -> Option<Location> {
        self.last_locations.first().copied()
    }

    /// Display mapping with denylisted fields removed and timestamps rendered as RFC 3339.
    pub fn attributes(&self) -> Map<String, Value> {
        let mut attributes = self.passthrough.clone();

        attributes.insert(
            MOWER_STATUS_KEY.to_string(),
            Value::String(self.mower_status.clone()),
        );
        attributes.insert(
            BATTERY_PERCENT_KEY.to_string(),
            Value::from(self.battery_percent),
        );
        if let Some(code) = self.last_error_code {
            attributes.insert(LAST_ERROR_CODE_KEY.to_string(), Value::from(code));
        }
        attributes.insert(
            LAST_ERROR_MESSAGE_KEY.to_string(),
            self.last_error_message
                .map_or(Value::Null, |message| Value::String(message.to_string())),
        );

        for (key, timestamp) in [
            (LAST_ERROR_CODE_TIMESTAMP_KEY, self.last_error_code_timestamp),
            (NEXT_START_TIMESTAMP_KEY, self.next_start_timestamp),
            (STORED_TIMESTAMP_KEY, self.stored_timestamp),
        ] {
            if let Some(timestamp) = timestamp {
                attributes.insert(key.to_string(), Value::String(format_utc(timestamp)));
            }
        }

        attributes
    }
}

pub fn error_message(code: i64) -> Option<&'static str> {
    ERROR_MESSAGES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, message)| *message)
}

pub fn format_utc(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn normalize(raw: &Value) -> Result<NormalizedStatus, NormalizeError> {
    let object = raw.as_object().ok_or(NormalizeError::InvalidPayloadType)?;

    let mower_status = object
        .get(MOWER_STATUS_KEY)
        .and_then(Value::as_str)
        .ok_or(NormalizeError::MalformedStatusPayload(MOWER_STATUS_KEY))?
        .to_string();

    let battery_percent = object
        .get(BATTERY_PERCENT_KEY)
        .and_then(battery_level)
        .ok_or(NormalizeError::MalformedStatusPayload(BATTERY_PERCENT_KEY))?;

    let last_error_code = match object.get(LAST_ERROR_CODE_KEY) {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .as_i64()
                .ok_or(NormalizeError::MalformedStatusPayload(LAST_ERROR_CODE_KEY))?,
        ),
    };

    let last_error_code_timestamp = convert_timestamp(
        object,
        LAST_ERROR_CODE_TIMESTAMP_KEY,
        TimestampScale::Millis,
    )?;
    let next_start_timestamp =
        convert_timestamp(object, NEXT_START_TIMESTAMP_KEY, TimestampScale::Millis)?;
    let stored_timestamp = convert_timestamp(
        object,
        STORED_TIMESTAMP_KEY,
        TimestampScale::StoredWholeSeconds,
    )?;

    let passthrough = object
        .iter()
        .filter(|(key, _)| !is_typed_key(key) && !IGNORED_ATTRIBUTES.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(NormalizedStatus {
        mower_status,
        battery_percent,
        last_error_code,
        last_error_message: last_error_code.and_then(error_message),
        last_error_code_timestamp,
        next_start_timestamp,
        stored_timestamp,
        last_locations: parse_locations(object.get(LAST_LOCATIONS_KEY)),
        passthrough,
    })
}

fn is_typed_key(key: &str) -> bool {
    matches!(
        key,
        MOWER_STATUS_KEY
            | BATTERY_PERCENT_KEY
            | LAST_ERROR_CODE_KEY
            | LAST_ERROR_MESSAGE_KEY
            | LAST_ERROR_CODE_TIMESTAMP_KEY
            | NEXT_START_TIMESTAMP_KEY
            | STORED_TIMESTAMP_KEY
            | LAST_LOCATIONS_KEY
    )
}

fn convert_timestamp(
    object: &Map<String, Value>,
    key: &'static str,
    scale: TimestampScale,
) -> Result<Option<DateTime<Utc>>, NormalizeError> {
    let raw = match object.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };

    let millis = epoch_millis(raw).ok_or(NormalizeError::InvalidTimestamp(key))?;
    let converted = match scale {
        TimestampScale::Millis => DateTime::<Utc>::from_timestamp_millis(millis),
        TimestampScale::StoredWholeSeconds => {
            DateTime::<Utc>::from_timestamp(millis.div_euclid(1000), 0)
        }
    };

    converted
        .map(Some)
        .ok_or(NormalizeError::InvalidTimestamp(key))
}

fn epoch_millis(value: &Value) -> Option<i64> {
    if let Some(millis) = value.as_i64() {
        return Some(millis);
    }

    let millis = value.as_f64()?;
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return None;
    }

    Some(millis.floor() as i64)
}

// Whole percentages only; `77.0` is accepted, `77.5` is not.
fn battery_level(value: &Value) -> Option<u8> {
    if let Some(level) = value.as_u64() {
        return u8::try_from(level).ok().filter(|level| *level <= 100);
    }

    let level = value.as_f64()?;
    if level.fract() != 0.0 || !(0.0..=100.0).contains(&level) {
        return None;
    }

    Some(level as u8)
}

fn parse_locations(value: Option<&Value>) -> Vec<Location> {
    let Some(entries) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            Some(Location {
                latitude: entry.get("latitude")?.as_f64()?,
                longitude: entry.get("longitude")?.as_f64()?,
            })
        })
        .collect()
}
