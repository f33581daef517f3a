//! Read-only projections of a mower's last normalized status.
//!
//! The sensor view is what the host exposes as a state entity; the tracker
//! update is what gets handed to a device tracker's `see` callback.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::models::{MowerPhase, RobotMeta};
use crate::domain::status::{BATTERY_PERCENT_KEY, LAST_LOCATIONS_KEY, NormalizedStatus};

pub const DEVICE_ID_PREFIX: &str = "automower";
pub const VENDOR: &str = "Husqvarna";
pub const DEFAULT_ICON: &str = "mdi:robot";

const STATE_ICONS: &[(&str, &str)] = &[
    ("ERROR", "mdi:alert"),
    ("OK_CHARGING", "mdi:power-plug"),
    ("PARKED_TIMER", "mdi:timetable"),
    ("OK_CUTTING", "mdi:grass"),
    ("OK_SEARCHING", "mdi:magnify"),
    ("PAUSED", "mdi:pause"),
    ("PARKED_PARKED_SELECTED", "mdi:parking"),
];

const MODELS: &[(&str, &str)] = &[("H", "Automower 450X")];

// Already first-class on the sensor view.
const SENSOR_PROPERTY_KEYS: &[&str] = &[
    "id",
    "name",
    "model",
    "icon",
    BATTERY_PERCENT_KEY,
    LAST_LOCATIONS_KEY,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorView {
    pub unique_id: String,
    pub name: String,
    pub model: String,
    pub icon: &'static str,
    pub state: String,
    pub battery_level: u8,
    pub stale: bool,
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerUpdate {
    pub dev_id: String,
    pub host_name: String,
    pub battery: u8,
    pub gps: Option<(f64, f64)>,
    pub attributes: TrackerAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerAttributes {
    pub status: String,
    pub id: String,
    pub name: String,
    pub icon: &'static str,
    pub vendor: &'static str,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollHealth {
    pub dev_id: String,
    pub name: String,
    pub phase: MowerPhase,
    pub stale: bool,
    pub consecutive_failures: u32,
    pub last_success_at: Option<String>,
    pub last_error: Option<String>,
}

/// Receives the sensor projection whenever a mower has a status (marked stale
/// after a failed poll) and the poll health after every attempt.
pub trait SensorSink: Send + Sync {
    fn publish_sensor(&self, view: SensorView);
    fn report_health(&self, health: PollHealth);
}

/// Location callback in the shape of a device tracker's `see`.
pub trait TrackerSink: Send + Sync {
    fn see(&self, update: TrackerUpdate);
}

pub fn resolve_icon(state: &str) -> &'static str {
    STATE_ICONS
        .iter()
        .find(|(known, _)| *known == state)
        .map_or(DEFAULT_ICON, |(_, icon)| *icon)
}

pub fn resolve_model(code: &str) -> String {
    MODELS
        .iter()
        .find(|(known, _)| *known == code)
        .map_or_else(|| code.to_string(), |(_, name)| (*name).to_string())
}

pub fn device_id(model_name: &str, id: &str) -> String {
    slugify(&format!("{DEVICE_ID_PREFIX}_{model_name}_{id}"))
}

pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_separator = false;

    for char in value.chars() {
        if char.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(char.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}

pub fn sensor_view(meta: &RobotMeta, status: &NormalizedStatus, stale: bool) -> SensorView {
    let model = resolve_model(&meta.model);
    let mut attributes = status.attributes();
    for key in SENSOR_PROPERTY_KEYS {
        attributes.remove(*key);
    }

    SensorView {
        unique_id: device_id(&model, &meta.id),
        name: meta.name.clone(),
        icon: resolve_icon(&status.mower_status),
        state: status.mower_status.clone(),
        battery_level: status.battery_percent,
        stale,
        attributes,
        model,
    }
}

pub fn tracker_update(meta: &RobotMeta, status: &NormalizedStatus) -> TrackerUpdate {
    let model = resolve_model(&meta.model);
    let dev_id = device_id(&model, &meta.id);
    let icon = resolve_icon(&status.mower_status);

    TrackerUpdate {
        host_name: meta.name.clone(),
        battery: status.battery_percent,
        gps: status
            .latest_location()
            .map(|location| (location.latitude, location.longitude)),
        attributes: TrackerAttributes {
            status: status.mower_status.clone(),
            id: dev_id.clone(),
            name: meta.name.clone(),
            icon,
            vendor: VENDOR,
            model,
        },
        dev_id,
    }
}
