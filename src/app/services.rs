use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::domain::entity::{PollHealth, SensorSink, SensorView, TrackerSink, TrackerUpdate};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("entity store lock poisoned")]
    StoreLockPoisoned,
}

pub trait EntityQueryHandler {
    fn list_sensors(&self) -> Result<Vec<SensorView>, ServiceError>;
    fn get_sensor(&self, unique_id: &str) -> Result<Option<SensorView>, ServiceError>;
    fn list_trackers(&self) -> Result<Vec<TrackerUpdate>, ServiceError>;
    fn get_tracker(&self, dev_id: &str) -> Result<Option<TrackerUpdate>, ServiceError>;
    fn list_health(&self) -> Result<Vec<PollHealth>, ServiceError>;
}

#[derive(Debug, Default)]
struct EntityTable {
    sensors: Vec<SensorView>,
    trackers: Vec<TrackerUpdate>,
    health: Vec<PollHealth>,
}

/// Host-side entity state, written by the poller and read by the HTTP surface.
#[derive(Clone, Default)]
pub struct SharedEntityStore {
    table: Arc<Mutex<EntityTable>>,
}

impl SharedEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_table<T>(&self, op: impl FnOnce(&mut EntityTable) -> T) -> Result<T, ServiceError> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| ServiceError::StoreLockPoisoned)?;
        Ok(op(&mut table))
    }
}

fn upsert<T>(items: &mut Vec<T>, item: T, same: impl Fn(&T, &T) -> bool) {
    match items.iter_mut().find(|existing| same(&**existing, &item)) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

impl EntityQueryHandler for SharedEntityStore {
    fn list_sensors(&self) -> Result<Vec<SensorView>, ServiceError> {
        self.with_table(|table| table.sensors.clone())
    }

    fn get_sensor(&self, unique_id: &str) -> Result<Option<SensorView>, ServiceError> {
        self.with_table(|table| {
            table
                .sensors
                .iter()
                .find(|sensor| sensor.unique_id == unique_id)
                .cloned()
        })
    }

    fn list_trackers(&self) -> Result<Vec<TrackerUpdate>, ServiceError> {
        self.with_table(|table| table.trackers.clone())
    }

    fn get_tracker(&self, dev_id: &str) -> Result<Option<TrackerUpdate>, ServiceError> {
        self.with_table(|table| {
            table
                .trackers
                .iter()
                .find(|tracker| tracker.dev_id == dev_id)
                .cloned()
        })
    }

    fn list_health(&self) -> Result<Vec<PollHealth>, ServiceError> {
        self.with_table(|table| table.health.clone())
    }
}

impl SensorSink for SharedEntityStore {
    fn publish_sensor(&self, view: SensorView) {
        let result = self.with_table(|table| {
            upsert(&mut table.sensors, view, |a, b| a.unique_id == b.unique_id)
        });
        if let Err(error) = result {
            tracing::warn!(error = %error, "dropping sensor update");
        }
    }

    fn report_health(&self, health: PollHealth) {
        let result =
            self.with_table(|table| upsert(&mut table.health, health, |a, b| a.dev_id == b.dev_id));
        if let Err(error) = result {
            tracing::warn!(error = %error, "dropping poll health update");
        }
    }
}

impl TrackerSink for SharedEntityStore {
    fn see(&self, update: TrackerUpdate) {
        let result = self.with_table(|table| {
            upsert(&mut table.trackers, update, |a, b| a.dev_id == b.dev_id)
        });
        if let Err(error) = result {
            tracing::warn!(error = %error, "dropping tracker update");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{EntityQueryHandler, SharedEntityStore};
    use crate::domain::entity::{SensorSink, TrackerSink, sensor_view, tracker_update};
    use crate::domain::status::normalize;
    use crate::test_support::meta;

    #[test]
    fn sensor_updates_replace_previous_view() {
        let store = SharedEntityStore::new();
        let robot = meta("a", "H");

        for battery in [90, 60] {
            let status = normalize(&json!({"mowerStatus": "OK_CUTTING", "batteryPercent": battery}))
                .expect("payload must normalize");
            store.publish_sensor(sensor_view(&robot, &status, false));
        }

        let sensors = store.list_sensors().expect("store should be readable");
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].battery_level, 60);
        assert_eq!(
            store
                .get_sensor("automower_automower_450x_a")
                .expect("store should be readable")
                .map(|sensor| sensor.battery_level),
            Some(60)
        );
    }

    #[test]
    fn keeps_publish_order_across_devices() {
        let store = SharedEntityStore::new();
        let status = normalize(&json!({"mowerStatus": "PAUSED", "batteryPercent": 30}))
            .expect("payload must normalize");

        for id in ["z", "a"] {
            store.see(tracker_update(&meta(id, "H"), &status));
        }

        let trackers = store.list_trackers().expect("store should be readable");
        let ids: Vec<&str> = trackers.iter().map(|t| t.dev_id.as_str()).collect();
        assert_eq!(ids, vec!["automower_automower_450x_z", "automower_automower_450x_a"]);
        assert!(
            store
                .get_tracker("unknown")
                .expect("store should be readable")
                .is_none()
        );
    }
}
