use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Mutex;

use serde_json::Value;

use crate::adapters::husqvarna::{MowerApi, MowerApiError, RobotClient};
use crate::domain::entity::{TrackerSink, TrackerUpdate};
use crate::domain::models::RobotMeta;
use crate::domain::mower_state::{Clock, TimestampMs};

#[derive(Debug, Clone)]
pub enum FakeResponse {
    Status(Value),
    Timeout,
}

impl FakeResponse {
    fn into_result(self) -> Result<Value, MowerApiError> {
        match self {
            Self::Status(payload) => Ok(payload),
            Self::Timeout => Err(MowerApiError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "fake status timed out",
            ))),
        }
    }
}

#[derive(Debug)]
pub struct FakeRobotClient {
    robot_id: String,
    responses: Mutex<VecDeque<FakeResponse>>,
}

impl FakeRobotClient {
    pub fn new(robot_id: &str, responses: Vec<FakeResponse>) -> Self {
        Self {
            robot_id: robot_id.to_string(),
            responses: Mutex::new(responses.into()),
        }
    }
}

impl RobotClient for FakeRobotClient {
    fn robot_id(&self) -> &str {
        &self.robot_id
    }

    fn status(&self) -> Result<Value, MowerApiError> {
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| MowerApiError::Io(io::Error::other("fake responses lock poisoned")))?;

        responses
            .pop_front()
            .unwrap_or(FakeResponse::Timeout)
            .into_result()
    }
}

pub struct FakeMowerApi {
    password: String,
    robots: Vec<RobotMeta>,
    responses: HashMap<String, Vec<FakeResponse>>,
    logged_in: bool,
}

impl FakeMowerApi {
    pub fn new(password: &str) -> Self {
        Self {
            password: password.to_string(),
            robots: Vec::new(),
            responses: HashMap::new(),
            logged_in: false,
        }
    }

    pub fn with_robot(mut self, id: &str, model: &str, responses: Vec<FakeResponse>) -> Self {
        self.robots.push(meta(id, model));
        self.responses.insert(id.to_string(), responses);
        self
    }
}

impl MowerApi for FakeMowerApi {
    type Client = FakeRobotClient;

    fn login(&mut self, _username: &str, password: &str) -> Result<(), MowerApiError> {
        if password != self.password {
            return Err(MowerApiError::Authentication(
                "login rejected with status 401".to_string(),
            ));
        }
        self.logged_in = true;
        Ok(())
    }

    fn list_robots(&self) -> Result<Vec<RobotMeta>, MowerApiError> {
        if !self.logged_in {
            return Err(MowerApiError::NotLoggedIn);
        }
        Ok(self.robots.clone())
    }

    fn select_robot(&self, robot_id: &str) -> Result<Self::Client, MowerApiError> {
        let responses = self
            .responses
            .get(robot_id)
            .ok_or_else(|| MowerApiError::UnknownRobot(robot_id.to_string()))?;
        Ok(FakeRobotClient::new(robot_id, responses.clone()))
    }

    fn logout(&mut self) -> Result<(), MowerApiError> {
        if !self.logged_in {
            return Err(MowerApiError::NotLoggedIn);
        }
        self.logged_in = false;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTrackerSink {
    updates: Mutex<Vec<TrackerUpdate>>,
}

impl RecordingTrackerSink {
    pub fn updates(&self) -> Vec<TrackerUpdate> {
        self.updates
            .lock()
            .expect("tracker updates lock should be available")
            .clone()
    }
}

impl TrackerSink for RecordingTrackerSink {
    fn see(&self, update: TrackerUpdate) {
        self.updates
            .lock()
            .expect("tracker updates lock should be available")
            .push(update);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> TimestampMs {
        TimestampMs(self.0)
    }
}

pub fn meta(id: &str, model: &str) -> RobotMeta {
    RobotMeta {
        id: id.to_string(),
        name: format!("Mower {id}"),
        model: model.to_string(),
    }
}

pub fn status_payload(state: &str, battery: u8) -> Value {
    serde_json::json!({
        "mowerStatus": state,
        "batteryPercent": battery,
        "lastLocations": [{"latitude": 57.7, "longitude": 11.9}],
        "cachedSettingsUUID": "cached"
    })
}
