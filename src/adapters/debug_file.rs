use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::Mutex;

use serde::Deserialize;
use serde_json::Value;

use crate::adapters::husqvarna::{MowerApi, MowerApiError, RobotClient};
use crate::domain::models::RobotMeta;

#[derive(Debug, Clone, Deserialize)]
struct ScriptFile {
    #[serde(default = "default_loop")]
    loop_forever: bool,
    credentials: Option<ScriptCredentials>,
    robots: Vec<RobotMeta>,
    #[serde(default)]
    status: HashMap<String, Vec<ScriptEvent>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ScriptCredentials {
    username: String,
    password: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ScriptEvent {
    ok: Option<Value>,
    error: Option<String>,
}

/// Replays a recorded account from a JSON script instead of talking to the cloud.
#[derive(Debug)]
pub struct ScriptedMowerApi {
    script: ScriptFile,
    logged_in: bool,
}

/// Robot handle with its own replay cursor.
#[derive(Debug)]
pub struct ScriptedRobotClient {
    robot_id: String,
    events: Vec<ScriptEvent>,
    loop_forever: bool,
    cursor: Mutex<usize>,
}

fn default_loop() -> bool {
    true
}

impl ScriptedMowerApi {
    pub fn from_file(path: &str) -> Result<Self, MowerApiError> {
        let content = fs::read_to_string(path).map_err(MowerApiError::Io)?;
        let script: ScriptFile = serde_json::from_str(&content).map_err(MowerApiError::Json)?;

        if let Some(robot) = script
            .robots
            .iter()
            .find(|robot| script.status.get(&robot.id).is_none_or(Vec::is_empty))
        {
            return Err(MowerApiError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "debug script must contain at least one status event for robot {}",
                    robot.id
                ),
            )));
        }

        Ok(Self {
            script,
            logged_in: false,
        })
    }

    fn ensure_logged_in(&self) -> Result<(), MowerApiError> {
        if self.logged_in {
            Ok(())
        } else {
            Err(MowerApiError::NotLoggedIn)
        }
    }
}

impl MowerApi for ScriptedMowerApi {
    type Client = ScriptedRobotClient;

    fn login(&mut self, username: &str, password: &str) -> Result<(), MowerApiError> {
        let rejected = self.script.credentials.as_ref().is_some_and(|expected| {
            expected.username != username || expected.password != password
        });
        if rejected {
            return Err(MowerApiError::Authentication(
                "credentials do not match debug script".to_string(),
            ));
        }

        self.logged_in = true;
        Ok(())
    }

    fn list_robots(&self) -> Result<Vec<RobotMeta>, MowerApiError> {
        self.ensure_logged_in()?;
        Ok(self.script.robots.clone())
    }

    fn select_robot(&self, robot_id: &str) -> Result<Self::Client, MowerApiError> {
        self.ensure_logged_in()?;
        let robot = self
            .script
            .robots
            .iter()
            .find(|robot| robot.id == robot_id || robot.name == robot_id)
            .ok_or_else(|| MowerApiError::UnknownRobot(robot_id.to_string()))?;

        Ok(ScriptedRobotClient {
            robot_id: robot.id.clone(),
            events: self
                .script
                .status
                .get(&robot.id)
                .cloned()
                .unwrap_or_default(),
            loop_forever: self.script.loop_forever,
            cursor: Mutex::new(0),
        })
    }

    fn logout(&mut self) -> Result<(), MowerApiError> {
        self.logged_in = false;
        Ok(())
    }
}

impl ScriptedRobotClient {
    fn next_event(&self) -> Result<ScriptEvent, MowerApiError> {
        let mut cursor = self
            .cursor
            .lock()
            .map_err(|_| MowerApiError::Io(io::Error::other("debug replay cursor lock poisoned")))?;

        if *cursor >= self.events.len() {
            if self.loop_forever {
                *cursor = 0;
            } else {
                return Err(MowerApiError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "debug replay finished",
                )));
            }
        }

        let event = self.events.get(*cursor).cloned().ok_or_else(|| {
            MowerApiError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "debug script event index out of bounds",
            ))
        })?;

        *cursor = cursor.saturating_add(1);

        Ok(event)
    }

    fn execute_event(event: ScriptEvent) -> Result<Value, MowerApiError> {
        match (event.ok, event.error) {
            (Some(payload), None) => Ok(payload),
            (None, Some(error)) => Err(map_script_error(&error)),
            _ => Err(MowerApiError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "script event must contain exactly one of: ok or error",
            ))),
        }
    }
}

fn map_script_error(kind: &str) -> MowerApiError {
    let normalized = kind.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "timeout" => MowerApiError::Io(io::Error::new(io::ErrorKind::TimedOut, kind)),
        "network_unreachable" | "internet_down" => {
            MowerApiError::Io(io::Error::new(io::ErrorKind::NetworkUnreachable, kind))
        }
        "connection_refused" => {
            MowerApiError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, kind))
        }
        "session_expired" => MowerApiError::Authentication(kind.to_string()),
        "server_error" => MowerApiError::UnexpectedStatus {
            status: 503,
            endpoint: "debug-script".to_string(),
        },
        "invalid_json" => match serde_json::from_str::<Value>("not json") {
            Err(parse_err) => MowerApiError::Json(parse_err),
            Ok(_) => MowerApiError::Io(io::Error::new(io::ErrorKind::InvalidData, kind)),
        },
        _ => MowerApiError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unknown scripted error kind: {kind}"),
        )),
    }
}

impl RobotClient for ScriptedRobotClient {
    fn robot_id(&self) -> &str {
        &self.robot_id
    }

    fn status(&self) -> Result<Value, MowerApiError> {
        Self::execute_event(self.next_event()?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{ErrorKind, Write};

    use crate::adapters::husqvarna::{MowerApi, MowerApiError, RobotClient};

    use super::ScriptedMowerApi;

    fn fixture(path: &str) -> String {
        format!(
            "{}/testdata/debug/{path}",
            env!("CARGO_MANIFEST_DIR").replace("\\", "/")
        )
    }

    fn logged_in(path: &str) -> ScriptedMowerApi {
        let mut api = ScriptedMowerApi::from_file(&fixture(path)).expect("script should load");
        api.login("user@example.com", "secret")
            .expect("login should succeed");
        api
    }

    #[test]
    fn lists_scripted_robots() {
        let api = logged_in("two_mowers.json");

        let robots = api.list_robots().expect("robots should be listed");

        assert_eq!(robots.len(), 2);
        assert_eq!(robots[0].name, "Front lawn");
        assert_eq!(robots[1].model, "H");
    }

    #[test]
    fn replays_and_loops_status_per_robot() {
        let api = logged_in("two_mowers.json");
        let front = api.select_robot("front-1").expect("robot should be selected");
        let back = api.select_robot("Back lawn").expect("robot should be selected");

        let a = front.status().expect("status #1 should succeed");
        let b = front.status().expect("status #2 should succeed");
        let c = front.status().expect("status should loop to first event");
        let other = back.status().expect("independent cursor");

        assert_eq!(a["batteryPercent"], 77);
        assert_eq!(b["batteryPercent"], 76);
        assert_eq!(c["batteryPercent"], 77);
        assert_eq!(other["mowerStatus"], "OK_CHARGING");
        assert_eq!(back.robot_id(), "back-2");
    }

    #[test]
    fn simulates_network_failures() {
        let api = logged_in("network_failures.json");
        let client = api.select_robot("front-1").expect("robot should be selected");

        let first = client.status().expect_err("first event should time out");
        let second = client.status().expect_err("second event should be unreachable");

        match first {
            MowerApiError::Io(io) => assert_eq!(io.kind(), ErrorKind::TimedOut),
            other => panic!("expected io error, got {other:?}"),
        }
        match second {
            MowerApiError::Io(io) => assert_eq!(io.kind(), ErrorKind::NetworkUnreachable),
            other => panic!("expected io error, got {other:?}"),
        }
        assert!(client.status().is_ok());
    }

    #[test]
    fn rejects_wrong_credentials() {
        let mut api =
            ScriptedMowerApi::from_file(&fixture("two_mowers.json")).expect("script should load");

        match api.login("user@example.com", "wrong") {
            Err(MowerApiError::Authentication(_)) => {}
            other => panic!("expected authentication error, got {other:?}"),
        }
        assert!(matches!(api.list_robots(), Err(MowerApiError::NotLoggedIn)));
    }

    #[test]
    fn finite_script_reports_end_of_replay() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file should be created");
        write!(
            file,
            r#"{{
                "loop_forever": false,
                "robots": [{{"id": "solo", "name": "Solo", "model": "H"}}],
                "status": {{"solo": [{{"ok": {{"mowerStatus": "PAUSED", "batteryPercent": 12}}}}]}}
            }}"#
        )
        .expect("script should be written");

        let mut api = ScriptedMowerApi::from_file(file.path().to_string_lossy().as_ref())
            .expect("script should load");
        api.login("anyone", "anything").expect("script has no credentials");
        let client = api.select_robot("solo").expect("robot should be selected");

        assert!(client.status().is_ok());
        match client.status() {
            Err(MowerApiError::Io(io)) => assert_eq!(io.kind(), ErrorKind::UnexpectedEof),
            other => panic!("expected end of replay, got {other:?}"),
        }
    }

    #[test]
    fn rejects_script_without_status_events() {
        let err = ScriptedMowerApi::from_file(&fixture("missing_status.json"))
            .expect_err("robot without events should fail");

        match err {
            MowerApiError::Io(io) => assert_eq!(io.kind(), ErrorKind::InvalidData),
            other => panic!("expected invalid data io error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_script_with_invalid_top_level_json() {
        let err = ScriptedMowerApi::from_file(&fixture("invalid_top_level_json.json"))
            .expect_err("invalid json should fail");

        match err {
            MowerApiError::Json(_) => {}
            other => panic!("expected json parse error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_error_kind() {
        let api = logged_in("unknown_error_kind.json");
        let client = api.select_robot("front-1").expect("robot should be selected");

        match client.status() {
            Err(MowerApiError::Io(io)) => assert_eq!(io.kind(), ErrorKind::InvalidInput),
            other => panic!("expected invalid input io error, got {other:?}"),
        }
    }
}
