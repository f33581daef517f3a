use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde_json::{Value, json};
use thiserror::Error;

use crate::domain::models::RobotMeta;

pub const DEFAULT_IM_URL: &str = "https://tracker-id-ws.husqvarna.net/imservice/rest";
pub const DEFAULT_TRACK_URL: &str = "https://tracker-api-ws.husqvarna.net/api";

const SESSION_TOKEN_HEADER: &str = "Session-Token";
const LOGIN_LANGUAGE: &str = "en-US";

/// Authenticated account session able to hand out one client per robot.
pub trait MowerApi {
    type Client: RobotClient;

    fn login(&mut self, username: &str, password: &str) -> Result<(), MowerApiError>;
    fn list_robots(&self) -> Result<Vec<RobotMeta>, MowerApiError>;
    fn select_robot(&self, robot_id: &str) -> Result<Self::Client, MowerApiError>;
    /// Ends the account session. Clients already handed out keep their own token.
    fn logout(&mut self) -> Result<(), MowerApiError>;
}

/// Handle bound to exactly one selected robot.
pub trait RobotClient: Send + 'static {
    fn robot_id(&self) -> &str;
    fn status(&self) -> Result<Value, MowerApiError>;
}

#[derive(Debug, Error)]
pub enum MowerApiError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("api session is not logged in")]
    NotLoggedIn,
    #[error("unknown robot: {0}")]
    UnknownRobot(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response status {status} from {endpoint}")]
    UnexpectedStatus { status: u16, endpoint: String },
    #[error("failed to parse response as JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HusqvarnaEndpoints {
    pub im_url: String,
    pub track_url: String,
}

impl Default for HusqvarnaEndpoints {
    fn default() -> Self {
        Self {
            im_url: DEFAULT_IM_URL.to_string(),
            track_url: DEFAULT_TRACK_URL.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct HusqvarnaApi {
    http: Client,
    endpoints: HusqvarnaEndpoints,
    session_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HusqvarnaRobotClient {
    http: Client,
    robot_id: String,
    status_url: String,
    session_token: String,
}

impl HusqvarnaApi {
    pub fn new(endpoints: HusqvarnaEndpoints, timeout: Duration) -> Result<Self, MowerApiError> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            endpoints: HusqvarnaEndpoints {
                im_url: endpoints.im_url.trim_end_matches('/').to_string(),
                track_url: endpoints.track_url.trim_end_matches('/').to_string(),
            },
            session_token: None,
        })
    }

    fn token(&self) -> Result<&str, MowerApiError> {
        self.session_token
            .as_deref()
            .ok_or(MowerApiError::NotLoggedIn)
    }
}

impl MowerApi for HusqvarnaApi {
    type Client = HusqvarnaRobotClient;

    fn login(&mut self, username: &str, password: &str) -> Result<(), MowerApiError> {
        let endpoint = format!("{}/im/login", self.endpoints.im_url);
        let response = self
            .http
            .post(&endpoint)
            .json(&json!({
                "user": {
                    "email": username,
                    "password": password,
                    "language": LOGIN_LANGUAGE
                }
            }))
            .send()?;

        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(MowerApiError::Authentication(format!(
                "login rejected with status {}",
                response.status().as_u16()
            )));
        }
        ensure_success(&response, &endpoint)?;

        let token = response
            .headers()
            .get(SESSION_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                MowerApiError::Authentication("login response carried no session token".to_string())
            })?;

        self.session_token = Some(token.to_string());
        Ok(())
    }

    fn list_robots(&self) -> Result<Vec<RobotMeta>, MowerApiError> {
        let endpoint = format!("{}/mowers", self.endpoints.track_url);
        let payload = get_json(&self.http, &endpoint, self.token()?)?;
        serde_json::from_value(payload).map_err(MowerApiError::from)
    }

    fn select_robot(&self, robot_id: &str) -> Result<Self::Client, MowerApiError> {
        let token = self.token()?;
        let robot = self
            .list_robots()?
            .into_iter()
            .find(|robot| robot.id == robot_id || robot.name == robot_id)
            .ok_or_else(|| MowerApiError::UnknownRobot(robot_id.to_string()))?;

        Ok(HusqvarnaRobotClient {
            http: self.http.clone(),
            status_url: format!("{}/mowers/{}/status", self.endpoints.track_url, robot.id),
            robot_id: robot.id,
            session_token: token.to_string(),
        })
    }

    fn logout(&mut self) -> Result<(), MowerApiError> {
        let Some(token) = self.session_token.take() else {
            return Ok(());
        };

        let endpoint = format!("{}/im/logout", self.endpoints.im_url);
        let response = self
            .http
            .post(&endpoint)
            .header(SESSION_TOKEN_HEADER, token)
            .send()?;
        ensure_success(&response, &endpoint)?;

        Ok(())
    }
}

impl RobotClient for HusqvarnaRobotClient {
    fn robot_id(&self) -> &str {
        &self.robot_id
    }

    fn status(&self) -> Result<Value, MowerApiError> {
        get_json(&self.http, &self.status_url, &self.session_token)
    }
}

fn get_json(http: &Client, endpoint: &str, token: &str) -> Result<Value, MowerApiError> {
    let response = http
        .get(endpoint)
        .header(SESSION_TOKEN_HEADER, token)
        .send()?;

    if response.status() == StatusCode::UNAUTHORIZED {
        return Err(MowerApiError::Authentication(
            "session token rejected".to_string(),
        ));
    }
    ensure_success(&response, endpoint)?;

    let body = response.bytes()?;
    serde_json::from_slice(&body).map_err(MowerApiError::from)
}

fn ensure_success(response: &Response, endpoint: &str) -> Result<(), MowerApiError> {
    if response.status().is_success() {
        return Ok(());
    }

    Err(MowerApiError::UnexpectedStatus {
        status: response.status().as_u16(),
        endpoint: endpoint.to_string(),
    })
}
