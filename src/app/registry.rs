use std::sync::Arc;

use thiserror::Error;

use crate::adapters::husqvarna::{MowerApiError, RobotClient};
use crate::domain::entity::{
    PollHealth, SensorView, TrackerSink, TrackerUpdate, device_id, resolve_model, sensor_view,
    tracker_update,
};
use crate::domain::models::{MowerPhase, RobotMeta};
use crate::domain::mower_state::{Clock, MowerStateMachine};
use crate::domain::status::{NormalizeError, NormalizedStatus, normalize};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid mower identity: id must not be empty")]
    InvalidMowerIdentity,
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("failed to fetch status: {0}")]
    Fetch(#[source] MowerApiError),
    #[error("failed to normalize status: {0}")]
    Normalize(#[source] NormalizeError),
}

/// One tracked mower. Owns its robot client exclusively.
pub struct Mower {
    meta: RobotMeta,
    model_name: String,
    dev_id: String,
    client: Box<dyn RobotClient>,
    state: MowerStateMachine,
    tracker: Option<Arc<dyn TrackerSink>>,
}

impl Mower {
    fn new(meta: RobotMeta, client: Box<dyn RobotClient>) -> Self {
        let model_name = resolve_model(&meta.model);
        let dev_id = device_id(&model_name, &meta.id);

        tracing::debug!(mower_id = %meta.id, name = %meta.name, model = %model_name, "initializing mower");

        Self {
            meta,
            model_name,
            dev_id,
            client,
            state: MowerStateMachine::new(),
            tracker: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn model(&self) -> &str {
        &self.model_name
    }

    pub fn dev_id(&self) -> &str {
        &self.dev_id
    }

    pub fn phase(&self) -> MowerPhase {
        self.state.phase()
    }

    pub fn last_status(&self) -> Option<&NormalizedStatus> {
        self.state.last_status()
    }

    pub fn is_stale(&self) -> bool {
        self.state.is_stale()
    }

    pub fn attach_tracker(&mut self, tracker: Arc<dyn TrackerSink>) {
        self.tracker = Some(tracker);
    }

    pub fn has_tracker(&self) -> bool {
        self.tracker.is_some()
    }

    pub fn sensor_view(&self) -> Option<SensorView> {
        self.state
            .last_status()
            .map(|status| sensor_view(&self.meta, status, self.state.is_stale()))
    }

    pub fn tracker_update(&self) -> Option<TrackerUpdate> {
        self.state
            .last_status()
            .map(|status| tracker_update(&self.meta, status))
    }

    /// Fetches and normalizes a fresh status. On failure the previous status is kept.
    pub fn poll<C: Clock>(&mut self, clock: &C) -> Result<(), PollError> {
        tracing::debug!(mower_id = %self.meta.id, "updating mower status");
        self.state.begin_poll();

        let status = match self
            .client
            .status()
            .map_err(PollError::Fetch)
            .and_then(|raw| normalize(&raw).map_err(PollError::Normalize))
        {
            Ok(status) => status,
            Err(error) => {
                self.state.fail(error.to_string());
                return Err(error);
            }
        };

        self.state.complete(status, clock);
        self.push_tracker();

        Ok(())
    }

    pub fn health(&self) -> PollHealth {
        PollHealth {
            dev_id: self.dev_id.clone(),
            name: self.meta.name.clone(),
            phase: self.state.phase(),
            stale: self.state.is_stale(),
            consecutive_failures: self.state.consecutive_failures(),
            last_success_at: self.state.last_success_at().map(|at| at.to_iso8601()),
            last_error: self.state.last_error().map(ToString::to_string),
        }
    }

    fn push_tracker(&self) {
        let Some(tracker) = &self.tracker else {
            tracing::debug!(mower_id = %self.meta.id, "no tracker attached, skipping location update");
            return;
        };

        if let Some(update) = self.tracker_update() {
            tracing::debug!(mower_id = %self.meta.id, "updating device tracker");
            tracker.see(update);
        }
    }
}

/// Mowers discovered at startup, in registration order.
#[derive(Default)]
pub struct MowerRegistry {
    mowers: Vec<Mower>,
}

impl MowerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: RobotClient>(
        &mut self,
        meta: RobotMeta,
        client: C,
    ) -> Result<(), RegistryError> {
        if meta.id.trim().is_empty() {
            return Err(RegistryError::InvalidMowerIdentity);
        }

        let mower = Mower::new(meta, Box::new(client));
        match self.mowers.iter_mut().find(|known| known.id() == mower.id()) {
            Some(existing) => {
                tracing::warn!(mower_id = %mower.id(), "mower registered twice, replacing binding");
                *existing = mower;
            }
            None => self.mowers.push(mower),
        }

        Ok(())
    }

    pub fn list(&self) -> &[Mower] {
        &self.mowers
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Mower> {
        self.mowers.iter_mut()
    }

    pub fn get(&self, id: &str) -> Option<&Mower> {
        self.mowers.iter().find(|mower| mower.id() == id)
    }

    pub fn len(&self) -> usize {
        self.mowers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mowers.is_empty()
    }
}
