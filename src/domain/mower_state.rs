use chrono::{DateTime, Utc};

use crate::domain::models::MowerPhase;
use crate::domain::status::{NormalizedStatus, format_utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimestampMs(pub i64);

impl TimestampMs {
    pub fn to_iso8601(self) -> String {
        let datetime = DateTime::<Utc>::from_timestamp_millis(self.0)
            .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH));
        format_utc(datetime)
    }
}

pub trait Clock {
    fn now(&self) -> TimestampMs;
}

/// Poll lifecycle of one mower: `Uninitialized -> Polling -> Updated | Failed -> Polling ...`.
///
/// A failed poll keeps the last good status and marks it stale.
#[derive(Debug, Clone)]
pub struct MowerStateMachine {
    phase: MowerPhase,
    last_status: Option<NormalizedStatus>,
    stale: bool,
    consecutive_failures: u32,
    last_success_at: Option<TimestampMs>,
    last_error: Option<String>,
}

impl Default for MowerStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl MowerStateMachine {
    pub fn new() -> Self {
        Self {
            phase: MowerPhase::Uninitialized,
            last_status: None,
            stale: false,
            consecutive_failures: 0,
            last_success_at: None,
            last_error: None,
        }
    }

    pub fn begin_poll(&mut self) {
        self.phase = MowerPhase::Polling;
    }

    pub fn complete<C: Clock>(&mut self, status: NormalizedStatus, clock: &C) {
        self.phase = MowerPhase::Updated;
        self.last_status = Some(status);
        self.stale = false;
        self.consecutive_failures = 0;
        self.last_success_at = Some(clock.now());
        self.last_error = None;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.phase = MowerPhase::Failed;
        self.stale = self.last_status.is_some();
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.into());
    }

    pub fn phase(&self) -> MowerPhase {
        self.phase
    }

    pub fn last_status(&self) -> Option<&NormalizedStatus> {
        self.last_status.as_ref()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_success_at(&self) -> Option<TimestampMs> {
        self.last_success_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
