//! Shared monitor state: readiness, activity mode, and the debounce timestamp.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device activity mode driving the check cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActivityMode {
    /// Device idle: long interval.
    #[default]
    Idle,
    /// Device in use: short interval.
    Active,
}

impl ActivityMode {
    /// Mode implied by an inactivity notification's flag.
    #[must_use]
    pub const fn from_inactive(inactive: bool) -> Self {
        if inactive { Self::Idle } else { Self::Active }
    }

    /// True in [`ActivityMode::Active`].
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for ActivityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// Why a check was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckTrigger {
    /// Scheduled wake-up fired.
    Wakeup,
    /// A client asked for a check.
    Request,
    /// Device became active after a long quiet period.
    ActivityResume,
}

impl fmt::Display for CheckTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wakeup => write!(f, "wakeup"),
            Self::Request => write!(f, "request"),
            Self::ActivityResume => write!(f, "activity_resume"),
        }
    }
}

/// Process-lifetime monitor state, owned by the service and passed to each rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorState {
    ready_to_check: bool,
    mode: ActivityMode,
    last_check_time: DateTime<Utc>,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorState {
    /// Initial state: not ready, idle, never checked.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ready_to_check: false,
            mode: ActivityMode::Idle,
            last_check_time: DateTime::UNIX_EPOCH,
        }
    }

    /// Whether startup completion has been observed.
    #[must_use]
    pub const fn ready_to_check(&self) -> bool {
        self.ready_to_check
    }

    /// Current activity mode.
    #[must_use]
    pub const fn mode(&self) -> ActivityMode {
        self.mode
    }

    /// Shorthand for `mode().is_active()`.
    #[must_use]
    pub const fn device_active(&self) -> bool {
        self.mode.is_active()
    }

    /// Time of the last check attempt; the Unix epoch until the first one.
    #[must_use]
    pub const fn last_check_time(&self) -> DateTime<Utc> {
        self.last_check_time
    }

    /// Whether a check has ever completed in this process.
    #[must_use]
    pub fn has_checked(&self) -> bool {
        self.last_check_time > DateTime::UNIX_EPOCH
    }

    /// Latch readiness. There is no way back to not-ready.
    pub fn mark_ready(&mut self) {
        self.ready_to_check = true;
    }

    pub(crate) fn set_mode(&mut self, mode: ActivityMode) {
        self.mode = mode;
    }

    /// Record a completed check. Never moves the timestamp backwards.
    pub(crate) fn record_check(&mut self, at: DateTime<Utc>) {
        if at > self.last_check_time {
            self.last_check_time = at;
        }
    }

    /// Time since the last check, or `None` if the wall clock is behind it.
    #[must_use]
    pub fn elapsed_since_check(&self, now: DateTime<Utc>) -> Option<Duration> {
        now.signed_duration_since(self.last_check_time)
            .to_std()
            .ok()
    }
}
