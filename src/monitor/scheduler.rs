//! Wake-up cadence: picks the check interval for the current activity mode and
//! produces the single outstanding schedule request.
//!
//! Every request carries a generation number. Arming again bumps the generation,
//! so a wake-up belonging to a superseded request can be recognized and dropped
//! even when the wake-up provider cannot cancel timers on its own.

#![allow(missing_docs)]

use std::time::Duration;

use crate::core::config::ScheduleConfig;
use crate::monitor::state::ActivityMode;

/// Identity tag attached to every schedule this monitor arms.
pub const SCHEDULE_TAG: &str = "diskmonitor";

/// Request handed to the wake-up provider: fire once within `[min_delay, max_delay]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub tag: String,
    pub generation: u64,
}

impl ScheduleRequest {
    /// Token the provider hands back when this request fires.
    #[must_use]
    pub fn token(&self) -> WakeToken {
        WakeToken {
            tag: self.tag.clone(),
            generation: self.generation,
        }
    }
}

/// Identifies which schedule a wake-up belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WakeToken {
    pub tag: String,
    pub generation: u64,
}

/// Interval selection plus generation bookkeeping for the single outstanding schedule.
#[derive(Debug, Clone)]
pub struct Scheduler {
    active_interval: Duration,
    idle_interval: Duration,
    slack: Duration,
    generation: u64,
}

impl Scheduler {
    #[must_use]
    pub fn new(config: &ScheduleConfig) -> Self {
        Self {
            active_interval: config.active_interval(),
            idle_interval: config.idle_interval(),
            slack: config.slack(),
            generation: 0,
        }
    }

    /// Apply new timing constants; the generation counter is kept.
    pub fn update_config(&mut self, config: &ScheduleConfig) {
        self.active_interval = config.active_interval();
        self.idle_interval = config.idle_interval();
        self.slack = config.slack();
    }

    /// Short interval while active, long interval while idle.
    #[must_use]
    pub const fn interval_for_mode(&self, mode: ActivityMode) -> Duration {
        match mode {
            ActivityMode::Active => self.active_interval,
            ActivityMode::Idle => self.idle_interval,
        }
    }

    /// Build the next request for `mode`, superseding whatever was armed before.
    pub fn next_request(&mut self, mode: ActivityMode) -> ScheduleRequest {
        self.generation = self.generation.wrapping_add(1);
        let min_delay = self.interval_for_mode(mode);
        ScheduleRequest {
            min_delay,
            max_delay: min_delay.saturating_add(self.slack),
            tag: SCHEDULE_TAG.to_string(),
            generation: self.generation,
        }
    }

    /// Generation of the most recently issued request (0 before the first).
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a fired wake-up belongs to the request currently outstanding.
    #[must_use]
    pub fn is_current(&self, token: &WakeToken) -> bool {
        token.tag == SCHEDULE_TAG && token.generation == self.generation
    }
}
