//! Activity gate: turns inactivity notifications into mode transitions and decides
//! when waking up must force an out-of-cycle check.

#![allow(missing_docs)]

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::monitor::state::{ActivityMode, MonitorState};

/// What an inactivity notification means for the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityDecision {
    /// Mode did not change: no check, no reschedule, no state change.
    Unchanged,
    /// Mode changed. `check_now` is set when the transition must run a check
    /// before the schedule is re-armed.
    Transition {
        from: ActivityMode,
        to: ActivityMode,
        elapsed: Option<Duration>,
        check_now: bool,
    },
}

/// Staleness rule applied on transitions into [`ActivityMode::Active`].
#[derive(Debug, Clone, Copy)]
pub struct ActivityGate {
    stale_threshold: Duration,
}

impl ActivityGate {
    #[must_use]
    pub const fn new(stale_threshold: Duration) -> Self {
        Self { stale_threshold }
    }

    pub fn set_stale_threshold(&mut self, stale_threshold: Duration) {
        self.stale_threshold = stale_threshold;
    }

    #[must_use]
    pub const fn stale_threshold(&self) -> Duration {
        self.stale_threshold
    }

    /// Evaluate a notification carrying `inactive` against the current state.
    ///
    /// Pure: the caller applies the decision.
    #[must_use]
    pub fn evaluate(
        &self,
        state: &MonitorState,
        inactive: bool,
        now: DateTime<Utc>,
    ) -> ActivityDecision {
        let to = ActivityMode::from_inactive(inactive);
        let from = state.mode();
        if to == from {
            return ActivityDecision::Unchanged;
        }

        let elapsed = state.elapsed_since_check(now);
        let stale = elapsed.is_some_and(|e| e >= self.stale_threshold);
        ActivityDecision::Transition {
            from,
            to,
            elapsed,
            check_now: to.is_active() && stale && state.ready_to_check(),
        }
    }
}
