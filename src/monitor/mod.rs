//! Decision logic: monitor state, wake-up cadence, the activity gate, and the
//! usage backend seam with its limit hysteresis.

pub mod activity;
pub mod backend;
pub mod scheduler;
pub mod state;
