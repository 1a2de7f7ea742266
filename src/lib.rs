#![forbid(unsafe_code)]

//! diskmon: adaptive disk-space monitoring scheduler.
//!
//! Decides *when* to check disk usage: a short interval while the device is
//! active, a long one while idle, and an immediate check when the device wakes
//! up after a long quiet period. The measurement itself sits behind the
//! [`monitor::backend::UsageBackend`] seam; results are re-broadcast through a
//! [`daemon::transport::Transport`].
//!
//! ```rust,no_run
//! use diskmon::prelude::*;
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod logger;
pub mod monitor;
pub mod platform;
