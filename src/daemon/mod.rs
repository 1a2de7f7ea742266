//! Daemon subsystem: the monitor service, its wake-up timer and transport,
//! the event loop, and OS signal handling.

#[cfg(feature = "daemon")]
pub mod event_loop;
pub mod service;
#[cfg(feature = "daemon")]
pub mod signals;
pub mod timer;
pub mod transport;
