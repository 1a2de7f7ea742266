//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use diskmon::prelude::*;
//! ```

// Core
pub use crate::core::clock::{Clock, ManualClock, SystemClock};
pub use crate::core::config::Config;
pub use crate::core::errors::{DiskmonError, Result};

// Monitor
pub use crate::monitor::activity::{ActivityDecision, ActivityGate};
pub use crate::monitor::backend::{StatvfsBackend, UsageBackend, UsageReport, UsageState};
pub use crate::monitor::scheduler::{ScheduleRequest, Scheduler, WakeToken};
pub use crate::monitor::state::{ActivityMode, CheckTrigger, MonitorState};

// Platform
pub use crate::platform::pal::{MockPlatform, Platform, detect_platform};

// Daemon
pub use crate::daemon::service::{DiskMonitor, MonitorEvent};
pub use crate::daemon::timer::{TimerThread, WakeupProvider};
pub use crate::daemon::transport::{Bindings, InboundMessage, JsonLinesTransport, Transport};

// Logging
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
