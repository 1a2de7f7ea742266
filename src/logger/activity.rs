//! Activity logger thread.
//!
//! A dedicated thread owns the `JsonlWriter`. Everything else sends
//! `ActivityEvent`s through a bounded crossbeam channel; `try_send()` keeps the
//! event loop from ever blocking on logging back-pressure.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{DiskmonError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
use crate::monitor::state::{ActivityMode, CheckTrigger};

/// How often a degraded writer retries its primary path.
const RECOVER_INTERVAL: Duration = Duration::from_secs(60);

// ──────────────────── public event type ────────────────────

/// Events recorded in the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityEvent {
    DaemonStarted {
        version: String,
        config_hash: String,
    },
    DaemonStopped {
        reason: String,
        uptime_secs: u64,
    },
    ReadinessObserved,
    CheckRequested {
        requester: String,
    },
    CheckPerformed {
        trigger: CheckTrigger,
        reports: usize,
        ok: bool,
    },
    CheckSuppressed {
        trigger: CheckTrigger,
    },
    ActivityTransition {
        from: ActivityMode,
        to: ActivityMode,
        elapsed_secs: Option<u64>,
        check_now: bool,
    },
    WakeupArmed {
        min_delay_secs: u64,
        max_delay_secs: u64,
        generation: u64,
    },
    WakeupDiscarded {
        generation: u64,
        current: u64,
    },
    UsageSignalEmitted {
        path: String,
        percent_used: u8,
    },
    TransportBound,
    TransportUnbound,
    ConfigReloaded {
        details: String,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel asking the logger thread to flush and exit.
    Shutdown,
}

impl ActivityEvent {
    /// Error event carrying the crate error's code.
    #[must_use]
    pub fn from_error(context: &str, err: &DiskmonError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: format!("{context}: {err}"),
        }
    }
}

// ──────────────────── public handle ────────────────────

/// Cheaply cloneable, non-blocking handle for sending log events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Handle plus the receiving end, without a logger thread.
    ///
    /// Used by `spawn_logger` and by embedders that consume events themselves.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, Receiver<ActivityEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            Self {
                tx,
                dropped_events: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Handle whose events go nowhere.
    #[must_use]
    pub fn detached() -> Self {
        let (handle, _rx) = Self::channel(1);
        handle
    }

    /// Send an event to the logger thread. Non-blocking.
    ///
    /// When the channel is full the event is dropped and counted.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown and for detached handles.
    }

    /// Number of events dropped due to back-pressure and not yet reported.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread and return a handle plus its join handle.
pub fn spawn_logger(
    jsonl_config: JsonlConfig,
    channel_capacity: usize,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (handle, rx) = ActivityLoggerHandle::channel(channel_capacity);
    let dropped = Arc::clone(&handle.dropped_events);

    let join = thread::Builder::new()
        .name("dmon-logger".to_string())
        .spawn(move || logger_thread_main(&rx, jsonl_config, &dropped))
        .map_err(|e| DiskmonError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

// ──────────────────── logger thread ────────────────────

fn logger_thread_main(rx: &Receiver<ActivityEvent>, config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(config);
    let mut last_recover = std::time::Instant::now();

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if event == ActivityEvent::Shutdown {
            break;
        }

        if jsonl.state() != "normal" && last_recover.elapsed() >= RECOVER_INTERVAL {
            jsonl.try_recover();
            last_recover = std::time::Instant::now();
        }

        jsonl.write_entry(&event_to_log_entry(&event));
        jsonl.flush();
    }

    jsonl.fsync();
}

// ──────────────────── event conversion ────────────────────

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::DaemonStarted {
            version,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::DaemonStart, Severity::Info);
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::DaemonStopped {
            reason,
            uptime_secs,
        } => {
            let mut e = LogEntry::new(EventType::DaemonStop, Severity::Info);
            e.details = Some(format!("reason={reason} uptime={uptime_secs}s"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::ReadinessObserved => {
            LogEntry::new(EventType::ReadinessObserved, Severity::Info)
        }
        ActivityEvent::CheckRequested { requester } => {
            let mut e = LogEntry::new(EventType::CheckRequested, Severity::Info);
            e.requester = Some(requester.clone());
            e
        }
        ActivityEvent::CheckPerformed {
            trigger,
            reports,
            ok,
        } => {
            let severity = if *ok {
                Severity::Info
            } else {
                Severity::Warning
            };
            let mut e = LogEntry::new(EventType::CheckPerformed, severity);
            e.trigger = Some(trigger.to_string());
            e.reports = Some(*reports);
            e.ok = Some(*ok);
            e
        }
        ActivityEvent::CheckSuppressed { trigger } => {
            let mut e = LogEntry::new(EventType::CheckSuppressed, Severity::Info);
            e.trigger = Some(trigger.to_string());
            e.details = Some("readiness not yet observed".to_string());
            e
        }
        ActivityEvent::ActivityTransition {
            from,
            to,
            elapsed_secs,
            check_now,
        } => {
            let mut e = LogEntry::new(EventType::ActivityTransition, Severity::Info);
            e.mode = Some(format!("{from}->{to}"));
            e.elapsed_secs = *elapsed_secs;
            if *check_now {
                e.details = Some("stale, checking now".to_string());
            }
            e
        }
        ActivityEvent::WakeupArmed {
            min_delay_secs,
            max_delay_secs,
            generation,
        } => {
            let mut e = LogEntry::new(EventType::WakeupArmed, Severity::Info);
            e.min_delay_secs = Some(*min_delay_secs);
            e.max_delay_secs = Some(*max_delay_secs);
            e.generation = Some(*generation);
            e
        }
        ActivityEvent::WakeupDiscarded {
            generation,
            current,
        } => {
            let mut e = LogEntry::new(EventType::WakeupDiscarded, Severity::Info);
            e.generation = Some(*generation);
            e.details = Some(format!("current generation {current}"));
            e
        }
        ActivityEvent::UsageSignalEmitted { path, percent_used } => {
            let mut e = LogEntry::new(EventType::UsageSignal, Severity::Info);
            e.path = Some(path.clone());
            e.percent_used = Some(*percent_used);
            e
        }
        ActivityEvent::TransportBound => LogEntry::new(EventType::TransportBound, Severity::Info),
        ActivityEvent::TransportUnbound => {
            LogEntry::new(EventType::TransportUnbound, Severity::Info)
        }
        ActivityEvent::ConfigReloaded { details } => {
            let mut e = LogEntry::new(EventType::ConfigReload, Severity::Info);
            e.details = Some(details.clone());
            e.ok = Some(true);
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Warning);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => {
            let mut e = LogEntry::new(EventType::DaemonStop, Severity::Info);
            e.details = Some("logger shutdown".to_string());
            e
        }
    }
}
