//! Event loop: feeds events to the monitor one at a time, in arrival order.
//!
//! Producers (timer thread, transport reader, embedding code) hold a cloneable
//! [`MonitorHandle`]. OS signals are polled between events. All monitor state
//! lives on the loop thread.

#![allow(missing_docs)]

use std::io::{self, BufReader};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::core::clock::SystemClock;
use crate::core::config::Config;
use crate::core::errors::{DiskmonError, Result};
use crate::daemon::service::{DiskMonitor, MonitorEvent};
use crate::daemon::signals::{SIGNAL_REQUESTER, SignalHandler};
use crate::daemon::timer::{TimerThread, WakeupProvider};
use crate::daemon::transport::{JsonLinesTransport, Transport, spawn_reader};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
use crate::logger::jsonl::JsonlConfig;
use crate::monitor::backend::{StatvfsBackend, UsageBackend};

/// Bounded capacity of the event channel.
pub const EVENT_CHANNEL_CAP: usize = 256;

/// How long the loop waits for an event before re-polling signal flags.
const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(250);

// ──────────────────── handle ────────────────────

/// Cloneable sender side of the event loop.
#[derive(Clone)]
pub struct MonitorHandle {
    tx: Sender<MonitorEvent>,
}

impl MonitorHandle {
    /// Queue an event. Blocks while the channel is full.
    pub fn send(&self, event: MonitorEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| DiskmonError::ChannelClosed {
                component: "event-loop",
            })
    }

    pub fn request_check(&self, requester: Option<&str>) -> Result<()> {
        self.send(MonitorEvent::CheckRequested {
            requester: requester.map(str::to_string),
        })
    }

    pub fn startup_complete(&self) -> Result<()> {
        self.send(MonitorEvent::StartupComplete)
    }

    pub fn activity_changed(&self, inactive: bool) -> Result<()> {
        self.send(MonitorEvent::ActivityChanged { inactive })
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(MonitorEvent::Shutdown)
    }
}

/// Create the event channel.
#[must_use]
pub fn event_channel(capacity: usize) -> (MonitorHandle, Receiver<MonitorEvent>) {
    let (tx, rx) = bounded(capacity.max(1));
    (MonitorHandle { tx }, rx)
}

// ──────────────────── loop ────────────────────

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Signal,
    Requested,
    ChannelClosed,
}

impl StopReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Signal => "signal",
            Self::Requested => "shutdown requested",
            Self::ChannelClosed => "event channel closed",
        }
    }
}

pub struct EventLoop<B, W, T>
where
    B: UsageBackend,
    W: WakeupProvider,
    T: Transport,
{
    monitor: DiskMonitor<B, W, T>,
    events: Receiver<MonitorEvent>,
    signals: SignalHandler,
    config: Config,
    logger: ActivityLoggerHandle,
    poll_interval: Duration,
}

impl<B, W, T> EventLoop<B, W, T>
where
    B: UsageBackend,
    W: WakeupProvider,
    T: Transport,
{
    pub fn new(
        monitor: DiskMonitor<B, W, T>,
        events: Receiver<MonitorEvent>,
        signals: SignalHandler,
        config: Config,
        logger: ActivityLoggerHandle,
    ) -> Self {
        Self {
            monitor,
            events,
            signals,
            config,
            logger,
            poll_interval: SIGNAL_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub const fn monitor(&self) -> &DiskMonitor<B, W, T> {
        &self.monitor
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Start the monitor and process events until shutdown.
    pub fn run(&mut self) -> StopReason {
        let started = Instant::now();
        self.logger.send(ActivityEvent::DaemonStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: self.config.stable_hash().unwrap_or_default(),
        });
        self.monitor.start();

        let reason = loop {
            if self.signals.should_shutdown() {
                break StopReason::Signal;
            }
            if self.signals.should_reload() {
                self.handle_config_reload();
            }
            if self.signals.should_check() {
                self.monitor.handle(MonitorEvent::CheckRequested {
                    requester: Some(SIGNAL_REQUESTER.to_string()),
                });
            }

            match self.events.recv_timeout(self.poll_interval) {
                Ok(MonitorEvent::Shutdown) => break StopReason::Requested,
                Ok(event) => self.monitor.handle(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break StopReason::ChannelClosed,
            }
        };

        let uptime_secs = started.elapsed().as_secs();
        self.logger.send(ActivityEvent::DaemonStopped {
            reason: reason.as_str().to_string(),
            uptime_secs,
        });
        eprintln!(
            "[DMON-DAEMON] stopped: {} (uptime={uptime_secs}s)",
            reason.as_str()
        );
        reason
    }

    // ──────────────────── config reload ────────────────────

    fn handle_config_reload(&mut self) {
        eprintln!("[DMON-DAEMON] config reload requested (SIGHUP)");

        match Config::load(Some(&self.config.paths.config_file)) {
            Ok(new_config) => {
                let old_hash = self.config.stable_hash().unwrap_or_default();
                let new_hash = new_config.stable_hash().unwrap_or_default();
                if old_hash == new_hash {
                    eprintln!("[DMON-DAEMON] config unchanged, skipping reload");
                    return;
                }

                self.monitor.reload_config(&new_config);
                self.logger.send(ActivityEvent::ConfigReloaded {
                    details: format!("config hash: {old_hash} -> {new_hash}"),
                });
                self.config = new_config;
                eprintln!("[DMON-DAEMON] config reloaded");
            }
            Err(e) => {
                eprintln!("[DMON-DAEMON] config reload failed: {e}");
                self.logger
                    .send(ActivityEvent::from_error("config reload failed", &e));
            }
        }
    }
}

// ──────────────────── process wiring ────────────────────

/// Arguments for `diskmond daemon`.
#[derive(Debug, Clone, Default)]
pub struct DaemonArgs {
    /// Treat the readiness notification as already observed.
    pub assume_ready: bool,
}

/// Run the daemon with the statvfs backend, a timer thread and the
/// JSON-lines transport on stdin/stdout, until a shutdown signal arrives.
pub fn run_stdio_daemon(mut config: Config, args: &DaemonArgs) -> Result<()> {
    if args.assume_ready {
        config.startup.assume_ready = true;
    }
    let backend = StatvfsBackend::from_config(&config.backend)?;

    let (logger, logger_join) = spawn_logger(
        JsonlConfig::from_logging(config.paths.jsonl_log.clone(), &config.logging),
        config.logging.channel_capacity,
    )?;

    let signals = SignalHandler::new();
    let (handle, events) = event_channel(EVENT_CHANNEL_CAP);

    let timer_handle = handle.clone();
    let timer = TimerThread::spawn(move |token| {
        if let Err(e) = timer_handle.send(MonitorEvent::WakeTimerFired(token)) {
            eprintln!("[DMON-TIMER] wake-up lost: {e}");
        }
    })?;

    let reader_handle = handle.clone();
    // Detached: a blocked stdin read must not hold up shutdown.
    let _reader = spawn_reader(BufReader::new(io::stdin()), move |event| {
        reader_handle.send(event)
    })?;
    drop(handle);

    let monitor = DiskMonitor::new(
        &config,
        backend,
        timer,
        JsonLinesTransport::new(io::stdout()),
        Box::new(SystemClock),
        logger.clone(),
    );
    let mut event_loop = EventLoop::new(monitor, events, signals, config, logger.clone());
    event_loop.run();
    drop(event_loop);

    logger.shutdown();
    let _ = logger_join.join();
    Ok(())
}
