//! The disk monitor service: one owned context that every event handler runs against.
//!
//! All state mutation happens here, on the event-loop thread. Collaborators are
//! injected: the usage backend, the wake-up provider, the transport, the clock
//! and the activity logger.

#![allow(missing_docs)]

use std::collections::VecDeque;

use crate::core::clock::Clock;
use crate::core::config::Config;
use crate::daemon::timer::WakeupProvider;
use crate::daemon::transport::{Bindings, InboundMessage, Transport, UNKNOWN_REQUESTER};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::monitor::activity::{ActivityDecision, ActivityGate};
use crate::monitor::backend::{UsageBackend, UsageReport};
use crate::monitor::scheduler::{ScheduleRequest, Scheduler, WakeToken};
use crate::monitor::state::{CheckTrigger, MonitorState};

/// Everything the event loop can hand to the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// In-process check request (signal, embedding code).
    CheckRequested { requester: Option<String> },
    StartupComplete,
    ActivityChanged { inactive: bool },
    WakeTimerFired(WakeToken),
    /// Result from a backend that reports asynchronously.
    UsageResult(UsageReport),
    /// Message delivered by the transport, subject to binding state.
    Inbound(InboundMessage),
    TransportConnected,
    TransportDisconnected,
    Shutdown,
}

/// Owned monitor context.
pub struct DiskMonitor<B, W, T>
where
    B: UsageBackend,
    W: WakeupProvider,
    T: Transport,
{
    state: MonitorState,
    scheduler: Scheduler,
    gate: ActivityGate,
    bindings: Bindings,
    backend: B,
    wakeups: W,
    transport: T,
    clock: Box<dyn Clock>,
    logger: ActivityLoggerHandle,
    assume_ready: bool,
    pending_results: VecDeque<UsageReport>,
    checks_performed: u64,
}

impl<B, W, T> DiskMonitor<B, W, T>
where
    B: UsageBackend,
    W: WakeupProvider,
    T: Transport,
{
    pub fn new(
        config: &Config,
        backend: B,
        wakeups: W,
        transport: T,
        clock: Box<dyn Clock>,
        logger: ActivityLoggerHandle,
    ) -> Self {
        Self {
            state: MonitorState::new(),
            scheduler: Scheduler::new(&config.schedule),
            gate: ActivityGate::new(config.schedule.stale_threshold()),
            bindings: Bindings::default(),
            backend,
            wakeups,
            transport,
            clock,
            logger,
            assume_ready: config.startup.assume_ready,
            pending_results: VecDeque::new(),
            checks_performed: 0,
        }
    }

    // ──────────────────── accessors ────────────────────

    pub const fn state(&self) -> &MonitorState {
        &self.state
    }

    pub const fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub const fn backend(&self) -> &B {
        &self.backend
    }

    pub const fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub const fn wakeups(&self) -> &W {
        &self.wakeups
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Checks that actually reached the backend.
    pub const fn checks_performed(&self) -> u64 {
        self.checks_performed
    }

    // ──────────────────── lifecycle ────────────────────

    /// Process start: optional assumed readiness, then the first schedule.
    pub fn start(&mut self) {
        if self.assume_ready {
            self.on_startup_complete();
        }
        self.schedule_next_wakeup();
    }

    /// Apply a reloaded config. Monitor state survives; new timings apply at
    /// the next arm and new limits at the next check.
    pub fn reload_config(&mut self, config: &Config) {
        self.scheduler.update_config(&config.schedule);
        self.gate
            .set_stale_threshold(config.schedule.stale_threshold());
        self.backend.update_config(&config.backend);
    }

    /// Dispatch one event, then any usage results it produced.
    pub fn handle(&mut self, event: MonitorEvent) {
        match event {
            MonitorEvent::CheckRequested { requester } => {
                self.on_check_request(requester.as_deref());
            }
            MonitorEvent::StartupComplete => self.on_startup_complete(),
            MonitorEvent::ActivityChanged { inactive } => self.on_activity_changed(inactive),
            MonitorEvent::WakeTimerFired(token) => self.on_wakeup(&token),
            MonitorEvent::UsageResult(report) => self.on_usage_result(&report),
            MonitorEvent::Inbound(message) => self.on_inbound(message),
            MonitorEvent::TransportConnected => self.on_transport_connect(),
            MonitorEvent::TransportDisconnected => self.on_transport_disconnect(),
            MonitorEvent::Shutdown => {}
        }
        self.drain_results();
    }

    // ──────────────────── scheduling ────────────────────

    /// Arm the next wake-up for the current mode, superseding the previous one.
    pub fn schedule_next_wakeup(&mut self) -> ScheduleRequest {
        let request = self.scheduler.next_request(self.state.mode());
        self.wakeups.arm(&request);
        self.logger.send(ActivityEvent::WakeupArmed {
            min_delay_secs: request.min_delay.as_secs(),
            max_delay_secs: request.max_delay.as_secs(),
            generation: request.generation,
        });
        request
    }

    // ──────────────────── check execution ────────────────────

    /// Gated check. Returns whether the backend was called.
    ///
    /// The debounce timestamp advances even when the backend fails.
    pub fn perform_check(&mut self, trigger: CheckTrigger) -> bool {
        if !self.state.ready_to_check() {
            self.logger.send(ActivityEvent::CheckSuppressed { trigger });
            return false;
        }

        let result = self.backend.check_now();
        self.state.record_check(self.clock.now());
        self.checks_performed += 1;

        match result {
            Ok(reports) => {
                self.logger.send(ActivityEvent::CheckPerformed {
                    trigger,
                    reports: reports.len(),
                    ok: true,
                });
                self.pending_results.extend(reports);
            }
            Err(e) => {
                eprintln!("[DMON-CHECK] disk usage check failed: {e}");
                self.logger
                    .send(ActivityEvent::from_error("disk usage check failed", &e));
                self.logger.send(ActivityEvent::CheckPerformed {
                    trigger,
                    reports: 0,
                    ok: false,
                });
            }
        }
        true
    }

    // ──────────────────── handlers ────────────────────

    pub fn on_check_request(&mut self, requester: Option<&str>) {
        self.logger.send(ActivityEvent::CheckRequested {
            requester: requester.unwrap_or(UNKNOWN_REQUESTER).to_string(),
        });
        self.perform_check(CheckTrigger::Request);
    }

    pub fn on_startup_complete(&mut self) {
        if self.state.ready_to_check() {
            return;
        }
        self.state.mark_ready();
        self.logger.send(ActivityEvent::ReadinessObserved);
    }

    pub fn on_activity_changed(&mut self, inactive: bool) {
        let decision = self.gate.evaluate(&self.state, inactive, self.clock.now());
        let ActivityDecision::Transition {
            from,
            to,
            elapsed,
            check_now,
        } = decision
        else {
            return;
        };

        self.state.set_mode(to);
        self.logger.send(ActivityEvent::ActivityTransition {
            from,
            to,
            elapsed_secs: elapsed.map(|e| e.as_secs()),
            check_now,
        });
        if check_now {
            self.perform_check(CheckTrigger::ActivityResume);
        }
        self.schedule_next_wakeup();
    }

    pub fn on_wakeup(&mut self, token: &WakeToken) {
        if !self.scheduler.is_current(token) {
            self.logger.send(ActivityEvent::WakeupDiscarded {
                generation: token.generation,
                current: self.scheduler.generation(),
            });
            return;
        }
        self.perform_check(CheckTrigger::Wakeup);
        self.schedule_next_wakeup();
    }

    /// Re-emit a usage result unchanged.
    pub fn on_usage_result(&mut self, report: &UsageReport) {
        match self.transport.emit_usage_changed(report) {
            Ok(()) => self.logger.send(ActivityEvent::UsageSignalEmitted {
                path: report.path.clone(),
                percent_used: report.percent_used,
            }),
            Err(e) => {
                eprintln!("[DMON-TRANSPORT] failed to emit usage signal: {e}");
                self.logger
                    .send(ActivityEvent::from_error("usage signal emit failed", &e));
            }
        }
    }

    /// Transport-delivered message. Dropped unless its handler is bound.
    pub fn on_inbound(&mut self, message: InboundMessage) {
        if !self.bindings.admits(&message) {
            return;
        }
        match message {
            InboundMessage::CheckNow { requester } => {
                self.on_check_request(requester.as_deref());
                if let Err(e) = self.transport.reply_check() {
                    self.logger
                        .send(ActivityEvent::from_error("check reply failed", &e));
                }
            }
            InboundMessage::StartupComplete => self.on_startup_complete(),
            InboundMessage::ActivityChanged { inactive } => self.on_activity_changed(inactive),
        }
    }

    pub fn on_transport_connect(&mut self) {
        match self.bindings.connect(&mut self.transport) {
            Ok(true) => self.logger.send(ActivityEvent::TransportBound),
            Ok(false) => {}
            Err(e) => {
                eprintln!("[DMON-TRANSPORT] bind failed: {e}");
                self.logger.send(ActivityEvent::from_error("bind failed", &e));
            }
        }
    }

    pub fn on_transport_disconnect(&mut self) {
        if self.bindings.disconnect(&mut self.transport) {
            self.logger.send(ActivityEvent::TransportUnbound);
        }
    }

    fn drain_results(&mut self) {
        while let Some(report) = self.pending_results.pop_front() {
            self.on_usage_result(&report);
        }
    }
}
