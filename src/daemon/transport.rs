//! Request/signal transport seam.
//!
//! The monitor answers one method (`req_check`), emits one signal
//! (`disk_space_change_ind`) and listens to two foreign signals (boot done,
//! inactivity). [`Bindings`] makes bind/unbind idempotent across repeated
//! connect and disconnect notifications. [`JsonLinesTransport`] carries the
//! protocol as JSON lines for the `diskmond` binary.

#![allow(missing_docs)]

use std::io::{BufRead, Write};
use std::thread;

use serde::{Deserialize, Serialize};

use crate::core::errors::{DiskmonError, Result};
use crate::daemon::service::MonitorEvent;
use crate::monitor::backend::UsageReport;

// ──────────────────── protocol names ────────────────────

pub const SERVICE_NAME: &str = "com.nokia.diskmonitor";
pub const REQUEST_INTERFACE: &str = "com.nokia.diskmonitor.request";
pub const CHECK_METHOD: &str = "req_check";
pub const SIGNAL_INTERFACE: &str = "com.nokia.diskmonitor.signal";
pub const USAGE_SIGNAL: &str = "disk_space_change_ind";
pub const STARTUP_INTERFACE: &str = "com.nokia.startup.signal";
pub const STARTUP_SIGNAL: &str = "base_boot_done";
pub const ACTIVITY_INTERFACE: &str = "com.nokia.mce.signal";
pub const ACTIVITY_SIGNAL: &str = "system_inactivity_ind";

/// Placeholder logged when a check request carries no sender identity.
pub const UNKNOWN_REQUESTER: &str = "(unknown)";

// ──────────────────── transport trait ────────────────────

/// Outbound side of the protocol plus handler registration.
pub trait Transport: Send {
    /// Register the `req_check` method handler.
    fn bind_methods(&mut self) -> Result<()>;
    fn unbind_methods(&mut self);
    /// Subscribe to the readiness and inactivity signals.
    fn bind_signals(&mut self) -> Result<()>;
    fn unbind_signals(&mut self);
    /// Broadcast `disk_space_change_ind(path, percent_used)`.
    fn emit_usage_changed(&mut self, report: &UsageReport) -> Result<()>;
    /// Empty acknowledgment for a `req_check` call.
    fn reply_check(&mut self) -> Result<()>;
}

// ──────────────────── bindings ────────────────────

/// Bound-state flags guarding registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bindings {
    methods_bound: bool,
    signals_bound: bool,
}

impl Bindings {
    #[must_use]
    pub const fn methods_bound(&self) -> bool {
        self.methods_bound
    }

    #[must_use]
    pub const fn signals_bound(&self) -> bool {
        self.signals_bound
    }

    /// Bind whatever is not bound yet. Returns whether anything was bound.
    ///
    /// A failed bind leaves its flag clear so the next connect retries it.
    pub fn connect<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<bool> {
        let mut changed = false;
        if !self.methods_bound {
            transport.bind_methods()?;
            self.methods_bound = true;
            changed = true;
        }
        if !self.signals_bound {
            transport.bind_signals()?;
            self.signals_bound = true;
            changed = true;
        }
        Ok(changed)
    }

    /// Unbind whatever is bound. Returns whether anything was unbound.
    pub fn disconnect<T: Transport + ?Sized>(&mut self, transport: &mut T) -> bool {
        let mut changed = false;
        if self.methods_bound {
            transport.unbind_methods();
            self.methods_bound = false;
            changed = true;
        }
        if self.signals_bound {
            transport.unbind_signals();
            self.signals_bound = false;
            changed = true;
        }
        changed
    }

    /// Whether an inbound message would reach its handler.
    #[must_use]
    pub const fn admits(&self, message: &InboundMessage) -> bool {
        match message {
            InboundMessage::CheckNow { .. } => self.methods_bound,
            InboundMessage::StartupComplete | InboundMessage::ActivityChanged { .. } => {
                self.signals_bound
            }
        }
    }
}

// ──────────────────── wire messages ────────────────────

/// Messages delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// `req_check` method call.
    CheckNow {
        #[serde(default)]
        requester: Option<String>,
    },
    /// `base_boot_done` signal.
    StartupComplete,
    /// `system_inactivity_ind` signal.
    ActivityChanged { inactive: bool },
}

/// Messages written by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    DiskSpaceChangeInd { path: String, percent_used: u8 },
    Reply { method: String },
}

/// Parse one inbound line. Blank and malformed lines yield `None`.
#[must_use]
pub fn parse_inbound(line: &str) -> Option<InboundMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(message) => Some(message),
        Err(e) => {
            eprintln!("[DMON-TRANSPORT] discarding malformed message: {e}");
            None
        }
    }
}

// ──────────────────── JSON lines transport ────────────────────

/// Transport writing outbound messages as JSON lines to `W`.
///
/// Registration has nothing to do on a byte stream; binding state lives in
/// [`Bindings`], which decides what inbound messages are admitted.
pub struct JsonLinesTransport<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonLinesTransport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_message(&mut self, message: &OutboundMessage) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.out
            .write_all(line.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|e| DiskmonError::Transport {
                details: e.to_string(),
            })
    }
}

impl<W: Write + Send> Transport for JsonLinesTransport<W> {
    fn bind_methods(&mut self) -> Result<()> {
        Ok(())
    }

    fn unbind_methods(&mut self) {}

    fn bind_signals(&mut self) -> Result<()> {
        Ok(())
    }

    fn unbind_signals(&mut self) {}

    fn emit_usage_changed(&mut self, report: &UsageReport) -> Result<()> {
        self.write_message(&OutboundMessage::DiskSpaceChangeInd {
            path: report.path.clone(),
            percent_used: report.percent_used,
        })
    }

    fn reply_check(&mut self) -> Result<()> {
        self.write_message(&OutboundMessage::Reply {
            method: CHECK_METHOD.to_string(),
        })
    }
}

/// Spawn a thread feeding inbound JSON lines from `reader` into the event loop.
///
/// Sends `TransportConnected` first and `TransportDisconnected` at end of input.
pub fn spawn_reader<R, F>(reader: R, deliver: F) -> Result<thread::JoinHandle<()>>
where
    R: BufRead + Send + 'static,
    F: Fn(MonitorEvent) -> Result<()> + Send + 'static,
{
    thread::Builder::new()
        .name("dmon-transport".to_string())
        .spawn(move || read_inbound(reader, &deliver))
        .map_err(|e| DiskmonError::Runtime {
            details: format!("failed to spawn transport reader: {e}"),
        })
}

fn read_inbound<R: BufRead>(reader: R, deliver: &dyn Fn(MonitorEvent) -> Result<()>) {
    if deliver(MonitorEvent::TransportConnected).is_err() {
        return;
    }
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("[DMON-TRANSPORT] read failed: {e}");
                break;
            }
        };
        if let Some(message) = parse_inbound(&line)
            && deliver(MonitorEvent::Inbound(message)).is_err()
        {
            return;
        }
    }
    let _ = deliver(MonitorEvent::TransportDisconnected);
}
