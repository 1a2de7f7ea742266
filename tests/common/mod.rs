#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use diskmon::core::clock::ManualClock;
use diskmon::core::config::Config;
use diskmon::core::errors::Result;
use diskmon::daemon::service::DiskMonitor;
use diskmon::daemon::timer::WakeupProvider;
use diskmon::daemon::transport::Transport;
use diskmon::logger::activity::ActivityLoggerHandle;
use diskmon::monitor::backend::{UsageBackend, UsageReport};
use diskmon::monitor::scheduler::ScheduleRequest;

// ──────────────────── collaborator doubles ────────────────────

/// Ordered record of collaborator calls, shared by the doubles of one monitor.
pub type Timeline = Arc<Mutex<Vec<&'static str>>>;

/// Backend replaying scripted results; an exhausted script yields no reports.
#[derive(Default)]
pub struct ScriptedBackend {
    pub calls: u32,
    pub script: VecDeque<Result<Vec<UsageReport>>>,
    pub timeline: Timeline,
}

impl UsageBackend for ScriptedBackend {
    fn check_now(&mut self) -> Result<Vec<UsageReport>> {
        self.calls += 1;
        self.timeline.lock().push("check");
        self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Default)]
pub struct RecordingWakeups {
    pub armed: Vec<ScheduleRequest>,
    pub timeline: Timeline,
}

impl WakeupProvider for RecordingWakeups {
    fn arm(&mut self, request: &ScheduleRequest) {
        self.timeline.lock().push("arm");
        self.armed.push(request.clone());
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    pub emitted: Vec<UsageReport>,
    pub replies: u32,
    pub binds: u32,
    pub unbinds: u32,
}

impl Transport for RecordingTransport {
    fn bind_methods(&mut self) -> Result<()> {
        self.binds += 1;
        Ok(())
    }

    fn unbind_methods(&mut self) {
        self.unbinds += 1;
    }

    fn bind_signals(&mut self) -> Result<()> {
        self.binds += 1;
        Ok(())
    }

    fn unbind_signals(&mut self) {
        self.unbinds += 1;
    }

    fn emit_usage_changed(&mut self, report: &UsageReport) -> Result<()> {
        self.emitted.push(report.clone());
        Ok(())
    }

    fn reply_check(&mut self) -> Result<()> {
        self.replies += 1;
        Ok(())
    }
}

pub type TestMonitor = DiskMonitor<ScriptedBackend, RecordingWakeups, RecordingTransport>;

/// Monitor with default config, a manual clock at `secs` and a shared timeline.
pub fn monitor_at(secs: i64) -> (TestMonitor, ManualClock, Timeline) {
    monitor_with(&Config::default(), secs)
}

pub fn monitor_with(config: &Config, secs: i64) -> (TestMonitor, ManualClock, Timeline) {
    let clock = ManualClock::at_unix(secs);
    let timeline = Timeline::default();
    let monitor = DiskMonitor::new(
        config,
        ScriptedBackend {
            timeline: Arc::clone(&timeline),
            ..ScriptedBackend::default()
        },
        RecordingWakeups {
            timeline: Arc::clone(&timeline),
            ..RecordingWakeups::default()
        },
        RecordingTransport::default(),
        Box::new(clock.clone()),
        ActivityLoggerHandle::detached(),
    );
    (monitor, clock, timeline)
}

// ──────────────────── CLI runner ────────────────────

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

pub fn bin_path() -> PathBuf {
    if let Some(path) = option_env!("CARGO_BIN_EXE_diskmond") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) {
        "diskmond.exe"
    } else {
        "diskmond"
    };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve diskmond binary path for integration test"),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("diskmon-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin = bin_path();

    let output = Command::new(&bin)
        .args(args)
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute diskmond command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let log_content = format!(
        "case={case_name}\nbin={}\nargs={args:?}\nstatus={}\n----- stdout -----\n{stdout}\n----- stderr -----\n{stderr}\n",
        bin.display(),
        output.status
    );
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}
