//! End-to-end scheduling scenarios against the public monitor API with
//! recording collaborators and a manual clock.

mod common;

use std::collections::VecDeque;
use std::time::Duration;

use diskmon::core::config::Config;
use diskmon::core::errors::DiskmonError;
use diskmon::daemon::service::MonitorEvent;
use diskmon::daemon::transport::InboundMessage;
use diskmon::monitor::backend::{UsageReport, UsageState};
use diskmon::monitor::state::ActivityMode;

use common::monitor_at;

const ACTIVE: Duration = Duration::from_secs(300);
const ACTIVE_MAX: Duration = Duration::from_secs(420);
const IDLE: Duration = Duration::from_secs(1_800);
const IDLE_MAX: Duration = Duration::from_secs(1_920);

fn usage(path: &str, pct: u8, state: UsageState) -> UsageReport {
    UsageReport {
        path: path.to_string(),
        percent_used: pct,
        state,
    }
}

#[test]
fn fresh_resume_goes_active_without_check() {
    // Clock at the epoch: elapsed since the (never) last check is zero.
    let (mut m, _clock, timeline) = monitor_at(0);
    m.start();
    m.handle(MonitorEvent::StartupComplete);
    m.handle(MonitorEvent::ActivityChanged { inactive: false });

    assert_eq!(m.state().mode(), ActivityMode::Active);
    assert_eq!(m.backend().calls, 0);
    let armed = &m.wakeups().armed;
    assert_eq!(armed.len(), 2, "start + transition");
    assert_eq!(armed[1].min_delay, ACTIVE);
    assert_eq!(armed[1].max_delay, ACTIVE_MAX);
    assert_eq!(*timeline.lock(), vec!["arm", "arm"]);
}

#[test]
fn stale_resume_checks_once_then_arms_active() {
    let (mut m, _clock, timeline) = monitor_at(900);
    m.start();
    m.handle(MonitorEvent::StartupComplete);
    m.handle(MonitorEvent::ActivityChanged { inactive: false });

    assert_eq!(m.backend().calls, 1);
    assert_eq!(m.state().last_check_time().timestamp(), 900);
    assert_eq!(*timeline.lock(), vec!["arm", "check", "arm"]);
    let last = m.wakeups().armed.last().unwrap();
    assert_eq!((last.min_delay, last.max_delay), (ACTIVE, ACTIVE_MAX));
}

#[test]
fn check_request_before_ready_is_acknowledged_only() {
    let (mut m, _clock, _timeline) = monitor_at(42_000);
    m.start();
    m.handle(MonitorEvent::TransportConnected);
    m.handle(MonitorEvent::Inbound(InboundMessage::CheckNow { requester: None }));

    assert_eq!(m.transport().replies, 1);
    assert_eq!(m.backend().calls, 0);
    assert!(m.transport().emitted.is_empty());
    assert!(!m.state().has_checked());
}

#[test]
fn wakeup_while_ready_checks_and_rearms_for_mode() {
    let (mut m, clock, timeline) = monitor_at(10_000);
    m.start();
    m.handle(MonitorEvent::StartupComplete);
    let token = m.wakeups().armed[0].token();

    clock.advance(IDLE);
    m.handle(MonitorEvent::WakeTimerFired(token));

    assert_eq!(m.backend().calls, 1);
    assert_eq!(m.state().last_check_time().timestamp(), 11_800);
    let armed = &m.wakeups().armed;
    assert_eq!(armed.len(), 2);
    assert_eq!((armed[1].min_delay, armed[1].max_delay), (IDLE, IDLE_MAX));
    assert_eq!(*timeline.lock(), vec!["arm", "check", "arm"]);
}

#[test]
fn reports_are_reemitted_after_each_check() {
    let (mut m, _clock, _timeline) = monitor_at(5_000);
    m.backend_mut().script = VecDeque::from(vec![
        Ok(vec![usage("/", 92, UsageState::Warning)]),
        Ok(vec![usage("/", 93, UsageState::Warning)]),
    ]);
    m.handle(MonitorEvent::StartupComplete);
    m.handle(MonitorEvent::CheckRequested {
        requester: Some("test".to_string()),
    });
    m.handle(MonitorEvent::CheckRequested { requester: None });

    let emitted: Vec<u8> = m.transport().emitted.iter().map(|r| r.percent_used).collect();
    assert_eq!(emitted, vec![92, 93]);
}

#[test]
fn failed_check_does_not_block_the_schedule() {
    let (mut m, clock, _timeline) = monitor_at(1_000);
    m.backend_mut().script = VecDeque::from(vec![Err(DiskmonError::FsStats {
        path: "/home".into(),
        details: "EIO".to_string(),
    })]);
    m.start();
    m.handle(MonitorEvent::StartupComplete);
    let token = m.wakeups().armed[0].token();
    clock.advance(IDLE);
    m.handle(MonitorEvent::WakeTimerFired(token));

    assert_eq!(m.state().last_check_time().timestamp(), 2_800);
    assert_eq!(m.wakeups().armed.len(), 2);
    assert!(m.transport().emitted.is_empty());
}

#[test]
fn late_fire_of_superseded_schedule_is_dropped() {
    let (mut m, clock, _timeline) = monitor_at(0);
    m.start();
    m.handle(MonitorEvent::StartupComplete);
    let idle_token = m.wakeups().armed[0].token();

    clock.advance(Duration::from_secs(60));
    m.handle(MonitorEvent::ActivityChanged { inactive: false });
    m.handle(MonitorEvent::WakeTimerFired(idle_token));

    assert_eq!(m.backend().calls, 0);
    assert_eq!(m.wakeups().armed.len(), 2);

    let active_token = m.wakeups().armed[1].token();
    m.handle(MonitorEvent::WakeTimerFired(active_token));
    assert_eq!(m.backend().calls, 1);
    assert_eq!(m.wakeups().armed.len(), 3);
}

#[test]
fn transport_reconnect_binds_once_per_connection() {
    let (mut m, _clock, _timeline) = monitor_at(0);
    m.handle(MonitorEvent::TransportConnected);
    m.handle(MonitorEvent::TransportConnected);
    assert_eq!(m.transport().binds, 2);

    m.handle(MonitorEvent::TransportDisconnected);
    m.handle(MonitorEvent::TransportDisconnected);
    assert_eq!(m.transport().unbinds, 2);

    m.handle(MonitorEvent::TransportConnected);
    assert_eq!(m.transport().binds, 4);
    assert!(m.bindings().methods_bound());
}

#[test]
fn readiness_via_transport_enables_checks() {
    let (mut m, _clock, _timeline) = monitor_at(3_000);
    m.handle(MonitorEvent::TransportConnected);
    m.handle(MonitorEvent::Inbound(InboundMessage::StartupComplete));
    m.handle(MonitorEvent::Inbound(InboundMessage::CheckNow {
        requester: Some(":1.99".to_string()),
    }));
    assert!(m.state().ready_to_check());
    assert_eq!(m.backend().calls, 1);
    assert_eq!(m.transport().replies, 1);
}

#[test]
fn custom_schedule_drives_bounds() {
    let mut config = Config::default();
    config.schedule.active_interval_secs = 30;
    config.schedule.idle_interval_secs = 90;
    config.schedule.slack_secs = 0;
    let (mut m, _clock, _timeline) = common::monitor_with(&config, 0);
    m.start();
    let first = &m.wakeups().armed[0];
    assert_eq!(first.min_delay, Duration::from_secs(90));
    assert_eq!(first.max_delay, first.min_delay);
}
