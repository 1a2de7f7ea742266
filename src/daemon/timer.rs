//! Wake-up provider: turns schedule requests into wake-up events.
//!
//! [`TimerThread`] keeps at most one armed deadline. Arming again replaces the
//! pending deadline, so a superseded request never fires from this provider.
//! A request that already fired but was not yet handled can still arrive late;
//! the service drops it by generation.

#![allow(missing_docs)]

use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::core::errors::{DiskmonError, Result};
use crate::monitor::scheduler::{ScheduleRequest, WakeToken};

/// Accepts `arm-timer` commands from the scheduler.
pub trait WakeupProvider: Send {
    /// Arm a single wake-up within the request's bounds, replacing any pending one.
    fn arm(&mut self, request: &ScheduleRequest);
}

enum TimerCommand {
    Arm { deadline: Instant, token: WakeToken },
    Stop,
}

/// Background timer thread with a single outstanding deadline.
pub struct TimerThread {
    tx: Sender<TimerCommand>,
    join: Option<thread::JoinHandle<()>>,
}

impl TimerThread {
    /// Spawn the timer thread. `on_fire` runs on the timer thread for each wake-up.
    pub fn spawn<F>(on_fire: F) -> Result<Self>
    where
        F: Fn(WakeToken) + Send + 'static,
    {
        let (tx, rx) = unbounded();
        let join = thread::Builder::new()
            .name("dmon-timer".to_string())
            .spawn(move || timer_thread_main(&rx, &on_fire))
            .map_err(|e| DiskmonError::Runtime {
                details: format!("failed to spawn timer thread: {e}"),
            })?;
        Ok(Self {
            tx,
            join: Some(join),
        })
    }
}

impl WakeupProvider for TimerThread {
    fn arm(&mut self, request: &ScheduleRequest) {
        // Fire at the earliest allowed point.
        let Some(deadline) = Instant::now().checked_add(request.min_delay) else {
            eprintln!(
                "[DMON-TIMER] delay {:?} out of range, wake-up not armed",
                request.min_delay
            );
            return;
        };
        if self
            .tx
            .send(TimerCommand::Arm {
                deadline,
                token: request.token(),
            })
            .is_err()
        {
            eprintln!("[DMON-TIMER] timer thread gone, wake-up not armed");
        }
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        let _ = self.tx.send(TimerCommand::Stop);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn timer_thread_main(rx: &Receiver<TimerCommand>, on_fire: &dyn Fn(WakeToken)) {
    let mut armed: Option<(Instant, WakeToken)> = None;

    loop {
        let deadline = armed.as_ref().map(|(deadline, _)| *deadline);
        let command = match deadline {
            Some(deadline) => match rx.recv_deadline(deadline) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => {
                    if let Some((_, token)) = armed.take() {
                        on_fire(token);
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
        };

        match command {
            TimerCommand::Arm { deadline, token } => armed = Some((deadline, token)),
            TimerCommand::Stop => break,
        }
    }
}
