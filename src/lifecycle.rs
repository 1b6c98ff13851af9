//! Gateway lifecycle controller (§4.C): a five-state machine
//! (RUNNING / ISOLATED / SUSPENDED / SHUTDOWN / DEAD) driven by admin
//! HTTP calls and POSIX signals, implementing backpressure via the
//! `suspended`/`isolated` sentinel queues.
//!
//! Grounded on `gw/bearerbox.c`'s `bb_status`/`status_mutex` global
//! and its `bb_shutdown`/`bb_isolate`/`bb_suspend`/`bb_resume`/
//! `bb_restart`/`signal_handler`/`setup_signal_handlers` functions.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::error::{GatewayError, Result};
use crate::queue::Queue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Running,
    Isolated,
    Suspended,
    Shutdown,
    Dead,
}

/// What the lifecycle controller calls out to when a transition
/// requires pausing or stopping the traffic-producing drivers (§4.D,
/// §4.F). `start` is intentionally absent: driver startup happens
/// once, outside the lifecycle state machine.
pub trait Controllable: Send + Sync {
    fn suspend(&self);
    fn resume(&self);
    fn shutdown(&self);
}

struct SignalFlags {
    sigint_or_term_count: AtomicI32,
    sighup: AtomicBool,
}

/// Owns the process-wide gateway state, the two sentinel queues, and
/// the `flow_threads` drain-tracking queue used to detect that every
/// long-lived thread has exited on the way from SHUTDOWN to DEAD.
pub struct Lifecycle {
    state: Mutex<GatewayState>,
    pub suspended: Arc<Queue>,
    pub isolated: Arc<Queue>,
    pub flow_threads: Arc<Queue>,
    drivers: Mutex<Vec<Arc<dyn Controllable>>>,
    signals: SignalFlags,
    started_at: Instant,
}

impl Lifecycle {
    pub fn new() -> Arc<Self> {
        Arc::new(Lifecycle {
            state: Mutex::new(GatewayState::Running),
            suspended: Arc::new(Queue::default()),
            isolated: Arc::new(Queue::default()),
            flow_threads: Arc::new(Queue::default()),
            drivers: Mutex::new(Vec::new()),
            signals: SignalFlags {
                sigint_or_term_count: AtomicI32::new(0),
                sighup: AtomicBool::new(false),
            },
            started_at: Instant::now(),
        })
    }

    /// Start in an initial state other than RUNNING, matching the
    /// `-S`/`--suspended` and `-I`/`--isolated` CLI flags (§6).
    pub fn new_with_state(initial: GatewayState) -> Arc<Self> {
        let lc = Lifecycle::new();
        match initial {
            GatewayState::Suspended => {
                lc.suspended.add_producer();
                lc.isolated.add_producer();
                *lc.state.lock().unwrap() = GatewayState::Suspended;
            }
            GatewayState::Isolated => {
                lc.isolated.add_producer();
                *lc.state.lock().unwrap() = GatewayState::Isolated;
            }
            _ => {}
        }
        lc
    }

    pub fn register_driver(&self, driver: Arc<dyn Controllable>) {
        self.drivers.lock().unwrap().push(driver);
    }

    pub fn state(&self) -> GatewayState {
        *self.state.lock().unwrap()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn drivers_suspend(&self) {
        for d in self.drivers.lock().unwrap().iter() {
            d.suspend();
        }
    }

    fn drivers_resume(&self) {
        for d in self.drivers.lock().unwrap().iter() {
            d.resume();
        }
    }

    fn drivers_shutdown(&self) {
        for d in self.drivers.lock().unwrap().iter() {
            d.shutdown();
        }
    }

    pub fn suspend(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match *state {
            GatewayState::Running => {
                self.isolated.add_producer();
                self.suspended.add_producer();
                *state = GatewayState::Suspended;
            }
            GatewayState::Isolated => {
                self.suspended.add_producer();
                *state = GatewayState::Suspended;
            }
            _ => return Err(GatewayError::NotAllowed),
        }
        drop(state);
        self.drivers_suspend();
        info!("gateway suspended");
        Ok(())
    }

    pub fn isolate(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match *state {
            GatewayState::Running => {
                self.isolated.add_producer();
                *state = GatewayState::Isolated;
            }
            GatewayState::Suspended => {
                self.suspended.remove_producer();
                *state = GatewayState::Isolated;
            }
            _ => return Err(GatewayError::NotAllowed),
        }
        drop(state);
        self.drivers_suspend();
        info!("gateway isolated");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match *state {
            GatewayState::Isolated => {
                self.isolated.remove_producer();
                *state = GatewayState::Running;
            }
            GatewayState::Suspended => {
                self.suspended.remove_producer();
                self.isolated.remove_producer();
                *state = GatewayState::Running;
            }
            _ => return Err(GatewayError::NotAllowed),
        }
        drop(state);
        self.drivers_resume();
        info!("gateway resumed");
        Ok(())
    }

    /// Idempotent: a shutdown that's already underway or complete is
    /// a no-op that reports "not allowed", matching the source's
    /// `static int called` guard in `bb_shutdown`.
    pub fn shutdown(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, GatewayState::Shutdown | GatewayState::Dead) {
            return Err(GatewayError::NotAllowed);
        }
        let was = *state;
        *state = GatewayState::Shutdown;
        drop(state);

        if matches!(was, GatewayState::Suspended | GatewayState::Isolated) {
            if was == GatewayState::Suspended {
                self.suspended.remove_producer();
            }
            self.isolated.remove_producer();
        }
        self.drivers_shutdown();
        info!("gateway shutting down");
        Ok(())
    }

    /// Stub: the source's `bb_restart` is a bare `return -1;` and this
    /// rewrite introduces no behaviour beyond reporting failure, per
    /// the design document's explicit "do not introduce behaviour".
    pub fn restart(&self) -> Result<()> {
        Err(GatewayError::NotAllowed)
    }

    /// Blocks until every registered long-lived thread has removed
    /// itself from `flow_threads`, then marks the gateway DEAD.
    pub fn wait_for_drain(&self) {
        while self.flow_threads.consume().is_some() {}
        *self.state.lock().unwrap() = GatewayState::Dead;
        info!("gateway drained, now dead");
    }

    /// Installs SIGINT/SIGTERM/SIGHUP/SIGPIPE handlers and spawns the
    /// single thread designated to act on them (only one thread
    /// handles any given signal, per §4.C).
    pub fn install_signal_handlers(self: &Arc<Self>) {
        unsafe {
            libc::signal(libc::SIGINT, handle_term as libc::sighandler_t);
            libc::signal(libc::SIGTERM, handle_term as libc::sighandler_t);
            libc::signal(libc::SIGHUP, handle_hup as libc::sighandler_t);
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }
        let lc = self.clone();
        thread::spawn(move || lc.signal_poll_loop());
    }

    fn signal_poll_loop(self: Arc<Self>) {
        loop {
            thread::sleep(Duration::from_millis(100));
            if self.signals.sighup.swap(false, Ordering::SeqCst) {
                info!("SIGHUP received, reopening log files");
            }
            let count = SIG_COUNT.load(Ordering::SeqCst);
            if count > 0 {
                self.handle_interrupt_signal(count);
                if matches!(self.state(), GatewayState::Dead) {
                    break;
                }
            }
        }
    }

    fn handle_interrupt_signal(&self, occurrence: i32) {
        if occurrence <= 1 {
            info!("received signal, initiating shutdown");
            let _ = self.shutdown();
            return;
            // TODO: the grounding source's signal handler has a
            // `return` here that makes an intended "received signal
            // again, forcing shutdown" warning log unreachable on the
            // very first occurrence too; whether that was meant to
            // guard only repeats is unclear upstream, so the warning
            // below is only reached on the second-or-later path and
            // the first-occurrence flow is preserved as shutdown with
            // no warning.
        }
        warn!("received signal again, forcing immediate shutdown");
        *self.state.lock().unwrap() = GatewayState::Dead;
    }
}

static SIG_COUNT: AtomicI32 = AtomicI32::new(0);

extern "C" fn handle_term(_signum: i32) {
    SIG_COUNT.fetch_add(1, Ordering::SeqCst);
}

extern "C" fn handle_hup(_signum: i32) {
    // Only flips a flag; the poll loop does the actual work, since a
    // signal handler must stay async-signal-safe.
    HUP_FLAG.store(true, Ordering::SeqCst);
}

static HUP_FLAG: AtomicBool = AtomicBool::new(false);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suspend_then_resume_round_trips() {
        let lc = Lifecycle::new();
        lc.suspend().unwrap();
        assert_eq!(lc.state(), GatewayState::Suspended);
        assert!(lc.suspended.producer_count() >= 1);
        assert!(lc.isolated.producer_count() >= 1);
        lc.resume().unwrap();
        assert_eq!(lc.state(), GatewayState::Running);
        assert_eq!(lc.suspended.producer_count(), 0);
        assert_eq!(lc.isolated.producer_count(), 0);
    }

    #[test]
    fn illegal_transitions_are_no_ops() {
        let lc = Lifecycle::new();
        assert!(lc.resume().is_err());
        assert_eq!(lc.state(), GatewayState::Running);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let lc = Lifecycle::new();
        lc.shutdown().unwrap();
        assert_eq!(lc.state(), GatewayState::Shutdown);
        assert!(lc.shutdown().is_err());
    }

    #[test]
    fn isolate_then_suspend_then_resume_to_running() {
        let lc = Lifecycle::new();
        lc.isolate().unwrap();
        assert_eq!(lc.state(), GatewayState::Isolated);
        lc.suspend().unwrap();
        assert_eq!(lc.state(), GatewayState::Suspended);
        lc.resume().unwrap();
        assert_eq!(lc.state(), GatewayState::Running);
    }

    #[test]
    fn restart_is_a_stub() {
        let lc = Lifecycle::new();
        assert!(lc.restart().is_err());
    }

    #[test]
    fn drain_completes_when_flow_threads_producers_reach_zero() {
        let lc = Lifecycle::new();
        lc.flow_threads.add_producer();
        let lc2 = lc.clone();
        let handle = thread::spawn(move || lc2.wait_for_drain());
        thread::sleep(Duration::from_millis(20));
        lc.flow_threads.remove_producer();
        handle.join().unwrap();
        assert_eq!(lc.state(), GatewayState::Dead);
    }
}
