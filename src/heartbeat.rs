//! Heartbeat producer (§4.K): spawned by each box, periodically
//! reports load to bearerbox. Grounded on `gw/heartbeat.c` in full
//! (`hb_info`, `heartbeat_thread`, `heartbeat_start`/
//! `heartbeat_stop`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use crate::message::{Heartbeat as HeartbeatMsg, Message, MessageBody};
use crate::queue::Queue;

/// Stop flag shared between the spawning thread and the heartbeat
/// thread; cooperative, checked on every wake (§4.K: "a flag is
/// cleared and the thread is woken").
struct StopFlag(AtomicBool);

pub struct HeartbeatHandle {
    stop: Arc<StopFlag>,
    join: Option<thread::JoinHandle<()>>,
}

impl HeartbeatHandle {
    pub fn stop(mut self) {
        self.stop.0.store(true, Ordering::SeqCst);
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.stop.0.store(true, Ordering::SeqCst);
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Spawns a heartbeat thread that, every `freq`, calls `load` and
/// publishes a `Heartbeat` message onto `outbound`. The rate is
/// clamped: a tick firing less than `freq/2` after the previous send
/// is skipped (§4.K: defends against interrupted-sleep storms). The
/// clamp is Δ = now − last_hb, not the grounding source's literal
/// `difftime(last_hb, now)` expression, per SPEC_FULL §4.K's
/// explicit correction — the swapped form would skip on almost every
/// tick.
pub fn start(
    outbound: Arc<Queue>,
    freq: Duration,
    load: impl Fn() -> i32 + Send + 'static,
) -> HeartbeatHandle {
    let stop = Arc::new(StopFlag(AtomicBool::new(false)));
    let stop_for_thread = stop.clone();
    let join = thread::spawn(move || {
        let half_freq = freq / 2;
        let mut last_hb = Instant::now() - freq; // fire immediately on first tick
        loop {
            thread::sleep(half_freq.max(Duration::from_millis(10)));
            if stop_for_thread.0.load(Ordering::SeqCst) {
                return;
            }
            let now = Instant::now();
            if now.duration_since(last_hb) < half_freq {
                debug!("heartbeat tick skipped, below freq/2 clamp");
                continue;
            }
            last_hb = now;
            let msg = Message::new(MessageBody::Heartbeat(HeartbeatMsg { load: load() }));
            if let Err((err, _)) = outbound.produce(msg) {
                debug!("heartbeat queue overflow: {err}");
            }
        }
    });
    HeartbeatHandle { stop, join: Some(join) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::time::Duration;

    #[test]
    fn publishes_heartbeat_messages_with_reported_load() {
        let q = Arc::new(Queue::default());
        q.add_producer();
        let counter = Arc::new(AtomicI32::new(7));
        let counter2 = counter.clone();
        let handle = start(q.clone(), Duration::from_millis(40), move || counter2.load(Ordering::SeqCst));

        thread::sleep(Duration::from_millis(120));
        handle.stop();

        let mut saw_load_7 = false;
        while let Some(msg) = q.try_consume_nonblocking() {
            if let MessageBody::Heartbeat(hb) = msg.body {
                if hb.load == 7 {
                    saw_load_7 = true;
                }
            }
        }
        assert!(saw_load_7);
    }

    #[test]
    fn stop_prevents_further_ticks() {
        let q = Arc::new(Queue::default());
        q.add_producer();
        let handle = start(q.clone(), Duration::from_millis(20), || 0);
        thread::sleep(Duration::from_millis(30));
        handle.stop();
        let depth_after_stop = q.len();
        thread::sleep(Duration::from_millis(60));
        assert_eq!(q.len(), depth_after_stop);
    }
}
