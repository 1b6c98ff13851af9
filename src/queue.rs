//! Bounded multi-producer multi-consumer queue with an associated
//! "producer count" (§4.A). Used both for real message traffic
//! (`incoming_sms`, `outgoing_sms`, ...) and as a sentinel/gate queue
//! (`suspended`, `isolated`) that carries no messages at all — only
//! its producer count, which other consumers block on to implement
//! coordinated backpressure (§4.C).
//!
//! The host crate's own blocking primitives (`wait.rs`, `notifier.rs`)
//! wake threads across separate OS processes sharing an mmap'd file,
//! using futexes and inotify. This gateway's queues are shared only
//! between threads of one process, so a plain `Condvar` replaces that
//! machinery; the API shape (blocking `consume`, explicit producer
//! bookkeeping) is this crate's own idiom for a narrow, named
//! blocking data structure.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::error::QueueError;
use crate::message::Message;

struct Inner {
    items: VecDeque<Message>,
    producers: usize,
}

/// A bounded FIFO queue of [`Message`] values with producer-count
/// based end-of-stream signalling.
pub struct Queue {
    state: Mutex<Inner>,
    not_empty: Condvar,
    soft_bound: usize,
}

impl Queue {
    pub const DEFAULT_SOFT_BOUND: usize = 1000;

    pub fn new(soft_bound: usize) -> Self {
        Queue {
            state: Mutex::new(Inner {
                items: VecDeque::new(),
                producers: 0,
            }),
            not_empty: Condvar::new(),
            soft_bound,
        }
    }

    /// Non-blocking append. Fails with [`QueueError::Overflow`] if the
    /// soft bound would be exceeded; the message is returned so the
    /// caller can decide to drop it or retry.
    pub fn produce(&self, msg: Message) -> std::result::Result<(), (QueueError, Message)> {
        let mut inner = self.state.lock().unwrap();
        if inner.items.len() >= self.soft_bound {
            let err = QueueError::Overflow {
                len: inner.items.len(),
                bound: self.soft_bound,
            };
            return Err((err, msg));
        }
        inner.items.push_back(msg);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks until a message is available, or until the producer
    /// count reaches zero with the queue empty (`None`, end-of-stream).
    pub fn consume(&self) -> Option<Message> {
        let mut inner = self.state.lock().unwrap();
        loop {
            if let Some(msg) = inner.items.pop_front() {
                return Some(msg);
            }
            if inner.producers == 0 {
                return None;
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// Registers a new producer. Never drops messages; purely
    /// increments the counter under the queue lock.
    pub fn add_producer(&self) {
        let mut inner = self.state.lock().unwrap();
        inner.producers += 1;
    }

    /// Removes a producer. When the count transitions from 1 to 0,
    /// every blocked consumer is woken to observe end-of-stream.
    pub fn remove_producer(&self) {
        let mut inner = self.state.lock().unwrap();
        assert!(inner.producers > 0, "remove_producer with no producers");
        inner.producers -= 1;
        let reached_zero = inner.producers == 0;
        drop(inner);
        if reached_zero {
            self.not_empty.notify_all();
        }
    }

    /// Non-blocking pop: returns a message if one is queued right
    /// now, `None` otherwise, regardless of producer count. Used to
    /// drain a queue's current contents without blocking on
    /// end-of-stream (e.g. requeuing a disconnected box's in-flight
    /// messages, §4.E).
    pub fn try_consume_nonblocking(&self) -> Option<Message> {
        self.state.lock().unwrap().items.pop_front()
    }

    /// Non-blocking observational read of the current queue depth.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn producer_count(&self) -> usize {
        self.state.lock().unwrap().producers
    }
}

impl Default for Queue {
    fn default() -> Self {
        Queue::new(Self::DEFAULT_SOFT_BOUND)
    }
}
