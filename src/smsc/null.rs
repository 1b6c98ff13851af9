//! A loopback SMSC driver: accepts every outbound message and acks it
//! immediately, never produces inbound traffic on its own. Used by
//! tests and by operators running the gateway without a real carrier
//! connection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::{SmscDriver, StatusFormat};
use crate::lifecycle::Controllable;
use crate::message::{AckStatus, Message};

pub struct NullSmsc {
    name: String,
    suspended: AtomicBool,
    accepted: AtomicU64,
}

impl NullSmsc {
    pub fn new(name: impl Into<String>) -> Self {
        NullSmsc {
            name: name.into(),
            suspended: AtomicBool::new(false),
            accepted: AtomicU64::new(0),
        }
    }

    pub fn accept(&self) -> u64 {
        self.accepted.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Controllable for NullSmsc {
    fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.suspended.store(false, Ordering::SeqCst);
    }

    fn shutdown(&self) {
        self.suspended.store(true, Ordering::SeqCst);
    }
}

impl SmscDriver for NullSmsc {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self, format: StatusFormat) -> String {
        let state = if self.suspended.load(Ordering::SeqCst) {
            "suspended"
        } else {
            "running"
        };
        let accepted = self.accepted.load(Ordering::Relaxed);
        match format {
            StatusFormat::Text => format!("{}: {} ({} accepted)", self.name, state, accepted),
            _ => format!("<b>{}</b>: {} ({} accepted)", self.name, state, accepted),
        }
    }

    fn submit(&self, _msg: &Message) -> AckStatus {
        self.accept();
        AckStatus::Success
    }
}
