//! SMSC manager contract (§4.D). The core treats concrete SMSC
//! protocol drivers (CIMD, SMPP, EMI, ...) as opaque collaborators —
//! out of scope per the purpose statement — reachable only through
//! this narrow trait plus the two standard queues they read/write.
//!
//! Grounded on `gw/bearerbox.c`'s `start_smsc`/driver lifecycle call
//! sites: the core only ever calls start/suspend/resume/shutdown/
//! status on a driver and otherwise interacts with it purely through
//! `incoming_sms`/`outgoing_sms`.

mod null;

pub use null::NullSmsc;

use std::sync::Arc;

use log::warn;

use crate::lifecycle::Controllable;
use crate::message::{AckStatus, Message};
use crate::queue::Queue;

/// Status report format requested from `/status` (§4.L).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFormat {
    Html,
    Wml,
    Xml,
    Text,
}

/// What the core requires of any SMSC driver: start against shared
/// queues, and respond to the lifecycle controller's suspend/resume/
/// shutdown calls (via [`Controllable`]), plus contribute a status
/// fragment.
pub trait SmscDriver: Controllable {
    fn name(&self) -> &str;
    fn status(&self, format: StatusFormat) -> String;

    /// Hands one outbound message to this driver for delivery to the
    /// carrier side, returning the ack status to report upstream.
    fn submit(&self, msg: &Message) -> AckStatus;
}

/// Owns the set of configured SMSC drivers and the two shared queues
/// they're wired to.
pub struct SmscManager {
    pub incoming_sms: Arc<Queue>,
    pub outgoing_sms: Arc<Queue>,
    drivers: Vec<Arc<dyn SmscDriver>>,
}

impl SmscManager {
    pub fn new(incoming_sms: Arc<Queue>, outgoing_sms: Arc<Queue>) -> Self {
        SmscManager {
            incoming_sms,
            outgoing_sms,
            drivers: Vec::new(),
        }
    }

    pub fn start(&mut self, driver: Arc<dyn SmscDriver>) {
        self.incoming_sms.add_producer();
        self.outgoing_sms.add_producer();
        self.drivers.push(driver);
    }

    pub fn status_report(&self, format: StatusFormat) -> String {
        self.drivers
            .iter()
            .map(|d| d.status(format))
            .collect::<Vec<_>>()
            .join(if format == StatusFormat::Text { "\n" } else { "<br/>\n" })
    }

    fn find_driver(&self, smsc_id: Option<&str>) -> Option<&Arc<dyn SmscDriver>> {
        match smsc_id {
            Some(id) => self.drivers.iter().find(|d| d.name() == id),
            None => self.drivers.first(),
        }
    }

    /// Routes an outbound message to the driver named by its
    /// `smsc_id` (§4.D: "honour `accepted_smsc` routing metadata"),
    /// or to any driver when unset. Returns `false` if no driver
    /// could accept it, which the caller turns into an ack(failed).
    pub fn route_outbound(&self, msg: &Message) -> bool {
        let Some(sms) = msg.as_sms() else { return false };
        self.find_driver(sms.smsc_id.as_deref()).is_some()
    }

    /// Drains `outgoing_sms` on its own OS thread (§5: "one write
    /// loop" per SMSC driver role, collapsed here to one loop shared
    /// across the configured drivers) and hands each message to the
    /// driver named by its `smsc_id`. Blocks on the `suspended`
    /// sentinel first, the same way an SMSC receiver thread would
    /// (§4.C, §4.D).
    pub fn run_outbound(&self, suspended: &Arc<Queue>) {
        loop {
            if suspended.producer_count() > 0 {
                suspended.consume();
            }
            let Some(msg) = self.outgoing_sms.consume() else { return };
            let smsc_id = msg.as_sms().and_then(|s| s.smsc_id.clone());
            match self.find_driver(smsc_id.as_deref()) {
                Some(driver) => {
                    driver.submit(&msg);
                }
                None => warn!("no SMSC driver available to route message {:?}", msg.id),
            }
        }
    }
}

/// Lets the admin HTTP surface (§4.L) fold every driver's status into
/// `/status` without depending on `SmscManager` directly.
impl crate::admin::StatusSource for SmscManager {
    fn status_fragment(&self, format: StatusFormat) -> String {
        self.status_report(format)
    }
}
