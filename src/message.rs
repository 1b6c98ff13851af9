//! The tagged-union value that flows through every queue in the
//! gateway: SMS, WDP datagram, admin command, delivery ack, and
//! heartbeat. See §3 of the design document for the data model and
//! §6 for how a [`Message`] is framed on the box wire protocol.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u64);

impl MessageId {
    pub fn next() -> Self {
        MessageId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsType {
    Mo,
    MtReply,
    MtPush,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sms {
    pub sender: String,
    pub receiver: String,
    pub sms_type: SmsType,
    pub msgdata: Vec<u8>,
    pub udhdata: Vec<u8>,
    pub flag_8bit: bool,
    pub flag_udh: bool,
    pub smsc_id: Option<String>,
    pub boxc_id: Option<String>,
    pub service: Option<String>,
    pub account: Option<String>,
    pub time: SystemTime,
}

impl Sms {
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, sms_type: SmsType) -> Self {
        Sms {
            sender: sender.into(),
            receiver: receiver.into(),
            sms_type,
            msgdata: Vec::new(),
            udhdata: Vec::new(),
            flag_8bit: false,
            flag_udh: false,
            smsc_id: None,
            boxc_id: None,
            service: None,
            account: None,
            time: SystemTime::now(),
        }
    }

    /// An SMS with `flag_udh` set must carry a nonempty `udhdata` whose
    /// first byte equals `len(udhdata) - 1` (§3 invariant).
    pub fn udh_invariant_holds(&self) -> bool {
        if !self.flag_udh {
            return true;
        }
        !self.udhdata.is_empty() && self.udhdata[0] as usize == self.udhdata.len() - 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WdpDatagram {
    pub src_addr: String,
    pub src_port: u16,
    pub dst_addr: String,
    pub dst_port: u16,
    pub user_data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    Identify,
    Shutdown,
    Suspend,
    Resume,
    Restart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admin {
    pub command: AdminCommand,
    pub boxc_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Success,
    Failed,
    FailedTemporary,
    Buffered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub ref_id: MessageId,
    pub status: AckStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub load: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Sms(Sms),
    Wdp(WdpDatagram),
    Admin(Admin),
    Ack(Ack),
    Heartbeat(Heartbeat),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub body: MessageBody,
}

impl Message {
    pub fn new(body: MessageBody) -> Self {
        Message {
            id: MessageId::next(),
            body,
        }
    }

    pub fn sms(sms: Sms) -> Self {
        Message::new(MessageBody::Sms(sms))
    }

    pub fn as_sms(&self) -> Option<&Sms> {
        match &self.body {
            MessageBody::Sms(sms) => Some(sms),
            _ => None,
        }
    }

    pub fn into_sms(self) -> Option<Sms> {
        match self.body {
            MessageBody::Sms(sms) => Some(sms),
            _ => None,
        }
    }

    pub fn as_wdp(&self) -> Option<&WdpDatagram> {
        match &self.body {
            MessageBody::Wdp(wdp) => Some(wdp),
            _ => None,
        }
    }

    pub fn into_wdp(self) -> Option<WdpDatagram> {
        match self.body {
            MessageBody::Wdp(wdp) => Some(wdp),
            _ => None,
        }
    }
}
