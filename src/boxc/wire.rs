//! Box wire protocol (§6): each direction is a stream of
//! length-prefixed frames. Frame = 4-byte big-endian length, then
//! `length` bytes of a [`Message`] serialized as tagged key/value
//! records. The first record names the variant; subsequent records
//! carry its fields as `(u8 field_tag, u32 be_len, bytes)` tuples.
//! An unrecognized field tag is skipped by length and ignored; an
//! unrecognized *variant* tag in the first record resets the
//! connection (`BoxProtocolError::UnknownVariant`).
//!
//! Grounded on `gw/smsbox.c`'s `read_messages_from_bearerbox`/
//! `write_to_bearerbox` framing (`Msg` pickled with a leading type
//! byte), re-expressed here as the explicit field-tag scheme named
//! in SPEC_FULL §6 rather than the source's positional-field pickle.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::BoxProtocolError;
use crate::message::{Ack, AckStatus, Admin, AdminCommand, Heartbeat, Message, MessageBody, MessageId, Sms, SmsType, WdpDatagram};

const VARIANT_SMS: u8 = 0x01;
const VARIANT_WDP: u8 = 0x02;
const VARIANT_ADMIN: u8 = 0x03;
const VARIANT_ACK: u8 = 0x04;
const VARIANT_HEARTBEAT: u8 = 0x05;

// SMS field tags.
const F_SENDER: u8 = 0x01;
const F_RECEIVER: u8 = 0x02;
const F_SMS_TYPE: u8 = 0x03;
const F_MSGDATA: u8 = 0x04;
const F_UDHDATA: u8 = 0x05;
const F_FLAG_8BIT: u8 = 0x06;
const F_FLAG_UDH: u8 = 0x07;
const F_SMSC_ID: u8 = 0x08;
const F_BOXC_ID: u8 = 0x09;
const F_SERVICE: u8 = 0x0a;
const F_ACCOUNT: u8 = 0x0b;
const F_TIME: u8 = 0x0c;
const F_MSG_ID: u8 = 0x0d;

// WDP field tags.
const F_SRC_ADDR: u8 = 0x01;
const F_SRC_PORT: u8 = 0x02;
const F_DST_ADDR: u8 = 0x03;
const F_DST_PORT: u8 = 0x04;
const F_USER_DATA: u8 = 0x05;

// Admin field tags.
const F_COMMAND: u8 = 0x01;

// Ack field tags.
const F_REF_ID: u8 = 0x01;
const F_STATUS: u8 = 0x02;

// Heartbeat field tags.
const F_LOAD: u8 = 0x01;

struct RecordWriter {
    body: Vec<u8>,
}

impl RecordWriter {
    fn new(variant: u8) -> Self {
        let mut w = RecordWriter { body: Vec::new() };
        w.put(variant, &[]);
        w
    }

    fn put(&mut self, tag: u8, bytes: &[u8]) {
        self.body.push(tag);
        self.body.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        self.body.extend_from_slice(bytes);
    }

    fn put_str(&mut self, tag: u8, s: &str) {
        self.put(tag, s.as_bytes());
    }

    fn put_opt_str(&mut self, tag: u8, s: &Option<String>) {
        if let Some(s) = s {
            self.put_str(tag, s);
        }
    }

    fn put_u8(&mut self, tag: u8, v: u8) {
        self.put(tag, &[v]);
    }

    fn put_u16(&mut self, tag: u8, v: u16) {
        self.put(tag, &v.to_be_bytes());
    }

    fn put_u64(&mut self, tag: u8, v: u64) {
        self.put(tag, &v.to_be_bytes());
    }

    fn put_i32(&mut self, tag: u8, v: i32) {
        self.put(tag, &v.to_be_bytes());
    }
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn from_unix_secs(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

fn sms_type_tag(t: SmsType) -> u8 {
    match t {
        SmsType::Mo => 0,
        SmsType::MtReply => 1,
        SmsType::MtPush => 2,
    }
}

fn sms_type_from_tag(tag: u8) -> Option<SmsType> {
    match tag {
        0 => Some(SmsType::Mo),
        1 => Some(SmsType::MtReply),
        2 => Some(SmsType::MtPush),
        _ => None,
    }
}

fn admin_command_tag(c: AdminCommand) -> u8 {
    match c {
        AdminCommand::Identify => 0,
        AdminCommand::Shutdown => 1,
        AdminCommand::Suspend => 2,
        AdminCommand::Resume => 3,
        AdminCommand::Restart => 4,
    }
}

fn admin_command_from_tag(tag: u8) -> Option<AdminCommand> {
    match tag {
        0 => Some(AdminCommand::Identify),
        1 => Some(AdminCommand::Shutdown),
        2 => Some(AdminCommand::Suspend),
        3 => Some(AdminCommand::Resume),
        4 => Some(AdminCommand::Restart),
        _ => None,
    }
}

fn ack_status_tag(s: AckStatus) -> u8 {
    match s {
        AckStatus::Success => 0,
        AckStatus::Failed => 1,
        AckStatus::FailedTemporary => 2,
        AckStatus::Buffered => 3,
    }
}

fn ack_status_from_tag(tag: u8) -> Option<AckStatus> {
    match tag {
        0 => Some(AckStatus::Success),
        1 => Some(AckStatus::Failed),
        2 => Some(AckStatus::FailedTemporary),
        3 => Some(AckStatus::Buffered),
        _ => None,
    }
}

/// Serializes a [`Message`] into a frame body (without the 4-byte
/// length prefix; see [`write_frame`]/[`read_frame`] for the prefix).
pub fn encode(msg: &Message) -> Vec<u8> {
    let mut w = match &msg.body {
        MessageBody::Sms(sms) => {
            let mut w = RecordWriter::new(VARIANT_SMS);
            w.put_str(F_SENDER, &sms.sender);
            w.put_str(F_RECEIVER, &sms.receiver);
            w.put_u8(F_SMS_TYPE, sms_type_tag(sms.sms_type));
            w.put(F_MSGDATA, &sms.msgdata);
            w.put(F_UDHDATA, &sms.udhdata);
            w.put_u8(F_FLAG_8BIT, sms.flag_8bit as u8);
            w.put_u8(F_FLAG_UDH, sms.flag_udh as u8);
            w.put_opt_str(F_SMSC_ID, &sms.smsc_id);
            w.put_opt_str(F_BOXC_ID, &sms.boxc_id);
            w.put_opt_str(F_SERVICE, &sms.service);
            w.put_opt_str(F_ACCOUNT, &sms.account);
            w.put_u64(F_TIME, unix_secs(sms.time));
            w
        }
        MessageBody::Wdp(wdp) => {
            let mut w = RecordWriter::new(VARIANT_WDP);
            w.put_str(F_SRC_ADDR, &wdp.src_addr);
            w.put_u16(F_SRC_PORT, wdp.src_port);
            w.put_str(F_DST_ADDR, &wdp.dst_addr);
            w.put_u16(F_DST_PORT, wdp.dst_port);
            w.put(F_USER_DATA, &wdp.user_data);
            w
        }
        MessageBody::Admin(admin) => {
            let mut w = RecordWriter::new(VARIANT_ADMIN);
            w.put_u8(F_COMMAND, admin_command_tag(admin.command));
            w.put_opt_str(F_BOXC_ID, &admin.boxc_id);
            w
        }
        MessageBody::Ack(ack) => {
            let mut w = RecordWriter::new(VARIANT_ACK);
            w.put_u64(F_REF_ID, ack.ref_id.0);
            w.put_u8(F_STATUS, ack_status_tag(ack.status));
            w
        }
        MessageBody::Heartbeat(hb) => {
            let mut w = RecordWriter::new(VARIANT_HEARTBEAT);
            w.put_i32(F_LOAD, hb.load);
            w
        }
    };
    w.put_u64(F_MSG_ID, msg.id.0);
    w.body
}

struct RecordReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        RecordReader { buf, pos: 0 }
    }

    fn next(&mut self) -> Result<Option<(u8, &'a [u8])>, BoxProtocolError> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        if self.pos + 5 > self.buf.len() {
            return Err(BoxProtocolError::Truncated);
        }
        let tag = self.buf[self.pos];
        let len = u32::from_be_bytes(self.buf[self.pos + 1..self.pos + 5].try_into().unwrap()) as usize;
        let start = self.pos + 5;
        if start + len > self.buf.len() {
            return Err(BoxProtocolError::Truncated);
        }
        self.pos = start + len;
        Ok(Some((tag, &self.buf[start..start + len])))
    }
}

fn to_string_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn to_u8(bytes: &[u8]) -> u8 {
    bytes.first().copied().unwrap_or(0)
}

fn to_u16(bytes: &[u8]) -> u16 {
    let mut b = [0u8; 2];
    let n = bytes.len().min(2);
    b[..n].copy_from_slice(&bytes[..n]);
    u16::from_be_bytes(b)
}

fn to_u64(bytes: &[u8]) -> u64 {
    let mut b = [0u8; 8];
    let n = bytes.len().min(8);
    b[..n].copy_from_slice(&bytes[..n]);
    u64::from_be_bytes(b)
}

fn to_i32(bytes: &[u8]) -> i32 {
    let mut b = [0u8; 4];
    let n = bytes.len().min(4);
    b[..n].copy_from_slice(&bytes[..n]);
    i32::from_be_bytes(b)
}

/// Parses a frame body back into a [`Message`]. An unrecognized
/// variant tag in the first record is a hard protocol error
/// (connection reset, §6); an unrecognized field tag within a known
/// variant is skipped by length and ignored.
pub fn decode(body: &[u8]) -> Result<Message, BoxProtocolError> {
    let mut reader = RecordReader::new(body);
    let Some((variant, _)) = reader.next()? else {
        return Err(BoxProtocolError::Truncated);
    };

    let mut id = None;
    macro_rules! collect_id {
        ($tag:expr, $bytes:expr) => {
            if $tag == F_MSG_ID {
                id = Some(MessageId(to_u64($bytes)));
                continue;
            }
        };
    }

    let body_value = match variant {
        VARIANT_SMS => {
            let mut sms = Sms::new("", "", SmsType::Mo);
            while let Some((tag, bytes)) = reader.next()? {
                collect_id!(tag, bytes);
                match tag {
                    F_SENDER => sms.sender = to_string_lossy(bytes),
                    F_RECEIVER => sms.receiver = to_string_lossy(bytes),
                    F_SMS_TYPE => sms.sms_type = sms_type_from_tag(to_u8(bytes)).unwrap_or(SmsType::Mo),
                    F_MSGDATA => sms.msgdata = bytes.to_vec(),
                    F_UDHDATA => sms.udhdata = bytes.to_vec(),
                    F_FLAG_8BIT => sms.flag_8bit = to_u8(bytes) != 0,
                    F_FLAG_UDH => sms.flag_udh = to_u8(bytes) != 0,
                    F_SMSC_ID => sms.smsc_id = Some(to_string_lossy(bytes)),
                    F_BOXC_ID => sms.boxc_id = Some(to_string_lossy(bytes)),
                    F_SERVICE => sms.service = Some(to_string_lossy(bytes)),
                    F_ACCOUNT => sms.account = Some(to_string_lossy(bytes)),
                    F_TIME => sms.time = from_unix_secs(to_u64(bytes)),
                    _ => {} // unknown field tag: skip by length, ignore
                }
            }
            MessageBody::Sms(sms)
        }
        VARIANT_WDP => {
            let mut wdp = WdpDatagram {
                src_addr: String::new(),
                src_port: 0,
                dst_addr: String::new(),
                dst_port: 0,
                user_data: Vec::new(),
            };
            while let Some((tag, bytes)) = reader.next()? {
                collect_id!(tag, bytes);
                match tag {
                    F_SRC_ADDR => wdp.src_addr = to_string_lossy(bytes),
                    F_SRC_PORT => wdp.src_port = to_u16(bytes),
                    F_DST_ADDR => wdp.dst_addr = to_string_lossy(bytes),
                    F_DST_PORT => wdp.dst_port = to_u16(bytes),
                    F_USER_DATA => wdp.user_data = bytes.to_vec(),
                    _ => {}
                }
            }
            MessageBody::Wdp(wdp)
        }
        VARIANT_ADMIN => {
            let mut admin = Admin { command: AdminCommand::Identify, boxc_id: None };
            while let Some((tag, bytes)) = reader.next()? {
                collect_id!(tag, bytes);
                match tag {
                    F_COMMAND => admin.command = admin_command_from_tag(to_u8(bytes)).unwrap_or(AdminCommand::Identify),
                    F_BOXC_ID => admin.boxc_id = Some(to_string_lossy(bytes)),
                    _ => {}
                }
            }
            MessageBody::Admin(admin)
        }
        VARIANT_ACK => {
            let mut ref_id = MessageId(0);
            let mut status = AckStatus::Failed;
            while let Some((tag, bytes)) = reader.next()? {
                collect_id!(tag, bytes);
                match tag {
                    F_REF_ID => ref_id = MessageId(to_u64(bytes)),
                    F_STATUS => status = ack_status_from_tag(to_u8(bytes)).unwrap_or(AckStatus::Failed),
                    _ => {}
                }
            }
            MessageBody::Ack(Ack { ref_id, status })
        }
        VARIANT_HEARTBEAT => {
            let mut load = 0;
            while let Some((tag, bytes)) = reader.next()? {
                collect_id!(tag, bytes);
                if tag == F_LOAD {
                    load = to_i32(bytes);
                }
            }
            MessageBody::Heartbeat(Heartbeat { load })
        }
        other => return Err(BoxProtocolError::UnknownVariant(other)),
    };

    Ok(Message {
        id: id.unwrap_or_else(MessageId::next),
        body: body_value,
    })
}

/// Writes one length-prefixed frame to an async stream.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(w: &mut W, msg: &Message) -> Result<(), BoxProtocolError> {
    let body = encode(msg);
    w.write_all(&(body.len() as u32).to_be_bytes()).await?;
    w.write_all(&body).await?;
    Ok(())
}

/// Reads one length-prefixed frame from an async stream. Returns
/// `Ok(None)` on a clean EOF before any bytes of the next frame.
pub async fn read_frame<R: AsyncReadExt + Unpin>(r: &mut R) -> Result<Option<Message>, BoxProtocolError> {
    let mut len_buf = [0u8; 4];
    match r.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    r.read_exact(&mut body).await?;
    decode(&body).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageBody;

    #[test]
    fn sms_round_trips_through_encode_decode() {
        let mut sms = Sms::new("111", "222", SmsType::Mo);
        sms.msgdata = b"hello".to_vec();
        sms.smsc_id = Some("smsc-a".to_string());
        let msg = Message::sms(sms);
        let encoded = encode(&msg);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.id, msg.id);
        let sms2 = decoded.as_sms().unwrap();
        assert_eq!(sms2.sender, "111");
        assert_eq!(sms2.receiver, "222");
        assert_eq!(sms2.msgdata, b"hello");
        assert_eq!(sms2.smsc_id.as_deref(), Some("smsc-a"));
    }

    #[test]
    fn heartbeat_round_trips() {
        let msg = Message::new(MessageBody::Heartbeat(Heartbeat { load: 42 }));
        let decoded = decode(&encode(&msg)).unwrap();
        match decoded.body {
            MessageBody::Heartbeat(hb) => assert_eq!(hb.load, 42),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn admin_identify_round_trips() {
        let msg = Message::new(MessageBody::Admin(Admin {
            command: AdminCommand::Identify,
            boxc_id: Some("smsbox-1".to_string()),
        }));
        let decoded = decode(&encode(&msg)).unwrap();
        match decoded.body {
            MessageBody::Admin(a) => {
                assert_eq!(a.command, AdminCommand::Identify);
                assert_eq!(a.boxc_id.as_deref(), Some("smsbox-1"));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_field_tag_is_skipped_not_fatal() {
        let mut sms = Sms::new("1", "2", SmsType::Mo);
        sms.msgdata = b"x".to_vec();
        let msg = Message::sms(sms);
        let mut encoded = encode(&msg);
        // Append a bogus trailing field with an unrecognized tag.
        encoded.push(0xEE);
        encoded.extend_from_slice(&3u32.to_be_bytes());
        encoded.extend_from_slice(b"abc");
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.as_sms().unwrap().msgdata, b"x");
    }

    #[test]
    fn unknown_variant_tag_is_an_error() {
        let mut body = Vec::new();
        body.push(0x7F); // unrecognized variant
        body.extend_from_slice(&0u32.to_be_bytes());
        let err = decode(&body).unwrap_err();
        assert!(matches!(err, BoxProtocolError::UnknownVariant(0x7F)));
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let body = vec![VARIANT_SMS, 0, 0, 0]; // length prefix cut short
        assert!(decode(&body).is_err());
    }
}
