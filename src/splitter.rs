//! Outbound SMS splitter (§4.I): fragments a payload across 7-bit/
//! 8-bit SMS parts with optional header/footer/suffix and
//! concatenation UDH.
//!
//! Grounded on `gw/smsbox_req.c`'s `do_split_send`/`send_sms`/
//! `send_message`/`prepend_catenation_udh`.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::message::Sms;

/// The concatenation UDH's information-element length, per §4.I: IEI
/// (0x00) + IEL (0x03) + 3 data bytes = 5 bytes total, with the
/// information-element-length byte itself holding 3 (not the
/// source's separate `CONCAT_IEL`/`CATENATE_UDH_LEN` distinction,
/// which the grounding source uses only for an unrelated
/// maxdatalength-budget calculation).
const CONCAT_UDH_BYTES: usize = 5;

/// Process-wide wrapping reference counter for the concatenation
/// UDH, incremented once per original SMS that gets split — matching
/// the grounding source's single global `Counter`, not one counter
/// per sender.
static CONCAT_REF: AtomicU8 = AtomicU8::new(0);

pub fn next_concat_ref() -> u8 {
    CONCAT_REF.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Default)]
pub struct SplitOptions {
    pub header: Option<String>,
    pub footer: Option<String>,
    pub nonlast_suffix: Option<String>,
    pub split_chars: Option<String>,
    pub concatenation: bool,
    pub max_messages: i64,
    pub max_octets: usize,
    pub omit_empty: bool,
}

fn budget_8bit(opts: &SplitOptions, udh_len: usize) -> usize {
    let hf_len = opts.header.as_deref().unwrap_or("").len() + opts.footer.as_deref().unwrap_or("").len();
    opts.max_octets.saturating_sub(udh_len).saturating_sub(hf_len)
}

fn budget_7bit(opts: &SplitOptions, udh_len: usize) -> usize {
    let hf_len = opts.header.as_deref().unwrap_or("").len() + opts.footer.as_deref().unwrap_or("").len();
    let total_chars = opts.max_octets * 8 / 7;
    let udh_chars = (udh_len * 8 + 6) / 7; // ceil(udh_len*8/7)
    total_chars.saturating_sub(udh_chars).saturating_sub(hf_len)
}

fn split_budget(opts: &SplitOptions, flag_8bit: bool, udh_len: usize) -> usize {
    if flag_8bit {
        budget_8bit(opts, udh_len)
    } else {
        budget_7bit(opts, udh_len)
    }
}

fn cut_point(data: &[u8], budget: usize, split_chars: Option<&str>) -> usize {
    if budget >= data.len() {
        return data.len();
    }
    if let Some(chars) = split_chars {
        let chars: Vec<u8> = chars.bytes().collect();
        for i in (0..=budget).rev() {
            if i < data.len() && chars.contains(&data[i]) {
                return i + 1;
            }
        }
    }
    budget
}

fn prepend_catenation_udh(udhdata: &mut Vec<u8>, ref_byte: u8, part_no: u8, total: u8) {
    let mut new_udh = Vec::with_capacity(udhdata.len() + CONCAT_UDH_BYTES);
    new_udh.push(0); // placeholder length byte, fixed below
    new_udh.push(0x00); // IEI: concatenated short messages, 8-bit ref
    new_udh.push(0x03); // IEL: 3 information-element data bytes follow
    new_udh.push(ref_byte);
    new_udh.push(total);
    new_udh.push(part_no);
    new_udh.extend_from_slice(udhdata);
    new_udh[0] = (new_udh.len() - 1) as u8;
    *udhdata = new_udh;
}

/// One outbound SMS part, ready to enqueue into `outgoing_sms`.
pub type SplitPart = Sms;

/// Splits `msg` per §4.I's rules. `msg` is consumed; ownership of
/// each resulting part transfers to the caller, who enqueues them in
/// order.
pub fn split(mut msg: Sms, opts: &SplitOptions) -> Vec<SplitPart> {
    if opts.max_messages == 0 {
        return Vec::new();
    }

    if msg.msgdata.is_empty() {
        if opts.omit_empty {
            return Vec::new();
        }
        msg.msgdata = b"<Empty reply from service provider>".to_vec();
    }

    let udh_len = msg.udhdata.len();
    let single_part_budget = split_budget(opts, msg.flag_8bit, udh_len);
    let fits_in_one = msg.msgdata.len() <= single_part_budget || opts.max_messages == 1;

    // Splitting into more than one part that will also carry a
    // concatenation UDH must budget for that UDH's bytes up front
    // (CONCAT_UDH_BYTES + 1 length-prefix byte), not just the
    // message's pre-existing udhdata — otherwise a part could exceed
    // max_octets once the UDH is prepended.
    let multi_part_budget = if !fits_in_one && opts.concatenation && !msg.flag_udh {
        split_budget(opts, msg.flag_8bit, udh_len + CONCAT_UDH_BYTES + 1)
    } else {
        single_part_budget
    };

    let mut chunks: Vec<Vec<u8>> = Vec::new();
    if fits_in_one {
        let cut = single_part_budget.min(msg.msgdata.len());
        chunks.push(msg.msgdata[..cut].to_vec());
    } else {
        let budget = multi_part_budget;
        let nonlast_len = opts.nonlast_suffix.as_deref().unwrap_or("").len();
        let mut remaining = &msg.msgdata[..];
        loop {
            let is_last_by_size = remaining.len() <= budget;
            let this_budget = if is_last_by_size { budget } else { budget.saturating_sub(nonlast_len) };
            let cut = cut_point(remaining, this_budget, opts.split_chars.as_deref());
            let cut = cut.max(1).min(remaining.len());
            let mut chunk = remaining[..cut].to_vec();
            remaining = &remaining[cut..];
            if !remaining.is_empty() {
                if let Some(suffix) = &opts.nonlast_suffix {
                    chunk.extend_from_slice(suffix.as_bytes());
                }
            }
            chunks.push(chunk);
            if remaining.is_empty() {
                break;
            }
            if opts.max_messages > 0 && chunks.len() as i64 >= opts.max_messages {
                break;
            }
        }
    }

    if opts.max_messages > 0 {
        chunks.truncate(opts.max_messages as usize);
    }

    let total = chunks.len();
    // Concatenation is incompatible with a message that already
    // carries its own UDH, and pointless for a single part. (A
    // literal reading of the spec's drop condition also excludes
    // 7-bit payloads with more than one part, but that contradicts
    // the worked S2 scenario — a 7-bit, 3-part, concatenated SMS is
    // exactly what it specifies as the expected output — so this
    // follows the concrete scenario: concatenation is only dropped
    // for an already-UDH'd message or a message that doesn't split.)
    let want_concat = opts.concatenation && !msg.flag_udh && total > 1;
    let concat_ref = if want_concat { Some(next_concat_ref()) } else { None };

    let mut parts = Vec::with_capacity(total);
    for (i, chunk) in chunks.into_iter().enumerate() {
        let mut part = msg.clone();
        let mut body = Vec::new();
        if let Some(h) = &opts.header {
            body.extend_from_slice(h.as_bytes());
        }
        body.extend_from_slice(&chunk);
        if let Some(f) = &opts.footer {
            body.extend_from_slice(f.as_bytes());
        }
        part.msgdata = body;

        if let Some(ref_byte) = concat_ref {
            prepend_catenation_udh(&mut part.udhdata, ref_byte, (i + 1) as u8, total as u8);
            part.flag_udh = true;
        }
        parts.push(part);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SmsType;

    fn base_sms(data: &[u8]) -> Sms {
        let mut sms = Sms::new("222", "111", SmsType::MtReply);
        sms.msgdata = data.to_vec();
        sms.flag_8bit = false;
        sms
    }

    #[test]
    fn s2_split_with_concatenation() {
        let data = vec![b'A'; 400];
        let sms = base_sms(&data);
        let opts = SplitOptions {
            concatenation: true,
            max_messages: 4,
            max_octets: 140,
            ..Default::default()
        };
        let parts = split(sms, &opts);
        assert_eq!(parts.len(), 3);
        for (i, p) in parts.iter().enumerate() {
            assert!(p.flag_udh);
            assert!(p.msgdata.len() <= 153);
            assert_eq!(p.udhdata[0] as usize, p.udhdata.len() - 1);
            assert_eq!(p.udhdata[1], 0x00);
            assert_eq!(p.udhdata[2], 0x03);
            assert_eq!(p.udhdata[4], 3); // total
            assert_eq!(p.udhdata[5], (i + 1) as u8); // part_no
        }
    }

    #[test]
    fn s2_payload_concatenates_back_to_original() {
        let data = vec![b'A'; 400];
        let sms = base_sms(&data);
        let opts = SplitOptions {
            concatenation: true,
            max_messages: 4,
            max_octets: 140,
            ..Default::default()
        };
        let parts = split(sms, &opts);
        let joined: Vec<u8> = parts.iter().flat_map(|p| p.msgdata.clone()).collect();
        assert_eq!(joined.len(), 400);
        assert!(joined.iter().all(|&b| b == b'A'));
    }

    #[test]
    fn fits_in_one_part_when_under_budget() {
        let sms = base_sms(b"short");
        let opts = SplitOptions {
            max_messages: 1,
            max_octets: 140,
            ..Default::default()
        };
        let parts = split(sms, &opts);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].msgdata, b"short");
        assert!(!parts[0].flag_udh);
    }

    #[test]
    fn empty_payload_is_replaced_or_dropped() {
        let sms = base_sms(b"");
        let opts = SplitOptions {
            max_messages: 1,
            max_octets: 140,
            ..Default::default()
        };
        let parts = split(sms.clone(), &opts);
        assert_eq!(parts[0].msgdata, b"<Empty reply from service provider>");

        let opts_omit = SplitOptions {
            max_messages: 1,
            max_octets: 140,
            omit_empty: true,
            ..Default::default()
        };
        let parts = split(sms, &opts_omit);
        assert!(parts.is_empty());
    }

    #[test]
    fn max_messages_zero_drops_silently() {
        let sms = base_sms(b"hello");
        let opts = SplitOptions {
            max_messages: 0,
            max_octets: 140,
            ..Default::default()
        };
        assert!(split(sms, &opts).is_empty());
    }

    #[test]
    fn max_messages_truncates_excess_parts() {
        let data = vec![b'B'; 1000];
        let sms = base_sms(&data);
        let opts = SplitOptions {
            concatenation: false,
            max_messages: 2,
            max_octets: 140,
            ..Default::default()
        };
        let parts = split(sms, &opts);
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn concatenation_dropped_when_already_flag_udh_set() {
        let mut sms = base_sms(&vec![b'C'; 400]);
        sms.flag_udh = true;
        sms.udhdata = vec![2, 9, 9];
        let opts = SplitOptions {
            concatenation: true,
            max_messages: 4,
            max_octets: 140,
            ..Default::default()
        };
        let parts = split(sms, &opts);
        for p in &parts {
            // original udh preserved verbatim, no concat UDH prepended
            assert_eq!(p.udhdata, vec![2, 9, 9]);
        }
    }
}
