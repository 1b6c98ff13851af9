//! Service dispatcher (§4.H, "the hardest subsystem"): matches an
//! inbound MO SMS against the URL-translation table, expands its
//! pattern, and either replies immediately (TEXT/FILE/SENDSMS) or
//! issues an HTTP GET and replies once the response lands (URL).
//!
//! Grounded on `gw/smsbox_req.c` in full: `smsbox_req_thread`,
//! `obey_request`, `reply_thread`. The worker pool here is sized by
//! configuration (default 20, matching §5's "one dispatcher pool")
//! rather than the grounding source's single loop; the HTTP reply
//! pump stays a single task, keeping the per-request follow-up work
//! single-writer the way `reply_thread` is.

pub mod html;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::message::{Message, MessageBody, Sms, SmsType};
use crate::pattern::{self, ExpandContext};
use crate::queue::Queue;
use crate::splitter::{self, SplitOptions};
use crate::urltrans::{TransType, UrlTranslation, UrlTranslationList};

const FALLBACK_BODY: &str = "Result could not be represented as an SMS message.";
const FETCH_ERROR_BODY: &str = "Could not fetch content, sorry.";

fn split_words(msgdata: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(msgdata)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn split_opts_for(t: &UrlTranslation, max_octets: usize) -> SplitOptions {
    SplitOptions {
        header: t.header.clone(),
        footer: t.footer.clone(),
        nonlast_suffix: t.split_suffix.clone(),
        split_chars: t.split_chars.clone(),
        concatenation: t.concatenation,
        max_messages: t.max_messages,
        max_octets,
        omit_empty: t.omit_empty,
    }
}

/// Builds the reply skeleton: sender/receiver swapped relative to the
/// inbound SMS (§4.H step 5), with `faked_sender` taking precedence
/// over a configured `global_sender`.
fn reply_template(inbound: &Sms, t: &UrlTranslation, global_sender: Option<&str>) -> Sms {
    error_reply_skeleton(inbound, t.faked_sender.as_deref(), global_sender)
}

fn error_reply_skeleton(inbound: &Sms, faked_sender: Option<&str>, global_sender: Option<&str>) -> Sms {
    let sender = faked_sender
        .map(str::to_string)
        .or_else(|| global_sender.map(str::to_string))
        .unwrap_or_else(|| inbound.receiver.clone());
    let mut reply = Sms::new(sender, inbound.sender.clone(), SmsType::MtReply);
    reply.smsc_id = inbound.smsc_id.clone();
    reply
}

/// A request that has been handed off to the HTTP reply pump; carries
/// everything needed to finish the reply once the response lands, so
/// the pump needs no separate lookup table keyed by request id — the
/// id travels with its own context instead of a shared map.
struct DispatchJob {
    url: String,
    prefix: Option<String>,
    suffix: Option<String>,
    reply: Sms,
    split_opts: SplitOptions,
}

pub struct DispatchEngine {
    translations: Arc<UrlTranslationList>,
    incoming_sms: Arc<Queue>,
    outgoing_sms: Arc<Queue>,
    http: reqwest::Client,
    global_sender: Option<String>,
    sms_max_length: usize,
    http_tx: mpsc::UnboundedSender<DispatchJob>,
}

impl DispatchEngine {
    pub fn new(
        translations: Arc<UrlTranslationList>,
        incoming_sms: Arc<Queue>,
        outgoing_sms: Arc<Queue>,
        global_sender: Option<String>,
        sms_max_length: usize,
        http_timeout: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<DispatchJob>) {
        let (http_tx, http_rx) = mpsc::unbounded_channel();
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let engine = Arc::new(DispatchEngine {
            translations,
            incoming_sms,
            outgoing_sms,
            http,
            global_sender,
            sms_max_length,
            http_tx,
        });
        (engine, http_rx)
    }

    /// Spawns `pool_size` OS-thread workers (§5), each blocking on
    /// `incoming_sms` and dispatching one MO SMS at a time.
    pub fn spawn_workers(self: &Arc<Self>, pool_size: usize) -> Vec<thread::JoinHandle<()>> {
        (0..pool_size)
            .map(|i| {
                let engine = self.clone();
                thread::Builder::new()
                    .name(format!("dispatch-{i}"))
                    .spawn(move || engine.worker_loop())
                    .expect("failed to spawn dispatch worker")
            })
            .collect()
    }

    fn worker_loop(&self) {
        while let Some(msg) = self.incoming_sms.consume() {
            let Some(sms) = msg.into_sms() else { continue };
            if sms.sms_type != SmsType::Mo {
                continue;
            }
            self.dispatch_one(sms);
        }
    }

    fn enqueue_reply(&self, reply: Sms, max_octets: usize) {
        let opts = SplitOptions { max_octets, max_messages: 1, ..Default::default() };
        for part in splitter::split(reply, &opts) {
            if let Err((err, _)) = self.outgoing_sms.produce(Message::new(MessageBody::Sms(part))) {
                warn!("outgoing_sms overflow, dropping dispatcher reply: {err}");
            }
        }
    }

    fn dispatch_one(&self, sms: Sms) {
        let words = split_words(&sms.msgdata);
        let Some(keyword) = words.first().cloned() else {
            let mut reply = error_reply_skeleton(&sms, None, self.global_sender.as_deref());
            reply.msgdata = b"Request failed".to_vec();
            self.enqueue_reply(reply, self.sms_max_length);
            return;
        };
        let args = &words[1..];

        let Some(t) = self.translations.find(&keyword, args.len(), sms.smsc_id.as_deref()) else {
            let mut reply = error_reply_skeleton(&sms, None, self.global_sender.as_deref());
            reply.msgdata = b"Request failed".to_vec();
            self.enqueue_reply(reply, self.sms_max_length);
            return;
        };

        let ctx = ExpandContext {
            keyword: &keyword,
            args,
            receiver: &sms.receiver,
            sender: &sms.sender,
            time: sms.time,
        };
        let expanded = pattern::expand(&t.compiled_pattern, &ctx);
        let mut reply = reply_template(&sms, t, self.global_sender.as_deref());
        let split_opts = split_opts_for(t, self.sms_max_length);

        match t.trans_type {
            TransType::Text => {
                reply.msgdata = expanded.into_bytes();
                self.enqueue_with_opts(reply, split_opts);
            }
            TransType::File => {
                reply.msgdata = std::fs::read(&expanded).unwrap_or_else(|e| {
                    warn!("dispatch file translation `{expanded}` unreadable: {e}");
                    b"Request failed".to_vec()
                });
                self.enqueue_with_opts(reply, split_opts);
            }
            TransType::Url => {
                let job = DispatchJob {
                    url: expanded,
                    prefix: t.prefix.clone(),
                    suffix: t.suffix.clone(),
                    reply,
                    split_opts,
                };
                if self.http_tx.send(job).is_err() {
                    warn!("HTTP reply pump is gone, dropping dispatch job");
                }
            }
            TransType::Sendsms => {
                reply.msgdata = b"Got URL translation type SENDSMS for incoming message.".to_vec();
                self.enqueue_with_opts(reply, split_opts);
            }
        }
    }

    fn enqueue_with_opts(&self, reply: Sms, opts: SplitOptions) {
        for part in splitter::split(reply, &opts) {
            if let Err((err, _)) = self.outgoing_sms.produce(Message::new(MessageBody::Sms(part))) {
                warn!("outgoing_sms overflow, dropping dispatcher reply: {err}");
            }
        }
    }
}

/// The single HTTP-reply pump (§4.H step 7): owns the `reqwest`
/// client and `outgoing_sms`'s write side for URL-dispatched replies,
/// so no lock is needed around reply processing.
pub async fn run_http_reply_pump(
    engine: Arc<DispatchEngine>,
    mut rx: mpsc::UnboundedReceiver<DispatchJob>,
) {
    let mut pending = JoinSet::new();
    loop {
        tokio::select! {
            job = rx.recv() => {
                match job {
                    Some(job) => {
                        let client = engine.http.clone();
                        let outgoing_sms = engine.outgoing_sms.clone();
                        pending.spawn(async move {
                            let result = client.get(&job.url).send().await;
                            finish_reply(result, job, &outgoing_sms).await;
                        });
                    }
                    None => break,
                }
            }
            Some(res) = pending.join_next(), if !pending.is_empty() => {
                if let Err(e) = res {
                    debug!("dispatch reply task panicked: {e}");
                }
            }
        }
    }
    while pending.join_next().await.is_some() {}
}

async fn finish_reply(result: reqwest::Result<reqwest::Response>, job: DispatchJob, outgoing_sms: &Queue) {
    let DispatchJob { prefix, suffix, mut reply, split_opts, .. } = job;

    // A fetch error, a timeout, or a non-2xx status (§5's status=-1
    // case; the source's `status != HTTP_OK` branch in smsbox.c)
    // always yields the fixed "could not fetch" body. FALLBACK_BODY
    // is reserved for a 200 response whose content-type can't be
    // turned into an SMS.
    let body_text = match result {
        Ok(resp) if resp.status().is_success() => {
            let content_type = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            let is_html_like = content_type.contains("text/html") || content_type.contains("text/vnd.wap.wml");
            let is_plain = content_type.contains("text/plain");
            match resp.text().await {
                Ok(body) if is_html_like => {
                    let cut = cut_between(&body, prefix.as_deref(), suffix.as_deref());
                    html::html_to_sms(cut)
                }
                Ok(body) if is_plain => body.trim().to_string(),
                _ => FALLBACK_BODY.to_string(),
            }
        }
        _ => FETCH_ERROR_BODY.to_string(),
    };

    reply.msgdata = body_text.into_bytes();
    for part in splitter::split(reply, &split_opts) {
        if let Err((err, _)) = outgoing_sms.produce(Message::new(MessageBody::Sms(part))) {
            warn!("outgoing_sms overflow, dropping dispatcher HTTP reply: {err}");
        }
    }
}

/// Extracts the substring strictly between the first occurrence of
/// `prefix` and the first subsequent occurrence of `suffix` (§4.H step
/// 7, S5). A prefix cuts everything up to and including its match;
/// a suffix cuts everything from its match onward, searched only in
/// what's left after the prefix cut. Either bound is a no-op when
/// absent, empty, or not found in the remaining text.
fn cut_between<'a>(haystack: &'a str, prefix: Option<&str>, suffix: Option<&str>) -> &'a str {
    let after_prefix = match prefix {
        Some(p) if !p.is_empty() => match haystack.find(p) {
            Some(idx) => &haystack[idx + p.len()..],
            None => haystack,
        },
        _ => haystack,
    };
    match suffix {
        Some(s) if !s.is_empty() => match after_prefix.find(s) {
            Some(idx) => &after_prefix[..idx],
            None => after_prefix,
        },
        _ => after_prefix,
    }
}
