//! End-to-end service dispatch (§4.H) for a TEXT translation: an
//! inbound MO SMS is matched against the URL-translation table,
//! expanded, and split into an outbound reply, without touching the
//! network (TEXT translations never reach the HTTP reply pump).

use std::sync::Arc;
use std::time::Duration;

use bearerbox::dispatch::DispatchEngine;
use bearerbox::message::{Message, MessageBody, Sms, SmsType};
use bearerbox::queue::Queue;
use bearerbox::urltrans::{TransType, UrlTranslation, UrlTranslationList};

#[test]
fn echo_keyword_produces_expanded_text_reply() {
    let mut translations = UrlTranslationList::new();
    let mut echo = UrlTranslation::new(Some("echo"), TransType::Text, "you said: %a");
    echo.has_catchall_arg = true;
    translations.add(echo);

    let incoming_sms = Arc::new(Queue::new(16));
    let outgoing_sms = Arc::new(Queue::new(16));

    let (engine, _http_rx) = DispatchEngine::new(
        Arc::new(translations),
        incoming_sms.clone(),
        outgoing_sms.clone(),
        None,
        160,
        Duration::from_secs(5),
    );

    incoming_sms.add_producer();
    let workers = engine.spawn_workers(1);

    let mut mo = Sms::new("1234", "5678", SmsType::Mo);
    mo.msgdata = b"echo hello world".to_vec();
    incoming_sms.produce(Message::new(MessageBody::Sms(mo))).unwrap();

    let reply = loop {
        if let Some(msg) = outgoing_sms.try_consume_nonblocking() {
            break msg;
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    let sms = reply.into_sms().expect("reply must be an SMS");
    assert_eq!(sms.sms_type, SmsType::MtReply);
    assert_eq!(sms.sender, "5678");
    assert_eq!(sms.receiver, "1234");
    assert_eq!(sms.msgdata, b"you said: hello+world");

    incoming_sms.remove_producer();
    for w in workers {
        w.join().unwrap();
    }
}

#[test]
fn unmatched_keyword_replies_request_failed() {
    let translations = UrlTranslationList::new();
    let incoming_sms = Arc::new(Queue::new(16));
    let outgoing_sms = Arc::new(Queue::new(16));

    let (engine, _http_rx) = DispatchEngine::new(
        Arc::new(translations),
        incoming_sms.clone(),
        outgoing_sms.clone(),
        None,
        160,
        Duration::from_secs(5),
    );

    incoming_sms.add_producer();
    let workers = engine.spawn_workers(1);

    let mut mo = Sms::new("1234", "5678", SmsType::Mo);
    mo.msgdata = b"nosuchkeyword".to_vec();
    incoming_sms.produce(Message::new(MessageBody::Sms(mo))).unwrap();

    let reply = loop {
        if let Some(msg) = outgoing_sms.try_consume_nonblocking() {
            break msg;
        }
        std::thread::sleep(Duration::from_millis(10));
    };
    let sms = reply.into_sms().expect("reply must be an SMS");
    assert_eq!(sms.msgdata, b"Request failed");

    incoming_sms.remove_producer();
    for w in workers {
        w.join().unwrap();
    }
}
