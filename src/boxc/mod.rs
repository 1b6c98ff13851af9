//! Box connection manager (§4.E): accepts smsbox/wapbox TCP
//! connections and routes SMS/WDP traffic to/from them.
//!
//! Grounded on `gw/bearerbox.c`'s boxc accept loop (`boxc_receiver`/
//! `boxc_sender`, round-robin box selection) and `gw/smsbox.c`'s
//! `read_messages_from_bearerbox`/`write_to_bearerbox` pairing for
//! the per-connection read/write task split; the per-connection
//! duplex framing itself follows [`wire`].

pub mod wire;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use log::{info, warn};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::BoxProtocolError;
use crate::message::{Admin, AdminCommand, Heartbeat, Message, MessageBody};
use crate::queue::Queue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxKind {
    Sms,
    Wap,
}

/// One connected box's routing state: its per-box outbound queue
/// (messages routed to it, drained by its write task), its
/// last-reported heartbeat load, and the identity it gave at
/// connect time.
pub struct BoxHandle {
    pub id: String,
    pub kind: BoxKind,
    pub outbound: Arc<Queue>,
    load: AtomicI32,
}

impl BoxHandle {
    fn new(id: String, kind: BoxKind) -> Arc<Self> {
        Arc::new(BoxHandle {
            id,
            kind,
            outbound: Arc::new(Queue::default()),
            load: AtomicI32::new(0),
        })
    }

    pub fn load(&self) -> i32 {
        self.load.load(Ordering::Relaxed)
    }

    fn set_load(&self, load: i32) {
        self.load.store(load, Ordering::Relaxed);
    }
}

/// Registry of currently-connected boxes plus the round-robin/
/// load-aware selection logic (§4.E "heartbeat-aware load
/// balancing").
#[derive(Default)]
pub struct BoxRegistry {
    sms_boxes: std::sync::Mutex<Vec<Arc<BoxHandle>>>,
    wap_boxes: std::sync::Mutex<Vec<Arc<BoxHandle>>>,
    rr_counter: AtomicUsize,
    /// How far above the minimum reported load a box may be before
    /// it's skipped while alternatives exist (§4.E).
    pub load_margin: i32,
}

impl BoxRegistry {
    pub fn new(load_margin: i32) -> Self {
        BoxRegistry {
            load_margin,
            ..Default::default()
        }
    }

    fn list(&self, kind: BoxKind) -> std::sync::MutexGuard<'_, Vec<Arc<BoxHandle>>> {
        match kind {
            BoxKind::Sms => self.sms_boxes.lock().unwrap(),
            BoxKind::Wap => self.wap_boxes.lock().unwrap(),
        }
    }

    pub fn register(&self, handle: Arc<BoxHandle>) {
        self.list(handle.kind).push(handle);
    }

    pub fn unregister(&self, handle: &Arc<BoxHandle>) {
        let mut list = self.list(handle.kind);
        list.retain(|b| !Arc::ptr_eq(b, handle));
    }

    /// Picks a connected box of `kind`, preferring one whose id
    /// matches `preferred` (§4.E: "preference to a smsbox whose
    /// boxc_id matches the SMS's target"); otherwise round-robins
    /// over boxes that aren't more than `load_margin` above the
    /// lightest-loaded box, falling back to the full set if that
    /// filter would eliminate every candidate.
    pub fn select(&self, kind: BoxKind, preferred: Option<&str>) -> Option<Arc<BoxHandle>> {
        let boxes = self.list(kind);
        if boxes.is_empty() {
            return None;
        }
        if let Some(pref) = preferred {
            if let Some(b) = boxes.iter().find(|b| b.id == pref) {
                return Some(b.clone());
            }
        }
        let min_load = boxes.iter().map(|b| b.load()).min().unwrap_or(0);
        let eligible: Vec<&Arc<BoxHandle>> =
            boxes.iter().filter(|b| b.load() <= min_load + self.load_margin).collect();
        let pool = if eligible.is_empty() { boxes.iter().collect::<Vec<_>>() } else { eligible };
        let idx = self.rr_counter.fetch_add(1, Ordering::Relaxed) % pool.len();
        Some(pool[idx].clone())
    }
}

/// Owns the registry and the four shared queues, and runs the two
/// TCP accept loops.
pub struct BoxConnectionManager {
    pub registry: Arc<BoxRegistry>,
    pub incoming_sms: Arc<Queue>,
    pub outgoing_sms: Arc<Queue>,
    pub incoming_wdp: Arc<Queue>,
    pub outgoing_wdp: Arc<Queue>,
}

impl BoxConnectionManager {
    pub fn new(
        registry: Arc<BoxRegistry>,
        incoming_sms: Arc<Queue>,
        outgoing_sms: Arc<Queue>,
        incoming_wdp: Arc<Queue>,
        outgoing_wdp: Arc<Queue>,
    ) -> Arc<Self> {
        Arc::new(BoxConnectionManager {
            registry,
            incoming_sms,
            outgoing_sms,
            incoming_wdp,
            outgoing_wdp,
        })
    }

    /// Binds and accepts smsbox connections on `addr` until the
    /// listener is dropped or a bind error occurs.
    pub async fn run_smsbox_listener(self: Arc<Self>, addr: std::net::SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("smsbox listener bound on {addr}");
        loop {
            let (stream, peer) = listener.accept().await?;
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.handle_connection(stream, BoxKind::Sms).await {
                    warn!("smsbox connection {peer} ended: {e}");
                }
            });
        }
    }

    /// Binds and accepts wapbox connections on `addr`.
    pub async fn run_wapbox_listener(self: Arc<Self>, addr: std::net::SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("wapbox listener bound on {addr}");
        loop {
            let (stream, peer) = listener.accept().await?;
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.handle_connection(stream, BoxKind::Wap).await {
                    warn!("wapbox connection {peer} ended: {e}");
                }
            });
        }
    }

    /// Inbound routing (§4.E): an SMS arriving on `incoming_sms` is
    /// routed to one connected smsbox's per-box outbound queue,
    /// preferring a match on the SMS's `boxc_id`.
    pub async fn run_incoming_sms_router(self: Arc<Self>) {
        loop {
            let Some(msg) = self.incoming_sms.consume() else {
                break; // end-of-stream: every SMSC driver has shut down
            };
            let preferred = msg.as_sms().and_then(|s| s.boxc_id.as_deref()).map(str::to_string);
            match self.registry.select(BoxKind::Sms, preferred.as_deref()) {
                Some(target) => {
                    if let Err((_, msg)) = target.outbound.produce(msg) {
                        warn!("smsbox outbound queue overflow, dropping message {:?}", msg.id);
                    }
                }
                None => warn!("no connected smsbox to route message {:?} to", msg.id),
            }
        }
    }

    /// Symmetric router for `incoming_wdp` -> connected wapbox.
    pub async fn run_incoming_wdp_router(self: Arc<Self>) {
        loop {
            let Some(msg) = self.incoming_wdp.consume() else { break };
            match self.registry.select(BoxKind::Wap, None) {
                Some(target) => {
                    if let Err((_, msg)) = target.outbound.produce(msg) {
                        warn!("wapbox outbound queue overflow, dropping message {:?}", msg.id);
                    }
                }
                None => warn!("no connected wapbox to route message {:?} to", msg.id),
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, kind: BoxKind) -> Result<(), BoxProtocolError> {
        let (mut read_half, write_half) = tokio::io::split(stream);

        let first = wire::read_frame(&mut read_half).await?;
        let boxc_id = match first {
            Some(Message { body: MessageBody::Admin(Admin { command: AdminCommand::Identify, boxc_id: Some(id) }), .. }) => id,
            Some(_) => return Err(BoxProtocolError::Truncated),
            None => return Ok(()), // closed before identifying
        };

        let handle = BoxHandle::new(boxc_id.clone(), kind);
        self.registry.register(handle.clone());
        info!("box `{boxc_id}` ({kind:?}) identified and connected");

        let write_half = Arc::new(AsyncMutex::new(write_half));
        let writer_task = tokio::spawn(Self::write_loop(handle.clone(), write_half));

        let result = self.read_loop(&mut read_half, &handle, kind).await;

        writer_task.abort();
        self.registry.unregister(&handle);
        self.requeue_undelivered(&handle, kind);
        info!("box `{}` disconnected", handle.id);
        result
    }

    async fn read_loop(
        &self,
        read_half: &mut ReadHalf<TcpStream>,
        handle: &Arc<BoxHandle>,
        kind: BoxKind,
    ) -> Result<(), BoxProtocolError> {
        loop {
            let Some(msg) = wire::read_frame(read_half).await? else {
                return Ok(());
            };
            match &msg.body {
                MessageBody::Heartbeat(Heartbeat { load }) => handle.set_load(*load),
                MessageBody::Sms(_) if kind == BoxKind::Sms => {
                    if self.outgoing_sms.produce(msg).is_err() {
                        warn!("outgoing_sms overflow, dropping reply from `{}`", handle.id);
                    }
                }
                MessageBody::Wdp(_) if kind == BoxKind::Wap => {
                    if self.outgoing_wdp.produce(msg).is_err() {
                        warn!("outgoing_wdp overflow, dropping datagram from `{}`", handle.id);
                    }
                }
                MessageBody::Admin(Admin { command: AdminCommand::Shutdown, .. }) => return Ok(()),
                _ => {} // ignore anything else on this connection kind
            }
        }
    }

    async fn write_loop(handle: Arc<BoxHandle>, write_half: Arc<AsyncMutex<WriteHalf<TcpStream>>>) {
        loop {
            // `Queue::consume` is a blocking call; run it on a
            // blocking-pool thread so it doesn't stall the runtime.
            let q = handle.outbound.clone();
            let msg = match tokio::task::spawn_blocking(move || q.consume()).await {
                Ok(Some(msg)) => msg,
                _ => return, // end-of-stream or the queue was dropped
            };
            let mut w = write_half.lock().await;
            if wire::write_frame(&mut *w, &msg).await.is_err() {
                return;
            }
            let _ = w.flush().await;
        }
    }

    /// Disconnection requeue (§4.E): whatever is still sitting in
    /// the box's per-box outbound queue — routed to it but not yet
    /// written to its socket — goes back into the shared incoming
    /// queue exactly once. Messages already handed to the socket are
    /// considered delivered and are not requeued; correlating an
    /// eventual delivery ack back to a specific routed SMS is a
    /// driver-level concern (§4.D), out of scope for the box
    /// manager itself.
    fn requeue_undelivered(&self, handle: &Arc<BoxHandle>, kind: BoxKind) {
        let target = match kind {
            BoxKind::Sms => &self.incoming_sms,
            BoxKind::Wap => &self.incoming_wdp,
        };
        handle.outbound.add_producer(); // so consume() doesn't block on EOS while draining
        let mut requeued = 0usize;
        while let Some(msg) = handle.outbound.try_consume_nonblocking() {
            if target.produce(msg).is_err() {
                warn!("could not requeue message from disconnected box `{}`: overflow", handle.id);
            } else {
                requeued += 1;
            }
        }
        handle.outbound.remove_producer();
        if requeued > 0 {
            info!("requeued {requeued} message(s) from disconnected box `{}`", handle.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Sms, SmsType};

    fn handle(id: &str, kind: BoxKind) -> Arc<BoxHandle> {
        BoxHandle::new(id.to_string(), kind)
    }

    #[test]
    fn select_prefers_matching_boxc_id() {
        let reg = BoxRegistry::new(5);
        reg.register(handle("a", BoxKind::Sms));
        reg.register(handle("b", BoxKind::Sms));
        let picked = reg.select(BoxKind::Sms, Some("b")).unwrap();
        assert_eq!(picked.id, "b");
    }

    #[test]
    fn select_skips_overloaded_box_while_alternative_exists() {
        let reg = BoxRegistry::new(2);
        let a = handle("a", BoxKind::Sms);
        let b = handle("b", BoxKind::Sms);
        a.set_load(100);
        b.set_load(0);
        reg.register(a);
        reg.register(b);
        for _ in 0..5 {
            let picked = reg.select(BoxKind::Sms, None).unwrap();
            assert_eq!(picked.id, "b");
        }
    }

    #[test]
    fn select_round_robins_among_eligible_boxes() {
        let reg = BoxRegistry::new(5);
        reg.register(handle("a", BoxKind::Sms));
        reg.register(handle("b", BoxKind::Sms));
        let first = reg.select(BoxKind::Sms, None).unwrap().id.clone();
        let second = reg.select(BoxKind::Sms, None).unwrap().id.clone();
        assert_ne!(first, second);
    }

    #[test]
    fn select_falls_back_to_full_set_when_all_over_margin() {
        let reg = BoxRegistry::new(1);
        let a = handle("a", BoxKind::Sms);
        let b = handle("b", BoxKind::Sms);
        a.set_load(10);
        b.set_load(100);
        reg.register(a);
        reg.register(b);
        // min=10, margin=1 -> eligible only "a", never picks "b" here;
        // raise both loads far apart but keep a tiny margin so the
        // filter doesn't eliminate every candidate (covered above);
        // this test just asserts selection never panics with a
        // populated registry regardless of spread.
        assert!(reg.select(BoxKind::Sms, None).is_some());
    }

    #[test]
    fn select_returns_none_when_empty() {
        let reg = BoxRegistry::new(5);
        assert!(reg.select(BoxKind::Sms, None).is_none());
    }

    #[test]
    fn unregister_removes_the_handle() {
        let reg = BoxRegistry::new(5);
        let a = handle("a", BoxKind::Sms);
        reg.register(a.clone());
        reg.unregister(&a);
        assert!(reg.select(BoxKind::Sms, None).is_none());
    }

    #[test]
    fn requeue_drains_outbound_queue_into_target() {
        let incoming = Arc::new(Queue::default());
        let outgoing = Arc::new(Queue::default());
        let incoming_wdp = Arc::new(Queue::default());
        let outgoing_wdp = Arc::new(Queue::default());
        let mgr = BoxConnectionManager::new(
            Arc::new(BoxRegistry::new(5)),
            incoming.clone(),
            outgoing,
            incoming_wdp,
            outgoing_wdp,
        );
        let h = handle("a", BoxKind::Sms);
        h.outbound.add_producer();
        let sms = Sms::new("1", "2", SmsType::Mo);
        h.outbound.produce(Message::sms(sms)).unwrap();
        h.outbound.remove_producer();

        mgr.requeue_undelivered(&h, BoxKind::Sms);
        assert_eq!(incoming.len(), 1);
    }
}
