//! WDP router (§4.F): drains `outgoing_wdp` into the UDP driver and
//! feeds inbound datagrams into `incoming_wdp`. Grounded on
//! `gw/bearerbox.c`'s `wdp_router` thread function; shares its
//! suspend/resume points with the sentinel queues like the SMSC
//! drivers (§4.C).

use std::net::SocketAddr;
use std::sync::Arc;

use log::{info, warn};
use tokio::net::UdpSocket;

use crate::message::{Message, MessageBody, WdpDatagram};
use crate::queue::Queue;

const MAX_DATAGRAM: usize = 65_507;

pub struct WdpRouter {
    pub incoming_wdp: Arc<Queue>,
    pub outgoing_wdp: Arc<Queue>,
    pub suspended: Arc<Queue>,
    pub isolated: Arc<Queue>,
}

impl WdpRouter {
    pub fn new(incoming_wdp: Arc<Queue>, outgoing_wdp: Arc<Queue>, suspended: Arc<Queue>, isolated: Arc<Queue>) -> Arc<Self> {
        Arc::new(WdpRouter { incoming_wdp, outgoing_wdp, suspended, isolated })
    }

    /// Binds a UDP socket on `addr` and runs both directions until
    /// the respective queues reach end-of-stream.
    pub async fn run(self: Arc<Self>, addr: SocketAddr) -> std::io::Result<()> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("WDP router bound on {addr}");

        let recv_socket = socket.clone();
        let recv_self = self.clone();
        let recv_task = tokio::spawn(async move { recv_self.recv_loop(recv_socket).await });

        self.send_loop(socket).await;
        let _ = recv_task.await;
        Ok(())
    }

    /// Drains `outgoing_wdp` and forwards each datagram to its
    /// destination over the bound UDP socket. A send error is
    /// logged and the datagram dropped: WDP carries no delivery
    /// guarantee of its own (§4.F), matching the UDP transport it
    /// rides on.
    async fn send_loop(&self, socket: Arc<UdpSocket>) {
        loop {
            // While suspended/isolated, block here the same way an
            // SMSC receiver thread blocks on the sentinel queues
            // (§4.C): park on whichever sentinel currently has a
            // producer before draining more traffic.
            if self.isolated.producer_count() > 0 {
                self.isolated.consume();
            }
            if self.suspended.producer_count() > 0 {
                self.suspended.consume();
            }

            let q = self.outgoing_wdp.clone();
            let msg = match tokio::task::spawn_blocking(move || q.consume()).await {
                Ok(Some(msg)) => msg,
                _ => return,
            };
            let Some(wdp) = msg.into_wdp() else { continue };
            let dest = format!("{}:{}", wdp.dst_addr, wdp.dst_port);
            match dest.parse::<SocketAddr>() {
                Ok(addr) => {
                    if let Err(e) = socket.send_to(&wdp.user_data, addr).await {
                        warn!("WDP send to {addr} failed: {e}");
                    }
                }
                Err(e) => warn!("invalid WDP destination `{dest}`: {e}"),
            }
        }
    }

    /// Reads inbound datagrams and produces them into `incoming_wdp`,
    /// tagging the origin address/port.
    async fn recv_loop(self: Arc<Self>, socket: Arc<UdpSocket>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (n, peer) = match socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(e) => {
                    warn!("WDP recv failed: {e}");
                    continue;
                }
            };
            let local = socket.local_addr().ok();
            let datagram = WdpDatagram {
                src_addr: peer.ip().to_string(),
                src_port: peer.port(),
                dst_addr: local.map(|a| a.ip().to_string()).unwrap_or_default(),
                dst_port: local.map(|a| a.port()).unwrap_or(0),
                user_data: buf[..n].to_vec(),
            };
            if let Err((err, _)) = self.incoming_wdp.produce(Message::new(MessageBody::Wdp(datagram))) {
                warn!("incoming_wdp overflow: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_datagram_over_loopback() {
        let sender = WdpRouter::new(
            Arc::new(Queue::default()),
            Arc::new(Queue::default()),
            Arc::new(Queue::default()),
            Arc::new(Queue::default()),
        );
        let receiver_incoming = Arc::new(Queue::default());
        receiver_incoming.add_producer();
        let receiver = WdpRouter::new(
            receiver_incoming.clone(),
            Arc::new(Queue::default()),
            Arc::new(Queue::default()),
            Arc::new(Queue::default()),
        );

        let recv_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let recv_addr = recv_socket.local_addr().unwrap();
        let recv_socket = Arc::new(recv_socket);
        let recv_task = tokio::spawn({
            let receiver = receiver.clone();
            let recv_socket = recv_socket.clone();
            async move { receiver.recv_loop(recv_socket).await }
        });

        sender.outgoing_wdp.add_producer();
        let datagram = WdpDatagram {
            src_addr: "0.0.0.0".into(),
            src_port: 0,
            dst_addr: recv_addr.ip().to_string(),
            dst_port: recv_addr.port(),
            user_data: b"wap-hello".to_vec(),
        };
        sender.outgoing_wdp.produce(Message::new(MessageBody::Wdp(datagram))).unwrap();

        let send_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let send_task = tokio::spawn({
            let sender = sender.clone();
            let send_socket = Arc::new(send_socket);
            async move { sender.send_loop(send_socket).await }
        });

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        send_task.abort();
        recv_task.abort();

        let received = receiver_incoming.try_consume_nonblocking().unwrap();
        assert_eq!(received.as_wdp().unwrap().user_data, b"wap-hello");
    }
}
