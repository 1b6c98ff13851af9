//! HTTP admin surface (§4.L): five fixed GET routes over a
//! hand-rolled request-line/header parser on top of `TcpListener`,
//! rather than a web framework — the teacher crate never depends on
//! one and the surface here is small and fixed.
//!
//! Grounded on `gw/bearerbox.c`'s `bb_print_status`/
//! `bb_status_linebreak` and the admin-endpoint table in SPEC_FULL
//! §4.L.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::lifecycle::{GatewayState, Lifecycle};

/// Anything that can contribute a status fragment to `/status`
/// (SMSC drivers, the WDP router, ...), in the requested output
/// format.
pub trait StatusSource: Send + Sync {
    fn status_fragment(&self, format: crate::smsc::StatusFormat) -> String;
}

/// Running counters surfaced in `/status`. Kept separate from the
/// lifecycle mutex since these are updated far more often than the
/// state transitions are.
#[derive(Default)]
pub struct Counters {
    pub sms_received: AtomicU64,
    pub sms_sent: AtomicU64,
}

impl Counters {
    pub fn new() -> Arc<Self> {
        Arc::new(Counters::default())
    }
}

pub struct AdminServer {
    lifecycle: Arc<Lifecycle>,
    counters: Arc<Counters>,
    sources: Vec<Arc<dyn StatusSource>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Suffix {
    None,
    Html,
    Wml,
    Xml,
    Text,
}

impl Suffix {
    fn parse(path: &str) -> (&str, Suffix) {
        for (ext, suf) in [(".html", Suffix::Html), (".wml", Suffix::Wml), (".xml", Suffix::Xml), (".txt", Suffix::Text)] {
            if let Some(base) = path.strip_suffix(ext) {
                return (base, suf);
            }
        }
        (path, Suffix::None)
    }

    fn content_type(self) -> &'static str {
        match self {
            Suffix::None | Suffix::Html => "text/html",
            Suffix::Wml => "text/vnd.wap.wml",
            Suffix::Xml => "text/xml",
            Suffix::Text => "text/plain",
        }
    }

    /// Line-break style used between status fragments (§4.L): no
    /// suffix and `.html` use `<br>\n`; `.wml`/`.xml` use `<br/>\n`;
    /// `.txt` uses a bare `\n`.
    fn linebreak(self) -> &'static str {
        match self {
            Suffix::None | Suffix::Html => "<br>\n",
            Suffix::Wml | Suffix::Xml => "<br/>\n",
            Suffix::Text => "\n",
        }
    }
}

impl AdminServer {
    pub fn new(lifecycle: Arc<Lifecycle>, counters: Arc<Counters>) -> Self {
        AdminServer { lifecycle, counters, sources: Vec::new() }
    }

    pub fn add_source(&mut self, source: Arc<dyn StatusSource>) {
        self.sources.push(source);
    }

    pub async fn run(self, addr: std::net::SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("admin HTTP surface bound on {addr}");
        let this = Arc::new(self);
        loop {
            let (stream, peer) = listener.accept().await?;
            let this = this.clone();
            tokio::spawn(async move {
                if let Err(e) = this.handle(stream).await {
                    warn!("admin connection {peer} error: {e}");
                }
            });
        }
    }

    async fn handle(&self, stream: TcpStream) -> std::io::Result<()> {
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).await?;
        // Drain headers; content doesn't matter, method/content-type
        // are both ignored per §4.L.
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 || line.trim().is_empty() {
                break;
            }
        }

        let path = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
        let (status_code, content_type, body) = self.route(&path);

        let stream = reader.into_inner();
        self.respond(stream, status_code, content_type, &body).await
    }

    async fn respond(&self, mut stream: TcpStream, code: u16, content_type: &str, body: &str) -> std::io::Result<()> {
        let reason = if code == 200 { "OK" } else { "Forbidden" };
        let response = format!(
            "HTTP/1.1 {code} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    fn route(&self, path: &str) -> (u16, &'static str, String) {
        let (base, suffix) = Suffix::parse(path);
        match base {
            "/status" => (200, suffix.content_type(), self.status_body(suffix)),
            "/suspend" => self.transition(|lc| lc.suspend()),
            "/isolate" => self.transition(|lc| lc.isolate()),
            "/resume" => self.transition(|lc| lc.resume()),
            "/shutdown" => self.transition(|lc| lc.shutdown()),
            _ => (403, "text/plain", "Unknown command.\n".to_string()),
        }
    }

    fn transition(&self, f: impl FnOnce(&Lifecycle) -> crate::error::Result<()>) -> (u16, &'static str, String) {
        match f(&self.lifecycle) {
            Ok(()) => (200, "text/plain", "Done.\n".to_string()),
            Err(_) => (403, "text/plain", "Not allowed.\n".to_string()),
        }
    }

    /// The grounding source's `mtbatch`-style reporting divides a
    /// throughput figure by elapsed seconds; SPEC_FULL §9 names the
    /// division-by-zero risk when no traffic has flowed yet as an
    /// open question a redesign should guard, rather than fix
    /// silently — this guards it by reporting 0.0 instead of
    /// dividing by a zero/sub-one-second uptime.
    fn status_body(&self, suffix: Suffix) -> String {
        let state = self.lifecycle.state();
        let uptime = self.lifecycle.uptime().as_secs_f64();
        let received = self.counters.sms_received.load(Ordering::Relaxed);
        let sent = self.counters.sms_sent.load(Ordering::Relaxed);
        let per_second = if uptime < 1.0 { 0.0 } else { received as f64 / uptime };

        let lb = suffix.linebreak();
        let mut out = String::new();
        out.push_str(&format!("Gateway is {}{lb}", state_label(state)));
        out.push_str(&format!("Uptime: {:.0}s{lb}", uptime));
        out.push_str(&format!(
            "Received {received} SMS, sent {sent} ({per_second:.2} received/sec){lb}"
        ));
        for source in &self.sources {
            out.push_str(&source.status_fragment(suffix_kind(suffix)));
            out.push_str(lb);
        }
        out
    }
}

fn state_label(state: GatewayState) -> &'static str {
    match state {
        GatewayState::Running => "running",
        GatewayState::Isolated => "isolated",
        GatewayState::Suspended => "suspended",
        GatewayState::Shutdown => "shutting down",
        GatewayState::Dead => "dead",
    }
}

fn suffix_kind(suffix: Suffix) -> crate::smsc::StatusFormat {
    match suffix {
        Suffix::None | Suffix::Html => crate::smsc::StatusFormat::Html,
        Suffix::Wml => crate::smsc::StatusFormat::Wml,
        Suffix::Xml => crate::smsc::StatusFormat::Xml,
        Suffix::Text => crate::smsc::StatusFormat::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_parsing_selects_content_type_and_linebreak() {
        assert_eq!(Suffix::parse("/status.wml").1.content_type(), "text/vnd.wap.wml");
        assert_eq!(Suffix::parse("/status.txt").1.linebreak(), "\n");
        assert_eq!(Suffix::parse("/status").1.linebreak(), "<br>\n");
        assert_eq!(Suffix::parse("/status.xml").1.linebreak(), "<br/>\n");
    }

    #[test]
    fn unknown_route_is_403() {
        let lc = Lifecycle::new();
        let server = AdminServer::new(lc, Counters::new());
        let (code, _, body) = server.route("/nope");
        assert_eq!(code, 403);
        assert_eq!(body, "Unknown command.\n");
    }

    #[test]
    fn suspend_then_suspend_again_is_403() {
        let lc = Lifecycle::new();
        let server = AdminServer::new(lc, Counters::new());
        let (code1, _, _) = server.route("/suspend");
        assert_eq!(code1, 200);
        let (code2, _, _) = server.route("/suspend");
        assert_eq!(code2, 403);
    }

    #[test]
    fn status_body_guards_zero_uptime_division() {
        let lc = Lifecycle::new();
        let server = AdminServer::new(lc, Counters::new());
        let body = server.status_body(Suffix::Text);
        assert!(body.contains("0.00 received/sec"));
    }

    #[test]
    fn status_reports_current_state() {
        let lc = Lifecycle::new();
        lc.isolate().unwrap();
        let server = AdminServer::new(lc, Counters::new());
        let body = server.status_body(Suffix::Text);
        assert!(body.contains("isolated"));
    }
}
