//! APRS-IS session: the single TCP connection.
//!
//! Owns the socket exclusively.  Inbound lines are decoded into frames and
//! handed to the ingress channel; outbound frames arrive on a channel from
//! the scheduler and are written subject to pacing.  Connection loss is
//! handled here with an exponential backoff reconnect; nobody upstream
//! notices beyond a delay.
//!
//! # Pacing
//! Between any two successive writes the session waits the per-category
//! delay, measured from the last *completed* write.  Inbound reading keeps
//! running while an outbound frame is parked waiting for its window.
//!
//! # Read-only mode
//! With the `N0CALL` sentinel as station callsign, writes are diverted to
//! the log at info level.  Pacing still applies, so observed timing
//! matches live behavior.

use std::time::Duration;

use ab_protocol::{FrameError, InboundFrame, OutboundCategory, OutboundFrame};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const BACKOFF_INITIAL: Duration = Duration::from_secs(2);
const BACKOFF_CAP: Duration = Duration::from_secs(120);

/// Connection lifecycle; terminal only on process shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    LoggedIn,
    Running,
    Reconnecting,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub callsign: String,
    pub passcode: String,
    pub filter: String,
    pub agent: String,
    pub version: String,
    pub transmit: bool,
    /// Per-category minimum delay since the previous write.
    pub pacing: Duration,
}

impl SessionConfig {
    fn delay_for(&self, _category: OutboundCategory) -> Duration {
        // One global quantum today; the hook is per-category on purpose.
        self.pacing
    }
}

/// Run the session until the outbound channel closes (shutdown).
///
/// `inbound_tx` receives every frame that parses, message or not; the
/// ingress applies the format and addressee filters.
pub async fn run(
    cfg: SessionConfig,
    inbound_tx: mpsc::Sender<InboundFrame>,
    mut outbound_rx: mpsc::Receiver<OutboundFrame>,
) {
    let mut backoff = BACKOFF_INITIAL;
    let mut state = SessionState::Disconnected;
    debug!(?state, "session starting");

    loop {
        state = SessionState::Connecting;
        debug!(host = %cfg.host, port = cfg.port, "connecting");
        let stream = match TcpStream::connect((cfg.host.as_str(), cfg.port)).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, retry_in = ?backoff, "connect failed");
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
                continue;
            }
        };
        backoff = BACKOFF_INITIAL;

        match run_connection(&cfg, stream, &inbound_tx, &mut outbound_rx, &mut state).await {
            ConnectionEnd::Shutdown => {
                info!("outbound channel closed, session shutting down");
                return;
            }
            ConnectionEnd::Lost(reason) => {
                state = SessionState::Reconnecting;
                warn!(%reason, retry_in = ?backoff, "connection lost");
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
            }
        }
    }
}

enum ConnectionEnd {
    Shutdown,
    Lost(String),
}

async fn run_connection(
    cfg: &SessionConfig,
    stream: TcpStream,
    inbound_tx: &mpsc::Sender<InboundFrame>,
    outbound_rx: &mut mpsc::Receiver<OutboundFrame>,
    state: &mut SessionState,
) -> ConnectionEnd {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    let login = ab_protocol::login_line(
        &cfg.callsign,
        &cfg.passcode,
        &cfg.agent,
        &cfg.version,
        &cfg.filter,
    );
    if let Err(e) = write.write_all(format!("{login}\r\n").as_bytes()).await {
        return ConnectionEnd::Lost(format!("login write: {e}"));
    }
    *state = SessionState::LoggedIn;

    let mut last_write = Instant::now();
    let mut pending: Option<OutboundFrame> = None;

    loop {
        // Writes wait out the pacing window; reads never do.
        let gate = pending
            .as_ref()
            .map(|f| last_write + cfg.delay_for(f.category));

        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(l)) => {
                        handle_line(cfg, &l, inbound_tx, state).await;
                    }
                    Ok(None) => return ConnectionEnd::Lost("server closed stream".to_owned()),
                    Err(e) => return ConnectionEnd::Lost(format!("read: {e}")),
                }
            }
            _ = tokio::time::sleep_until(gate.unwrap_or_else(Instant::now)), if gate.is_some() => {
                let frame = pending.take().unwrap();
                if cfg.transmit {
                    if let Err(e) = write.write_all(format!("{}\r\n", frame.line).as_bytes()).await {
                        return ConnectionEnd::Lost(format!("write: {e}"));
                    }
                    debug!(category = ?frame.category, line = %frame.line, "sent");
                } else {
                    info!(category = ?frame.category, line = %frame.line, "read-only mode, not sent");
                }
                last_write = Instant::now();
            }
            out = outbound_rx.recv(), if pending.is_none() => {
                match out {
                    Some(frame) => pending = Some(frame),
                    None => return ConnectionEnd::Shutdown,
                }
            }
        }
    }
}

async fn handle_line(
    cfg: &SessionConfig,
    line: &str,
    inbound_tx: &mpsc::Sender<InboundFrame>,
    state: &mut SessionState,
) {
    match ab_protocol::parse_line(line) {
        Ok(frame) => {
            if inbound_tx.send(frame).await.is_err() {
                debug!("ingress channel closed, dropping frame");
            }
        }
        Err(FrameError::ServerComment) => {
            if *state == SessionState::LoggedIn && ab_protocol::is_login_ok(line, &cfg.callsign) {
                *state = SessionState::Running;
                info!(%line, "login verified");
            } else {
                debug!(%line, "server comment");
            }
        }
        Err(e) => {
            // Format errors drop the line silently (no ack, no reply).
            debug!(error = %e, %line, "unparseable line dropped");
        }
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(BACKOFF_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_to_the_cap() {
        let mut b = BACKOFF_INITIAL;
        let mut seen = vec![b];
        for _ in 0..8 {
            b = next_backoff(b);
            seen.push(b);
        }
        assert_eq!(seen[0], Duration::from_secs(2));
        assert_eq!(seen[1], Duration::from_secs(4));
        assert_eq!(seen[5], Duration::from_secs(64));
        assert_eq!(seen[6], Duration::from_secs(120));
        assert_eq!(seen[7], Duration::from_secs(120));
    }

    #[tokio::test]
    async fn session_logs_in_and_relays_frames() {
        let server = ab_test_utils::MockAprsServer::start().await.unwrap();
        let addr = server.local_addr();
        let cfg = SessionConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            callsign: "BOT".to_owned(),
            passcode: "12345".to_owned(),
            filter: "g/BOT".to_owned(),
            agent: "aprs-bot".to_owned(),
            version: "0.3.0".to_owned(),
            transmit: true,
            pacing: Duration::from_millis(10),
        };
        let (in_tx, mut in_rx) = mpsc::channel(16);
        let (out_tx, out_rx) = mpsc::channel(16);
        let task = tokio::spawn(run(cfg, in_tx, out_rx));

        let login = server
            .wait_login(Duration::from_secs(2))
            .await
            .expect("login line");
        assert!(login.starts_with("user BOT pass 12345"), "got {login}");

        server.inject("DF1JSL-8>APRS::BOT      :wx{ab1");
        let frame = tokio::time::timeout(Duration::from_secs(2), in_rx.recv())
            .await
            .expect("frame timeout")
            .expect("frame");
        assert_eq!(frame.source, "DF1JSL-8");
        assert_eq!(frame.body, "wx");

        out_tx
            .send(OutboundFrame {
                line: "BOT>APZBOT,TCPIP*::DF1JSL-8 :ackab1".to_owned(),
                category: OutboundCategory::Ack,
            })
            .await
            .unwrap();
        let sent = server
            .recv_sent(Duration::from_secs(2))
            .await
            .expect("sent line");
        assert!(sent.ends_with(":ackab1"), "got {sent}");

        drop(out_tx);
        let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
    }

    #[tokio::test]
    async fn pacing_spaces_out_consecutive_writes() {
        let server = ab_test_utils::MockAprsServer::start().await.unwrap();
        let addr = server.local_addr();
        let pacing = Duration::from_millis(150);
        let cfg = SessionConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            callsign: "BOT".to_owned(),
            passcode: "12345".to_owned(),
            filter: String::new(),
            agent: "aprs-bot".to_owned(),
            version: "0.3.0".to_owned(),
            transmit: true,
            pacing,
        };
        let (in_tx, _in_rx) = mpsc::channel(16);
        let (out_tx, out_rx) = mpsc::channel(16);
        let task = tokio::spawn(run(cfg, in_tx, out_rx));
        let _ = server.wait_login(Duration::from_secs(2)).await;

        for i in 0..3 {
            out_tx
                .send(OutboundFrame {
                    line: format!("BOT>APZBOT,TCPIP*::X        :m{i}"),
                    category: OutboundCategory::Message,
                })
                .await
                .unwrap();
        }
        let t0 = std::time::Instant::now();
        for _ in 0..3 {
            server
                .recv_sent(Duration::from_secs(3))
                .await
                .expect("paced frame");
        }
        // Three writes need at least two full pacing gaps after the first.
        assert!(
            t0.elapsed() >= pacing,
            "writes arrived faster than the pacing window"
        );

        drop(out_tx);
        let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
    }
}
