// mock_aprs_server: A scripted APRS-IS server for testing the responder.
//
// Speaks just enough of the server side of the protocol: greets with an
// aprsc-style banner, accepts any login line and answers `# logresp`,
// then relays lines in both directions.  Tests inject inbound traffic and
// observe everything the client transmits.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};

/// A mock APRS-IS server for integration testing.
///
/// Binds to port 0 (random) and exposes the actual bound address.  Each
/// test spins up its own isolated instance.  Reconnects are supported: a
/// new client connection goes through the banner/login exchange again and
/// then receives the same injected stream.
pub struct MockAprsServer {
    addr: SocketAddr,
    inject_tx: broadcast::Sender<String>,
    sent_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    login_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    /// Handle to the background accept loop; dropped with the server.
    _task: tokio::task::JoinHandle<()>,
}

impl MockAprsServer {
    /// Start the mock server, binding to a random available port.
    pub async fn start() -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (inject_tx, _) = broadcast::channel(256);
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (login_tx, login_rx) = mpsc::unbounded_channel();

        let accept_inject = inject_tx.clone();
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _peer)) => {
                        let inject_rx = accept_inject.subscribe();
                        let sent_tx = sent_tx.clone();
                        let login_tx = login_tx.clone();
                        tokio::spawn(async move {
                            // Client drops are routine in tests; swallow errors.
                            let _ =
                                handle_connection(stream, inject_rx, sent_tx, login_tx).await;
                        });
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Arc::new(Self {
            addr,
            inject_tx,
            sent_rx: Mutex::new(sent_rx),
            login_rx: Mutex::new(login_rx),
            _task: task,
        }))
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queue a line for delivery to every connected client.
    pub fn inject(&self, line: &str) {
        let _ = self.inject_tx.send(line.to_owned());
    }

    /// Next line the client transmitted (login lines excluded), or `None`
    /// when nothing arrives within the timeout.
    pub async fn recv_sent(&self, timeout: Duration) -> Option<String> {
        let mut rx = self.sent_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// The next captured login line, or `None` on timeout.
    pub async fn wait_login(&self, timeout: Duration) -> Option<String> {
        let mut rx = self.login_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }
}

async fn handle_connection(
    stream: TcpStream,
    mut inject_rx: broadcast::Receiver<String>,
    sent_tx: mpsc::UnboundedSender<String>,
    login_tx: mpsc::UnboundedSender<String>,
) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    write.write_all(b"# aprsc 2.1.10-gd72a17c\r\n").await?;

    // Login line: `user CALL pass ...`.  Anything is accepted.
    let login = match lines.next_line().await? {
        Some(l) => l,
        None => return Ok(()),
    };
    let callsign = login.split_whitespace().nth(1).unwrap_or("N0CALL").to_owned();
    let _ = login_tx.send(login);
    write
        .write_all(format!("# logresp {callsign} verified, server T2MOCK\r\n").as_bytes())
        .await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(l) => { let _ = sent_tx.send(l); }
                    None => break,
                }
            }
            inj = inject_rx.recv() => {
                match inj {
                    Ok(l) => {
                        write.write_all(l.as_bytes()).await?;
                        write.write_all(b"\r\n").await?;
                    }
                    // Lagged is fine in tests; closed means the server is gone.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    Ok(())
}
