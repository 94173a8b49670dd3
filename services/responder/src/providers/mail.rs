// Position mail over SMTP, plus Sent-folder housekeeping over IMAP.
//
// Sending uses lettre's async SMTP transport with TLS.  The prune is a
// deliberately tiny IMAP conversation (LOGIN / SELECT / UID SEARCH /
// STORE \Deleted / EXPUNGE) written against a generic stream so the
// whole exchange is testable without a mail server; the production
// connection wraps a TLS stream around it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use super::{MailProvider, ProviderError, ProviderResult};

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    imap_host: String,
    user: String,
    password: String,
}

impl SmtpMailer {
    pub fn new(
        smtp_host: &str,
        user: &str,
        password: &str,
        imap_host: &str,
    ) -> Result<Self, ProviderError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?
            .credentials(Credentials::new(user.to_owned(), password.to_owned()))
            .build();
        let from: Mailbox = user
            .parse()
            .map_err(|_| ProviderError::Unavailable(format!("bad sender address {user:?}")))?;
        Ok(SmtpMailer {
            transport,
            from,
            imap_host: imap_host.to_owned(),
            user: user.to_owned(),
            password: password.to_owned(),
        })
    }
}

#[async_trait]
impl MailProvider for SmtpMailer {
    async fn send_position(&self, to: &str, subject: &str, body: &str) -> ProviderResult<()> {
        let to: Mailbox = to
            .parse()
            .map_err(|_| ProviderError::NotFound)?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body.to_owned())
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| ProviderError::Unavailable(e.to_string()))
    }

    async fn prune_sent(&self, retention_days: u32) -> ProviderResult<usize> {
        if self.imap_host.is_empty() {
            return Err(ProviderError::Disabled);
        }
        let stream = connect_tls(&self.imap_host)
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        let cutoff = (Utc::now() - Duration::days(i64::from(retention_days)))
            .format("%d-%b-%Y")
            .to_string();
        prune_conversation(stream, &self.user, &self.password, &cutoff)
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))
    }
}

async fn connect_tls(
    host: &str,
) -> std::io::Result<tokio_rustls::client::TlsStream<tokio::net::TcpStream>> {
    let (name, port) = match host.rsplit_once(':') {
        Some((h, p)) => (h.to_owned(), p.parse().unwrap_or(993)),
        None => (host.to_owned(), 993),
    };
    let tcp = tokio::net::TcpStream::connect((name.as_str(), port)).await?;
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(config));
    let server_name = rustls::pki_types::ServerName::try_from(name)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    connector.connect(server_name, tcp).await
}

/// Run the prune exchange on an established stream.  Returns the number
/// of messages expunged.
///
/// The conversation is strict about tags but deliberately loose about
/// everything else: any `<tag> NO`/`BAD` aborts, untagged lines are only
/// inspected for the `* SEARCH` id list.
async fn prune_conversation<S>(
    stream: S,
    user: &str,
    password: &str,
    cutoff: &str,
) -> std::io::Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read, mut write) = tokio::io::split(stream);
    let mut lines = BufReader::new(read).lines();

    // Server greeting.
    expect_untagged(&mut lines).await?;

    send(&mut write, "a1", &format!("LOGIN {user} {password}")).await?;
    let _ = read_until_tag(&mut lines, "a1").await?;

    send(&mut write, "a2", "SELECT Sent").await?;
    let _ = read_until_tag(&mut lines, "a2").await?;

    send(&mut write, "a3", &format!("UID SEARCH BEFORE {cutoff}")).await?;
    let (untagged, _) = read_until_tag(&mut lines, "a3").await?;
    let uids: Vec<&str> = untagged
        .iter()
        .find_map(|l| l.strip_prefix("* SEARCH"))
        .map(|ids| ids.split_whitespace().collect())
        .unwrap_or_default();
    if uids.is_empty() {
        send(&mut write, "a6", "LOGOUT").await?;
        return Ok(0);
    }

    let set = uids.join(",");
    send(
        &mut write,
        "a4",
        &format!("UID STORE {set} +FLAGS (\\Deleted)"),
    )
    .await?;
    let _ = read_until_tag(&mut lines, "a4").await?;

    send(&mut write, "a5", "EXPUNGE").await?;
    let _ = read_until_tag(&mut lines, "a5").await?;

    send(&mut write, "a6", "LOGOUT").await?;
    debug!(count = uids.len(), %cutoff, "sent folder pruned");
    Ok(uids.len())
}

async fn send<W: AsyncWrite + Unpin>(write: &mut W, tag: &str, cmd: &str) -> std::io::Result<()> {
    write.write_all(format!("{tag} {cmd}\r\n").as_bytes()).await
}

async fn expect_untagged<R: AsyncRead + Unpin>(
    lines: &mut tokio::io::Lines<BufReader<R>>,
) -> std::io::Result<String> {
    match lines.next_line().await? {
        Some(l) if l.starts_with('*') => Ok(l),
        Some(l) => Err(std::io::Error::other(format!("unexpected greeting: {l}"))),
        None => Err(std::io::Error::other("connection closed")),
    }
}

/// Collect untagged lines until the tagged completion arrives.  `NO` and
/// `BAD` completions become errors.
async fn read_until_tag<R: AsyncRead + Unpin>(
    lines: &mut tokio::io::Lines<BufReader<R>>,
    tag: &str,
) -> std::io::Result<(Vec<String>, String)> {
    let mut untagged = Vec::new();
    loop {
        match lines.next_line().await? {
            Some(l) if l.starts_with(tag) => {
                let ok = l[tag.len()..].trim_start().starts_with("OK");
                if !ok {
                    return Err(std::io::Error::other(format!("imap error: {l}")));
                }
                return Ok((untagged, l));
            }
            Some(l) => untagged.push(l),
            None => return Err(std::io::Error::other("connection closed mid-command")),
        }
    }
}
