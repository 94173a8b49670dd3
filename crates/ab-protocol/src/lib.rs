// ab-protocol: APRS-IS wire protocol types and codecs.
//
// Everything that touches the textual TNC2 line format lives here: inbound
// frame parsing, the message-id trailer grammar (including the defective
// variants we repair), ack/rej/reply-ack forms, the login line, and the
// beacon/bulletin payload encoders.  No I/O.

use serde::{Deserialize, Serialize};

pub mod fixup;
pub mod position;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Hard ceiling for an APRS message payload, in bytes.
///
/// The on-air message text field is limited to 67 characters; APRS-IS
/// inherits the limit.  Every outbound payload must respect it.
pub const PAYLOAD_MAX: usize = 67;

/// Width of the padded addressee field inside a message information field.
pub const ADDRESSEE_WIDTH: usize = 9;

/// Experimental device tocall (APZ prefix is reserved for experimental
/// software per the APRS tocall registry).
pub const TOCALL: &str = "APZBOT";

/// Maximum length of a message-id (alphanumeric, per APRS spec).
pub const MESSAGE_ID_MAX: usize = 5;

// ---------------------------------------------------------------------------
// Frame model
// ---------------------------------------------------------------------------

/// Coarse classification of an inbound APRS-IS line.
///
/// Only `Message` frames are admitted by the ingress; the rest are carried
/// so callers can log what they dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// `:ADDRESSEE:text` message (the only admissible kind).
    Message,
    /// Position report (`!`, `=`, `/`, `@` data type identifiers).
    Position,
    /// Status report (`>`).
    Status,
    /// Anything else we can frame but do not care about.
    Other,
}

/// A decoded inbound frame.
///
/// `message_id` is the id parsed out of a `{id` trailer; the trailer is
/// stripped from `body`.  Frames whose trailer only matches the defective
/// grammar keep their raw body here; the ingress runs [`fixup::repair`]
/// before admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Sender callsign, optionally with an SSID suffix (`DF1JSL-8`).
    pub source: String,
    /// The addressee of the message field (padded spaces stripped).
    pub addressee: String,
    /// Message text with any recognized trailer removed.
    pub body: String,
    /// Parsed legacy message-id, if the strict grammar matched.
    pub message_id: Option<String>,
    /// In-band ack carried by a reply-ack trailer (`{MM}AA`; this is `AA`).
    pub acks_message_id: Option<String>,
    /// True when the trailer used the reply-ack form (`{MM}` / `{MM}AA`);
    /// responses to such senders carry reply-ack trailers themselves.
    pub uses_reply_ack: bool,
    pub format: FrameFormat,
}

/// Outbound traffic classes; the session applies per-class pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutboundCategory {
    Message,
    Ack,
    Beacon,
    Bulletin,
}

/// A fully rendered outbound frame, ready for the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub line: String,
    pub category: OutboundCategory,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("server comment line")]
    ServerComment,
    #[error("missing '>' in header")]
    MissingHeader,
    #[error("missing info field separator")]
    MissingInfoField,
    #[error("empty source callsign")]
    EmptySource,
}

// ---------------------------------------------------------------------------
// Inbound parsing
// ---------------------------------------------------------------------------

/// Parse one APRS-IS line into a frame.
///
/// TNC2 format: `SOURCE>TOCALL,PATH:information`.  For a message the
/// information field is `:ADDRESSEE:text{id` where ADDRESSEE is padded to
/// nine characters.  Lines starting with `#` are server chatter and are
/// rejected with [`FrameError::ServerComment`].
pub fn parse_line(line: &str) -> Result<InboundFrame, FrameError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.starts_with('#') {
        return Err(FrameError::ServerComment);
    }
    let (header, info) = line.split_once(':').ok_or(FrameError::MissingInfoField)?;
    let (source, _path) = header.split_once('>').ok_or(FrameError::MissingHeader)?;
    if source.is_empty() {
        return Err(FrameError::EmptySource);
    }

    // Non-message data type identifiers.
    if let Some(dti) = info.chars().next() {
        let format = match dti {
            ':' => FrameFormat::Message,
            '!' | '=' | '/' | '@' => FrameFormat::Position,
            '>' => FrameFormat::Status,
            _ => FrameFormat::Other,
        };
        if format != FrameFormat::Message {
            return Ok(InboundFrame {
                source: source.to_owned(),
                addressee: String::new(),
                body: info.to_owned(),
                message_id: None,
                acks_message_id: None,
                uses_reply_ack: false,
                format,
            });
        }
    } else {
        return Ok(InboundFrame {
            source: source.to_owned(),
            addressee: String::new(),
            body: String::new(),
            message_id: None,
            acks_message_id: None,
            uses_reply_ack: false,
            format: FrameFormat::Other,
        });
    }

    // Message: `:ADDRESSEE:text`.  The addressee field is fixed-width but
    // some clients send it short; accept anything up to the second colon.
    let rest = &info[1..];
    let (addressee, text) = match rest.split_once(':') {
        Some((a, t)) => (a.trim().to_owned(), t),
        None => (rest.trim().to_owned(), ""),
    };

    let (body, message_id, acks_message_id, uses_reply_ack) = split_trailer(text);
    Ok(InboundFrame {
        source: source.to_owned(),
        addressee,
        body,
        message_id,
        acks_message_id,
        uses_reply_ack,
        format: FrameFormat::Message,
    })
}

/// Split a strict message-id trailer off a message text.
///
/// Recognized forms, checked in order:
/// - reply-ack: `text{MM}AA` (MM = sender's id, AA = ack of ours)
/// - reply-ack, unacked: `text{MM}`
/// - legacy: `text{12345` (1–5 trailing alphanumerics)
///
/// Returns `(body, message_id, acks_message_id, uses_reply_ack)`.
fn split_trailer(text: &str) -> (String, Option<String>, Option<String>, bool) {
    if let Some(idx) = text.rfind('{') {
        let trailer = &text[idx + 1..];
        let body = text[..idx].to_owned();
        // Reply-ack form first: id and optional piggybacked ack.
        if let Some((id, ack)) = trailer.split_once('}') {
            if is_message_id(id) && (ack.is_empty() || is_message_id(ack)) {
                let acks = if ack.is_empty() {
                    None
                } else {
                    Some(ack.to_owned())
                };
                return (body, Some(id.to_owned()), acks, true);
            }
        } else if is_message_id(trailer) {
            return (body, Some(trailer.to_owned()), None, false);
        }
    }
    (text.to_owned(), None, None, false)
}

fn is_message_id(s: &str) -> bool {
    !s.is_empty() && s.len() <= MESSAGE_ID_MAX && s.chars().all(|c| c.is_ascii_alphanumeric())
}

/// True if the body is a bare legacy acknowledgement (`ackNNNNN`).
pub fn parse_legacy_ack(body: &str) -> Option<&str> {
    let id = body.strip_prefix("ack")?;
    is_message_id(id).then_some(id)
}

/// True if the body is a bare legacy rejection (`rejNNNNN`).
pub fn parse_legacy_rej(body: &str) -> Option<&str> {
    let id = body.strip_prefix("rej")?;
    is_message_id(id).then_some(id)
}

// ---------------------------------------------------------------------------
// Outbound rendering
// ---------------------------------------------------------------------------

/// Render the APRS-IS login line.
///
/// `user CALL pass PASS vers AGENT VERSION filter EXPR`
pub fn login_line(callsign: &str, passcode: &str, agent: &str, version: &str, filter: &str) -> String {
    format!("user {callsign} pass {passcode} vers {agent} {version} filter {filter}")
}

/// True if the server line confirms our login (`# logresp CALL verified ...`).
pub fn is_login_ok(line: &str, callsign: &str) -> bool {
    line.starts_with("# logresp") && line.contains(callsign) && line.contains("verified")
}

fn pad_addressee(addressee: &str) -> String {
    format!("{addressee:<width$}", width = ADDRESSEE_WIDTH)
}

/// Render a message frame.  `message_id` appends the legacy `{id` trailer;
/// `reply_ack` additionally piggybacks `}ackid` (reply-ack form).
pub fn render_message(
    source: &str,
    addressee: &str,
    text: &str,
    message_id: Option<&str>,
    reply_ack: Option<&str>,
) -> String {
    let mut line = format!(
        "{source}>{TOCALL},TCPIP*::{}:{text}",
        pad_addressee(addressee)
    );
    match (message_id, reply_ack) {
        (Some(id), Some(ack)) => {
            line.push('{');
            line.push_str(id);
            line.push('}');
            line.push_str(ack);
        }
        (Some(id), None) => {
            line.push('{');
            line.push_str(id);
        }
        (None, _) => {}
    }
    line
}

/// Render a legacy acknowledgement frame for a received message-id.
pub fn render_ack(source: &str, addressee: &str, message_id: &str) -> String {
    format!(
        "{source}>{TOCALL},TCPIP*::{}:ack{message_id}",
        pad_addressee(addressee)
    )
}

/// Render a legacy rejection frame for a received message-id.
pub fn render_rej(source: &str, addressee: &str, message_id: &str) -> String {
    format!(
        "{source}>{TOCALL},TCPIP*::{}:rej{message_id}",
        pad_addressee(addressee)
    )
}

/// Render one bulletin frame.  `index` selects the `BLN0`..`BLN9` addressee.
pub fn render_bulletin(source: &str, index: u8, text: &str) -> String {
    render_message(source, &format!("BLN{index}"), text, None, None)
}

/// Render a position beacon frame around an encoded information field
/// (see [`position::beacon_payload`]).
pub fn render_beacon(source: &str, payload: &str) -> String {
    format!("{source}>{TOCALL},TCPIP*:{payload}")
}
