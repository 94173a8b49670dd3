// Best-effort recovery of message-id trailers the strict parser missed.
//
// A surprising number of deployed clients emit trailers that violate the
// published grammar: a closing brace after a legacy id (`text{ab}`), whitespace
// before the brace, or an id longer than five characters that still ends in
// a usable tail.  The upstream igate software passes these through
// unparsed, so we get them inside the body.

/// Outcome of a repair pass over a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repaired {
    pub body: String,
    pub message_id: String,
    /// Piggybacked ack of one of our own ids, when present.
    pub acks_message_id: Option<String>,
}

/// Try to recover a message-id from a body the strict grammar rejected.
///
/// Handled variants, checked against the *end* of the body:
/// - `text{ab}`        -> id `ab` (stray closing brace)
/// - `text{ ab`        -> id `ab` (whitespace inside the trailer)
/// - `text{ab}cd}`     -> id `ab`, acks `cd` (reply-ack with stray brace)
///
/// Returns `None` when no variant matches; the body is then treated as
/// id-less and no ack is owed.
pub fn repair(body: &str) -> Option<Repaired> {
    let idx = body.rfind('{')?;
    let trailer = &body[idx + 1..];
    let clean_body = body[..idx].trim_end().to_owned();

    // `{ab}` or `{ab}cd}`; brace-wrapped variants.
    if let Some((id, rest)) = trailer.split_once('}') {
        let rest = rest.trim_end_matches('}');
        if is_id(id) && (rest.is_empty() || is_id(rest)) {
            return Some(Repaired {
                body: clean_body,
                message_id: id.to_owned(),
                acks_message_id: (!rest.is_empty()).then(|| rest.to_owned()),
            });
        }
        return None;
    }

    // `{ ab` / `{ab `; embedded whitespace the strict parser refuses.
    let id = trailer.trim();
    if is_id(id) && id != trailer {
        return Some(Repaired {
            body: clean_body,
            message_id: id.to_owned(),
            acks_message_id: None,
        });
    }
    None
}

fn is_id(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= super::MESSAGE_ID_MAX
        && s.chars().all(|c| c.is_ascii_alphanumeric())
}
