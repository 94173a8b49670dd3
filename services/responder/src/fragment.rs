// Response fragmenter.
//
// Renders a semantic response into payload strings that each respect the
// 67-byte APRS message ceiling.  Packing policy, in order of preference:
//   1. the next token fits on the current fragment -> append it
//   2. otherwise open a new fragment and place the token there
//   3. a single oversized token is word-split, and as a last resort
//      hard-chopped at the byte ceiling (on a char boundary)
//
// Unless the command asked for unicode output, every token is folded to
// 7-bit ASCII before packing, so fragment lengths are byte-exact.

use std::sync::atomic::{AtomicU32, Ordering};

use ab_protocol::PAYLOAD_MAX;
use deunicode::deunicode;

use crate::response::Response;

/// Render a response into ordered payloads of at most [`PAYLOAD_MAX`] bytes.
pub fn fragment(response: &Response, force_unicode: bool) -> Vec<String> {
    let mut fragments: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in &response.lines {
        for token in &line.tokens {
            let text = if force_unicode {
                token.text.clone()
            } else {
                deunicode(&token.text)
            };
            if text.is_empty() {
                continue;
            }
            if token.splittable && text.len() > PAYLOAD_MAX {
                for word in text.split_whitespace() {
                    append_token(&mut fragments, &mut current, word);
                }
            } else {
                append_token(&mut fragments, &mut current, &text);
            }
        }
    }
    if !current.is_empty() {
        fragments.push(current);
    }
    fragments
}

fn append_token(fragments: &mut Vec<String>, current: &mut String, token: &str) {
    let needed = if current.is_empty() {
        token.len()
    } else {
        current.len() + 1 + token.len()
    };
    if needed <= PAYLOAD_MAX {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(token);
        return;
    }

    // Does not fit here; flush and retry on an empty fragment.
    if !current.is_empty() {
        fragments.push(std::mem::take(current));
    }
    if token.len() <= PAYLOAD_MAX {
        current.push_str(token);
        return;
    }

    // Token alone exceeds the ceiling: word-split, then hard-chop.
    let words: Vec<&str> = token.split_whitespace().collect();
    if words.len() > 1 {
        for word in words {
            append_token(fragments, current, word);
        }
        return;
    }
    let mut rest = token;
    while rest.len() > PAYLOAD_MAX {
        let cut = floor_char_boundary(rest, PAYLOAD_MAX);
        fragments.push(rest[..cut].to_owned());
        rest = &rest[cut..];
    }
    current.push_str(rest);
}

/// Largest index `<= at` that lands on a char boundary.
fn floor_char_boundary(s: &str, at: usize) -> usize {
    let mut i = at.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

// ---------------------------------------------------------------------------
// Outbound message-id generation
// ---------------------------------------------------------------------------

/// Generator for short unique outbound message-ids.
///
/// Ids are the wrapping counter in base-36, which keeps them within the
/// five-character APRS limit forever.
pub struct MessageIdGen {
    next: AtomicU32,
}

impl MessageIdGen {
    pub fn new() -> Self {
        MessageIdGen {
            next: AtomicU32::new(1),
        }
    }

    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) % 36u32.pow(4);
        to_base36(n)
    }
}

impl Default for MessageIdGen {
    fn default() -> Self {
        Self::new()
    }
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = [0u8; 4];
    for slot in out.iter_mut().rev() {
        *slot = DIGITS[(n % 36) as usize];
        n /= 36;
    }
    String::from_utf8_lossy(&out).into_owned()
}
