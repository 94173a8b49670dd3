// Outbound acknowledgement ledger.
//
// Both acknowledgement dialects are recognized on the inbound side: the
// legacy `ackNN` body and the in-band `{MM}NN` reply-ack trailer.  The
// ledger only tracks confirmation state; there is no retransmit; the
// remote sender re-sends the original on its own timeout.

use std::collections::{HashMap, VecDeque};

const LEDGER_CAP: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAck {
    pub addressee: String,
    pub confirmed: bool,
}

/// Bounded record of outbound message-ids awaiting confirmation.
#[derive(Default)]
pub struct AckLedger {
    entries: HashMap<String, PendingAck>,
    order: VecDeque<String>,
}

impl AckLedger {
    pub fn new() -> Self {
        AckLedger::default()
    }

    /// Record an outbound fragment id sent to `addressee`.
    pub fn sent(&mut self, id: &str, addressee: &str) {
        while self.order.len() >= LEDGER_CAP {
            if let Some(old) = self.order.pop_front() {
                self.entries.remove(&old);
            }
        }
        self.entries.insert(
            id.to_owned(),
            PendingAck {
                addressee: addressee.to_owned(),
                confirmed: false,
            },
        );
        self.order.push_back(id.to_owned());
    }

    /// Mark an id confirmed; either dialect lands here.  Returns true when
    /// the id was known and belonged to this sender.
    pub fn confirm(&mut self, id: &str, sender: &str) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if entry.addressee.eq_ignore_ascii_case(sender) => {
                entry.confirmed = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_confirmed(&self, id: &str) -> bool {
        self.entries.get(id).map(|e| e.confirmed).unwrap_or(false)
    }

    pub fn pending_count(&self) -> usize {
        self.entries.values().filter(|e| !e.confirmed).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_marks_only_matching_sender() {
        let mut ledger = AckLedger::new();
        ledger.sent("0001", "DF1JSL-8");
        assert!(!ledger.confirm("0001", "W1AW"));
        assert!(!ledger.is_confirmed("0001"));
        assert!(ledger.confirm("0001", "df1jsl-8"));
        assert!(ledger.is_confirmed("0001"));
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut ledger = AckLedger::new();
        assert!(!ledger.confirm("zzzz", "W1AW"));
    }

    #[test]
    fn ledger_is_bounded() {
        let mut ledger = AckLedger::new();
        for i in 0..(LEDGER_CAP + 10) {
            ledger.sent(&format!("{i:05}"), "W1AW");
        }
        assert!(ledger.pending_count() <= LEDGER_CAP);
        // The earliest entries were evicted.
        assert!(!ledger.confirm("00000", "W1AW"));
    }
}
