//! Inbound frame admission.
//!
//! Sits between the session and the parser: applies the message-format
//! and secondary addressee filters, repairs defective message-id
//! trailers, consults the dedup cache, confirms acknowledgements of our
//! own traffic, and acks admitted requests.  Admitted requests leave on a
//! FIFO channel toward the dispatcher.
//!
//! Ordering contract: the ack frame for an admitted request is enqueued
//! here, before the dispatcher ever sees the request, so it always
//! precedes the first response fragment.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use ab_protocol::{FrameFormat, InboundFrame, OutboundCategory, OutboundFrame};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::ack::AckLedger;
use crate::dedup::{DedupCache, DedupKey};

/// An admitted request, ready for parsing and dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub source: String,
    pub body: String,
    pub message_id: Option<String>,
    pub uses_reply_ack: bool,
}

pub struct Ingress {
    callsign: String,
    addressees: HashSet<String>,
    dedup: DedupCache,
    ledger: Arc<Mutex<AckLedger>>,
}

impl Ingress {
    pub fn new(
        callsign: &str,
        addressees: &[String],
        dedup: DedupCache,
        ledger: Arc<Mutex<AckLedger>>,
    ) -> Self {
        Ingress {
            callsign: callsign.to_owned(),
            addressees: addressees.iter().map(|a| a.to_uppercase()).collect(),
            dedup,
            ledger,
        }
    }

    /// Pump frames until the session channel closes.  Acks travel on the
    /// scheduler's batch channel ahead of the request handoff, which is
    /// what guarantees ack-before-first-fragment ordering.
    pub async fn run(
        mut self,
        mut inbound_rx: mpsc::Receiver<InboundFrame>,
        batch_tx: mpsc::Sender<Vec<OutboundFrame>>,
        request_tx: mpsc::Sender<Request>,
    ) {
        while let Some(frame) = inbound_rx.recv().await {
            if let Some((request, ack)) = self.admit(frame) {
                if let Some(ack) = ack {
                    if batch_tx.send(vec![ack]).await.is_err() {
                        return;
                    }
                }
                if request_tx.send(request).await.is_err() {
                    return;
                }
            }
        }
    }

    /// Decide what to do with one frame.
    ///
    /// Returns `None` for a drop, otherwise the request to dispatch and
    /// the ack frame to enqueue first (if one is owed).
    fn admit(&mut self, frame: InboundFrame) -> Option<(Request, Option<OutboundFrame>)> {
        if frame.format != FrameFormat::Message {
            return None;
        }
        if !self.addressees.contains(&frame.addressee.to_uppercase()) {
            debug!(addressee = %frame.addressee, "not for us");
            return None;
        }

        // Confirmations of our own outbound, either dialect.
        if let Some(id) = ab_protocol::parse_legacy_ack(&frame.body) {
            if self.ledger.lock().unwrap().confirm(id, &frame.source) {
                debug!(%id, from = %frame.source, "outbound confirmed");
            }
            return None;
        }
        if let Some(id) = ab_protocol::parse_legacy_rej(&frame.body) {
            info!(%id, from = %frame.source, "outbound rejected by remote");
            return None;
        }
        if let Some(acked) = &frame.acks_message_id {
            if self.ledger.lock().unwrap().confirm(acked, &frame.source) {
                debug!(id = %acked, from = %frame.source, "outbound confirmed in-band");
            }
        }

        // Repair pass: recover an id the strict grammar missed.
        let (body, message_id, uses_reply_ack) = match frame.message_id {
            Some(id) => (frame.body.clone(), Some(id), frame.uses_reply_ack),
            None => match ab_protocol::fixup::repair(&frame.body) {
                Some(fixed) => {
                    if let Some(acked) = &fixed.acks_message_id {
                        let _ = self.ledger.lock().unwrap().confirm(acked, &frame.source);
                    }
                    (fixed.body, Some(fixed.message_id), true)
                }
                None => (frame.body.clone(), None, false),
            },
        };
        if body.trim().is_empty() {
            return None;
        }

        let key = DedupKey::new(&frame.source, message_id.as_deref(), &body);
        if !self.dedup.insert_if_absent(key) {
            debug!(from = %frame.source, "duplicate request dropped");
            return None;
        }

        let ack = message_id.as_deref().map(|id| OutboundFrame {
            line: ab_protocol::render_ack(&self.callsign, &frame.source, id),
            category: OutboundCategory::Ack,
        });
        let request = Request {
            source: frame.source,
            body,
            message_id,
            uses_reply_ack,
        };
        Some((request, ack))
    }
}
