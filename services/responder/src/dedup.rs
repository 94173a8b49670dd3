// Decaying request-deduplication cache.
//
// A bounded map keyed by (sender, message-id, payload digest).  Entries
// expire by age or by capacity pressure, whichever comes first.  Insertion
// order doubles as expiry order because the TTL is constant, so a ring of
// keys plus a map of timestamps is all the bookkeeping needed.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

/// Identity of one inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub sender: String,
    pub message_id: Option<String>,
    pub payload_digest: String,
}

impl DedupKey {
    /// Build the key from the raw (pre-repair) payload.  The digest covers
    /// the payload bytes exactly as they arrived; the message-id
    /// participates separately so a re-send with a fresh id is a fresh
    /// request.
    pub fn new(sender: &str, message_id: Option<&str>, payload: &str) -> Self {
        let digest = Sha256::digest(payload.as_bytes());
        DedupKey {
            sender: sender.to_owned(),
            message_id: message_id.map(str::to_owned),
            payload_digest: hex::encode(digest),
        }
    }
}

/// Bounded time-decaying set of request keys.
pub struct DedupCache {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<DedupKey, Instant>,
    order: VecDeque<DedupKey>,
}

impl DedupCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        DedupCache {
            ttl,
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Insert the key if it is not already present.
    ///
    /// Returns `true` when the key was newly inserted (the request should
    /// proceed) and `false` when it was already known within the TTL (the
    /// request is a duplicate and must be dropped).  The key stays cached
    /// even if the request later fails downstream; it is the *request*
    /// that is deduplicated, not its success.
    pub fn insert_if_absent(&mut self, key: DedupKey) -> bool {
        self.insert_if_absent_at(key, Instant::now())
    }

    fn insert_if_absent_at(&mut self, key: DedupKey, now: Instant) -> bool {
        self.sweep(now);
        if self.entries.contains_key(&key) {
            return false;
        }
        while self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(key.clone(), now);
        self.order.push_back(key);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything older than the TTL.  Entries in `order` are sorted
    /// by insertion time, so popping from the front is enough.
    fn sweep(&mut self, now: Instant) {
        while let Some(front) = self.order.front() {
            match self.entries.get(front) {
                Some(at) if now.duration_since(*at) >= self.ttl => {
                    self.entries.remove(front);
                    self.order.pop_front();
                }
                _ => break,
            }
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.order.pop_front() {
            self.entries.remove(&oldest);
        }
    }
}
