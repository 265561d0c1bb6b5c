use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::messaging::message::Message;

/// Every chat message this node has seen, keyed by derived message id, plus
/// the per-origin vector clock. Messages are never deleted; anti-entropy
/// replays them to peers that are behind.
pub struct MessageStore {
    messages: FxHashMap<String, Message>,
    clock: BTreeMap<String, u32>,
}

impl MessageStore {
    pub fn new() -> MessageStore {
        MessageStore {
            messages: FxHashMap::default(),
            clock: BTreeMap::new(),
        }
    }

    pub fn has(&self, message_id: &str) -> bool {
        self.messages.contains_key(message_id)
    }

    /// Idempotent on message id: the first stored message wins. Returns
    /// whether the message was newly stored.
    pub fn put(&mut self, message: Message) -> bool {
        let id = message.message_id();
        if self.messages.contains_key(&id) {
            return false;
        }
        self.messages.insert(id, message);
        true
    }

    /// Monotonic max: the clock never moves backwards.
    pub fn update_clock(&mut self, origin: &str, sequence_number: u32) {
        let entry = self.clock.entry(origin.to_string()).or_insert(0);
        if sequence_number > *entry {
            *entry = sequence_number;
        }
    }

    pub fn clock(&self) -> &BTreeMap<String, u32> {
        &self.clock
    }

    /// Every stored message whose sequence number exceeds what the remote
    /// clock records for its origin. Linear in store size; anti-entropy runs
    /// at a coarse cadence, so that is acceptable.
    pub fn missing_relative_to(&self, remote_clock: &BTreeMap<String, u32>) -> Vec<Message> {
        self.messages.values()
            .filter(|m| m.sequence_number > remote_clock.get(&m.origin).copied().unwrap_or(0))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
