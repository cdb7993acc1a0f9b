use dashmap::DashMap;
use std::sync::Arc;

use crate::event::codec::{self, CodecError};
use crate::event::types::{EventId, EventObject, MessageDigest, MessageId};

/// Where a bank writes its dirty events and the digests of their members.
/// A restarting bank rebuilds its state from both.
pub trait EventStore: Send + Sync {
    fn save(&self, event: &EventObject) -> Result<(), CodecError>;

    fn remove(&self, id: &EventId);

    fn load_all(&self) -> Result<Vec<EventObject>, CodecError>;

    fn save_message(&self, digest: &MessageDigest) -> Result<(), CodecError>;

    fn remove_message(&self, id: MessageId);

    fn load_messages(&self) -> Result<Vec<MessageDigest>, CodecError>;
}

/// Keeps encoded event records in memory, sharded the same way a
/// key-value backend would be.
pub struct MemoryEventStore {
    shards: Arc<DashMap<u32, DashMap<EventId, Vec<u8>>>>,
    messages: Arc<DashMap<MessageId, Vec<u8>>>,
    shard_count: u32,
}

impl MemoryEventStore {
    pub fn new(shard_count: u32) -> Self {
        Self {
            shards: Arc::new(DashMap::new()),
            messages: Arc::new(DashMap::new()),
            shard_count: shard_count.max(1),
        }
    }

    fn shard_of(&self, id: &EventId) -> u32 {
        crate::checksum::fnv1a32(id.0.as_bytes()) % self.shard_count
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn message_len(&self) -> usize {
        self.messages.len()
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new(16)
    }
}

impl EventStore for MemoryEventStore {
    fn save(&self, event: &EventObject) -> Result<(), CodecError> {
        let bytes = codec::encode(event)?;
        self.shards
            .entry(self.shard_of(&event.id))
            .or_default()
            .insert(event.id, bytes);
        Ok(())
    }

    fn remove(&self, id: &EventId) {
        if let Some(shard) = self.shards.get(&self.shard_of(id)) {
            shard.remove(id);
        }
    }

    fn load_all(&self) -> Result<Vec<EventObject>, CodecError> {
        let mut events = Vec::new();
        for shard in self.shards.iter() {
            for entry in shard.iter() {
                events.push(codec::decode(entry.value())?);
            }
        }
        events.sort_by_key(|e: &EventObject| e.id);
        Ok(events)
    }

    fn save_message(&self, digest: &MessageDigest) -> Result<(), CodecError> {
        let bytes = codec::encode(digest)?;
        self.messages.insert(digest.id, bytes);
        Ok(())
    }

    fn remove_message(&self, id: MessageId) {
        self.messages.remove(&id);
    }

    fn load_messages(&self) -> Result<Vec<MessageDigest>, CodecError> {
        let mut digests = self
            .messages
            .iter()
            .map(|entry| codec::decode(entry.value()))
            .collect::<Result<Vec<MessageDigest>, CodecError>>()?;
        digests.sort_by_key(|d| d.id);
        Ok(digests)
    }
}
