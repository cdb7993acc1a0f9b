use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::event::types::Language;
use crate::similarity::WordId;

/// Seconds per statistics bucket.
pub const BUCKET_SECONDS: u64 = 86_400;

/// Key of a word co-occurrence counter: a leading word paired with another
/// core word of the same message, per language and day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WordPairKey {
    pub lang: Language,
    pub bucket: u32,
    pub first: WordId,
    pub second: WordId,
}

impl WordPairKey {
    pub fn new(lang: Language, published: u64, first: WordId, second: WordId) -> Self {
        Self {
            lang,
            bucket: (published / BUCKET_SECONDS) as u32,
            first,
            second,
        }
    }
}

/// Occurrence counter store.
pub trait CounterStore: Send + Sync {
    fn add(&self, key: WordPairKey, delta: i64);

    fn get(&self, key: &WordPairKey) -> i64;

    fn increment(&self, key: WordPairKey) {
        self.add(key, 1);
    }

    fn decrement(&self, key: WordPairKey) {
        self.add(key, -1);
    }
}

/// In-memory counters partitioned by time bucket, so whole days can be
/// dropped at once.
#[derive(Default)]
pub struct MemoryCounterStore {
    buckets: Arc<DashMap<u32, DashMap<WordPairKey, i64>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every bucket older than `oldest_kept`. Returns how many went.
    pub fn expire_before(&self, oldest_kept: u32) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|bucket, _| *bucket >= oldest_kept);
        before - self.buckets.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Live counters across every bucket.
    pub fn key_count(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.len()).sum()
    }
}

impl CounterStore for MemoryCounterStore {
    fn add(&self, key: WordPairKey, delta: i64) {
        if delta == 0 {
            return;
        }
        let bucket = self.buckets.entry(key.bucket).or_default();
        let mut counter = bucket.entry(key).or_insert(0);
        *counter += delta;
        if *counter <= 0 {
            drop(counter);
            bucket.remove(&key);
        }
    }

    fn get(&self, key: &WordPairKey) -> i64 {
        self.buckets
            .get(&key.bucket)
            .and_then(|bucket| bucket.get(key).map(|c| *c))
            .unwrap_or(0)
    }
}
