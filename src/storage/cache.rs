use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::counter::{CounterStore, WordPairKey};

/// Write-back cache in front of a counter store.
///
/// Deltas are summed per key in memory and pushed to the backend when the
/// number of pending keys reaches `capacity`, or on an explicit `flush`.
/// Reads see backend value plus the pending delta.
pub struct WriteBackCounter<S: CounterStore> {
    backend: Arc<S>,
    pending: Mutex<HashMap<WordPairKey, i64>>,
    capacity: usize,
}

impl<S: CounterStore> WriteBackCounter<S> {
    pub fn new(backend: Arc<S>, capacity: usize) -> Self {
        Self {
            backend,
            pending: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn backend(&self) -> &Arc<S> {
        &self.backend
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Pushes every non-zero pending delta. Returns how many keys were written.
    ///
    /// The pending map stays locked until the backend holds every delta, so
    /// a concurrent `get` never misses or double counts one.
    pub fn flush(&self) -> usize {
        let mut pending = self.pending.lock();
        let mut written = 0;
        for (key, delta) in pending.drain() {
            if delta != 0 {
                self.backend.add(key, delta);
                written += 1;
            }
        }
        drop(pending);

        if written > 0 {
            tracing::debug!("Flushed {} word pair counters", written);
        }
        written
    }
}

impl<S: CounterStore> CounterStore for WriteBackCounter<S> {
    fn add(&self, key: WordPairKey, delta: i64) {
        let full = {
            let mut pending = self.pending.lock();
            *pending.entry(key).or_insert(0) += delta;
            pending.len() >= self.capacity
        };
        if full {
            self.flush();
        }
    }

    fn get(&self, key: &WordPairKey) -> i64 {
        let pending = self.pending.lock();
        self.backend.get(key) + pending.get(key).copied().unwrap_or(0)
    }
}
