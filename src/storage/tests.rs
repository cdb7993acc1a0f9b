//! Storage Module Tests
//!
//! ## Test Scopes
//! - **Counters**: increment/decrement/get semantics and bucket partitioning.
//! - **Write-Back Cache**: delta folding, capacity-triggered and explicit flushes.
//! - **Event Store**: encoded events and member digests, removal.

#[cfg(test)]
mod tests {
    use crate::event::types::{EventFlags, EventId, EventObject, MessageDigest, MessageInfo};
    use crate::storage::cache::WriteBackCounter;
    use crate::storage::counter::{BUCKET_SECONDS, CounterStore, MemoryCounterStore, WordPairKey};
    use crate::storage::events::{EventStore, MemoryEventStore};
    use std::sync::Arc;

    fn key(day: u64, first: u32, second: u32) -> WordPairKey {
        WordPairKey::new(1, day * BUCKET_SECONDS + 10, first, second)
    }

    // ============================================================
    // COUNTER TESTS
    // ============================================================

    #[test]
    fn test_counter_increment_decrement() {
        let store = MemoryCounterStore::new();
        let k = key(3, 1, 2);

        store.increment(k);
        store.increment(k);
        store.decrement(k);

        assert_eq!(store.get(&k), 1);
        assert_eq!(store.get(&key(3, 2, 1)), 0);
    }

    #[test]
    fn test_counter_drops_exhausted_keys() {
        let store = MemoryCounterStore::new();
        let k = key(0, 5, 6);

        store.increment(k);
        store.decrement(k);
        store.decrement(k);

        assert_eq!(store.get(&k), 0);
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn test_counters_are_partitioned_by_day() {
        let store = MemoryCounterStore::new();
        store.increment(key(1, 1, 2));
        store.increment(key(2, 1, 2));
        store.increment(key(2, 1, 3));

        assert_eq!(store.bucket_count(), 2);
        assert_eq!(store.key_count(), 3);

        // ACT: forget everything before day 2
        let expired = store.expire_before(2);

        // ASSERT
        assert_eq!(expired, 1);
        assert_eq!(store.get(&key(1, 1, 2)), 0);
        assert_eq!(store.get(&key(2, 1, 2)), 1);
    }

    // ============================================================
    // WRITE-BACK CACHE TESTS
    // ============================================================

    #[test]
    fn test_cache_folds_deltas_until_flush() {
        let backend = Arc::new(MemoryCounterStore::new());
        let cache = WriteBackCounter::new(backend.clone(), 100);
        let k = key(0, 1, 2);

        cache.increment(k);
        cache.increment(k);
        cache.increment(k);
        cache.decrement(k);

        // Reads through the cache see pending deltas, the backend does not
        assert_eq!(cache.get(&k), 2);
        assert_eq!(backend.get(&k), 0);
        assert_eq!(cache.pending_len(), 1);

        assert_eq!(cache.flush(), 1);
        assert_eq!(backend.get(&k), 2);
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn test_cache_flushes_at_capacity() {
        let backend = Arc::new(MemoryCounterStore::new());
        let cache = WriteBackCounter::new(backend.clone(), 3);

        cache.increment(key(0, 1, 2));
        cache.increment(key(0, 1, 3));
        assert_eq!(backend.get(&key(0, 1, 2)), 0);

        // Third distinct key reaches capacity
        cache.increment(key(0, 1, 4));

        assert_eq!(cache.pending_len(), 0);
        assert_eq!(backend.get(&key(0, 1, 2)), 1);
        assert_eq!(backend.get(&key(0, 1, 4)), 1);
    }

    #[test]
    fn test_cache_skips_cancelled_deltas() {
        let backend = Arc::new(MemoryCounterStore::new());
        let cache = WriteBackCounter::new(backend, 10);

        cache.increment(key(0, 8, 9));
        cache.decrement(key(0, 8, 9));

        assert_eq!(cache.flush(), 0);
    }

    #[test]
    fn test_cache_reads_never_lose_deltas_during_flush() {
        // ARRANGE: capacity 1 flushes on every write
        let cache = Arc::new(WriteBackCounter::new(Arc::new(MemoryCounterStore::new()), 1));
        let k = key(0, 1, 2);
        let writes = 5_000;

        // ACT
        std::thread::scope(|scope| {
            let writer = cache.clone();
            scope.spawn(move || {
                for _ in 0..writes {
                    writer.increment(k);
                }
            });

            // ASSERT: a reader racing the flushes only ever sees the count grow
            let mut last = 0;
            while last < writes {
                let seen = cache.get(&k);
                assert!(seen >= last, "Count went back from {} to {}", last, seen);
                assert!(seen <= writes);
                last = seen;
            }
        });

        assert_eq!(cache.get(&k), writes);
        assert_eq!(cache.pending_len(), 0);
    }

    // ============================================================
    // EVENT STORE TESTS
    // ============================================================

    #[test]
    fn test_event_store_round_trip() {
        let store = MemoryEventStore::new(4);
        let mut event = EventObject::new(EventId::new(), 3);
        event.add_message(MessageInfo {
            id: 1,
            published: 100,
        });
        event.flags.insert(EventFlags::DIRTY | EventFlags::REVISED);

        store.save(&event).expect("Save failed");

        let all = store.load_all().expect("Load failed");
        assert_eq!(all.len(), 1);
        let loaded = &all[0];
        assert_eq!(loaded.id, event.id);
        assert_eq!(loaded.messages(), event.messages());
        assert!(!loaded.flags.contains(EventFlags::DIRTY));
        assert!(loaded.flags.contains(EventFlags::REVISED));
    }

    #[test]
    fn test_event_store_remove_and_load_all() {
        let store = MemoryEventStore::default();
        let ids: Vec<EventId> = (0..5).map(|_| EventId::new()).collect();
        for id in &ids {
            store
                .save(&EventObject::new(*id, 1))
                .expect("Save failed");
        }
        assert_eq!(store.len(), 5);

        store.remove(&ids[0]);

        let all = store.load_all().expect("Load failed");
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
        assert!(all.iter().all(|e| e.id != ids[0]));
    }

    #[test]
    fn test_event_store_keeps_message_digests() {
        let store = MemoryEventStore::default();
        for id in [3, 1, 2] {
            store
                .save_message(&MessageDigest {
                    id,
                    lang: 1,
                    published: 1_000 + id,
                    core_words: vec![id as u32, 7],
                })
                .expect("Save failed");
        }

        store.remove_message(2);
        store.remove_message(42);

        let digests = store.load_messages().expect("Load failed");
        let ids: Vec<u64> = digests.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(digests[1].core_words, vec![3, 7]);
        assert_eq!(store.message_len(), 2);
        assert!(store.is_empty());
    }
}
