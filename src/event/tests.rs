//! Event Module Tests
//!
//! ## Test Scopes
//! - **Flags**: bit operations, the persistent subset and the debug string.
//! - **Derived State**: ordering, hash, published span and strain upkeep.
//! - **Merge Eligibility**: every clause of `can_merge`.
//! - **Codec**: current layout, upgrade from the first layout, and rejection of unknown tags.

#[cfg(test)]
mod tests {
    use crate::event::codec::{self, CodecError, EventRecordV1};
    use crate::event::types::{EventFlags, EventId, EventObject, MessageDigest, MessageInfo};
    use crate::storage::counter::WordPairKey;
    use crate::membership::types::{BankId, DispositionSnapshot};
    use crate::similarity::WordWeight;
    use std::collections::HashMap;

    fn message(id: u64, published: u64) -> MessageInfo {
        MessageInfo { id, published }
    }

    fn event_with(messages: &[(u64, u64)]) -> EventObject {
        let mut event = EventObject::new(EventId::new(), 1);
        for &(id, published) in messages {
            event.add_message(message(id, published));
        }
        event
    }

    // ============================================================
    // FLAG TESTS
    // ============================================================

    #[test]
    fn test_flags_insert_remove() {
        let mut flags = EventFlags::default();
        flags.insert(EventFlags::DIRTY | EventFlags::CAN_MERGE);

        assert!(flags.contains(EventFlags::DIRTY));
        assert!(flags.contains(EventFlags::CAN_MERGE));
        assert!(!flags.contains(EventFlags::REVISED));

        flags.remove(EventFlags::DIRTY);
        assert!(!flags.contains(EventFlags::DIRTY));

        flags.set(EventFlags::REVISED, true);
        assert_eq!(flags.0, EventFlags::REVISED | EventFlags::CAN_MERGE);
    }

    #[test]
    fn test_persistent_flags_drop_transient_bits() {
        let flags = EventFlags(0xff);
        let persistent = flags.persistent();

        assert!(persistent.contains(EventFlags::REVISED));
        assert!(persistent.contains(EventFlags::CAN_MERGE));
        assert!(persistent.contains(EventFlags::DISSENTERS_CLEANUP));
        assert!(!persistent.contains(EventFlags::MEM_ONLY));
        assert!(!persistent.contains(EventFlags::DIRTY));
        assert!(!persistent.contains(EventFlags::PUSH_IN_PROGRESS));
    }

    #[test]
    fn test_flags_display() {
        let flags = EventFlags(EventFlags::REVISED | EventFlags::DIRTY | EventFlags::CAN_MERGE);
        assert_eq!(flags.to_string(), "RD--G-");
        assert_eq!(EventFlags::default().to_string(), "------");
    }

    // ============================================================
    // DERIVED STATE TESTS
    // ============================================================

    #[test]
    fn test_messages_stay_sorted_and_unique() {
        let mut event = event_with(&[(30, 300), (10, 100), (20, 200)]);

        assert!(!event.add_message(message(20, 999)));

        let ids: Vec<u64> = event.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
        assert_eq!(event.size(), 3);
        assert!(event.contains_message(10));
        assert!(!event.contains_message(11));
    }

    #[test]
    fn test_published_span_follows_membership() {
        let mut event = event_with(&[(1, 500), (2, 200), (3, 900)]);

        assert_eq!(event.published_min(), 200);
        assert_eq!(event.published_max(), 900);
        assert_eq!(event.time_range(), 700);

        event.remove_message(2);
        assert_eq!(event.published_min(), 500);

        event.remove_message(1);
        event.remove_message(3);
        assert_eq!(event.published_min(), 0);
        assert_eq!(event.published_max(), 0);
        assert_eq!(event.time_range(), 0);
    }

    #[test]
    fn test_hash_depends_only_on_member_ids() {
        let a = event_with(&[(1, 10), (2, 20), (3, 30)]);
        let b = event_with(&[(3, 99), (1, 98), (2, 97)]);
        let c = event_with(&[(1, 10), (2, 20)]);

        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_strain_is_recomputed() {
        let mut event = event_with(&[(1, 10), (2, 20), (3, 30)]);

        event.set_dissenters(1);
        assert_eq!(event.strain(), 33);

        event.set_dissenters(2);
        assert_eq!(event.strain(), 67);

        // Membership changes keep strain current
        event.add_message(message(4, 40));
        assert_eq!(event.strain(), 50);
    }

    #[test]
    fn test_clearing_dissenters_clears_cleanup_flag() {
        let mut event = event_with(&[(1, 10)]);
        event.set_dissenters(1);
        event.flags.insert(EventFlags::DISSENTERS_CLEANUP);

        event.set_dissenters(0);

        assert!(!event.flags.contains(EventFlags::DISSENTERS_CLEANUP));
        assert_eq!(event.strain(), 0);
    }

    #[test]
    fn test_time_relations_between_events() {
        let early = event_with(&[(1, 100), (2, 200)]);
        let late = event_with(&[(3, 500), (4, 800)]);
        let inside = event_with(&[(5, 150)]);

        assert_eq!(early.time_diff(&late), 300);
        assert_eq!(late.time_diff(&early), 300);
        assert_eq!(early.time_diff(&inside), 0);
        assert_eq!(early.time_range_with(&late), 700);
        assert_eq!(early.time_diff_to(260), 60);
        assert_eq!(early.time_range_to(50), 150);
    }

    #[test]
    fn test_absorb_moves_messages() {
        let mut dest = event_with(&[(1, 100), (3, 300)]);
        let src = event_with(&[(2, 200), (4, 400)]);

        dest.absorb(src);

        let ids: Vec<u64> = dest.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(dest.published_max(), 400);
    }

    #[test]
    fn test_set_words_ranks_profile() {
        let mut event = event_with(&[(1, 100)]);
        let mut weights = HashMap::new();
        weights.insert(7, (10, 0));
        weights.insert(8, (40, 1));
        weights.insert(9, (25, 0));

        event.set_words(&weights, 10, true);

        let ids: Vec<u32> = event.words().iter().map(|w| w.word_id).collect();
        assert_eq!(ids, vec![8, 9, 7]);
        assert_eq!(event.profile().rank(8), Some(3));
    }

    // ============================================================
    // MERGE ELIGIBILITY TESTS
    // ============================================================

    #[test]
    fn test_can_merge_clauses() {
        let base = event_with(&[(1, 1_000), (2, 2_000)]);
        assert!(base.can_merge(50, 10_000, 10));

        // Time range over the limit
        assert!(!base.can_merge(50, 500, 10));

        // Size over the limit
        assert!(!base.can_merge(50, 10_000, 1));

        // Strain over the limit
        let mut strained = base.clone();
        strained.set_dissenters(2);
        assert!(!strained.can_merge(50, 10_000, 10));

        // Pending dissenter cleanup
        let mut cleanup = base.clone();
        cleanup.flags.insert(EventFlags::DISSENTERS_CLEANUP);
        assert!(!cleanup.can_merge(50, 10_000, 10));

        // Being pushed by someone else
        let mut pushing = base.clone();
        pushing.flags.insert(EventFlags::PUSH_IN_PROGRESS);
        assert!(!pushing.can_merge(50, 10_000, 10));

        // No timestamped message
        let empty = EventObject::new(EventId::new(), 1);
        assert!(!empty.can_merge(50, 10_000, 10));
    }

    // ============================================================
    // CODEC TESTS
    // ============================================================

    #[test]
    fn test_event_codec_keeps_persistent_state() {
        let mut event = event_with(&[(1, 100), (2, 200)]);
        event.spin = -3;
        event.set_dissenters(1);
        event.flags.insert(EventFlags::REVISED | EventFlags::DIRTY | EventFlags::MEM_ONLY);
        let mut weights = HashMap::new();
        weights.insert(5, (30, 2));
        weights.insert(6, (20, 0));
        event.set_words(&weights, 10, false);

        let bytes = codec::encode(&event).expect("Encoding failed");
        assert_eq!(bytes[0], 2);

        let restored: EventObject = codec::decode(&bytes).expect("Decoding failed");

        assert_eq!(restored.id, event.id);
        assert_eq!(restored.spin, -3);
        assert_eq!(restored.dissenters(), 1);
        assert_eq!(restored.strain(), 50);
        assert_eq!(restored.hash(), event.hash());
        assert_eq!(restored.words(), event.words());
        assert_eq!(restored.messages(), event.messages());
        assert_eq!(restored.flags, EventFlags(EventFlags::REVISED));
    }

    #[test]
    fn test_event_codec_reads_first_layout() {
        // ARRANGE: a record written before first-occurrence counters existed
        let old = EventRecordV1 {
            id: uuid::Uuid::new_v4(),
            flags: EventFlags::CAN_MERGE | EventFlags::DIRTY,
            spin: 4,
            dissenters: 0,
            lang: 2,
            words: vec![(11, 90), (12, 40)],
            messages: vec![message(9, 900), message(3, 300)],
        };
        let mut bytes = vec![1u8];
        bytes.extend(bincode::serialize(&old).expect("Serialization failed"));

        // ACT
        let event: EventObject = codec::decode(&bytes).expect("Decoding failed");

        // ASSERT
        assert_eq!(event.id.0, old.id);
        assert_eq!(event.lang, 2);
        assert_eq!(
            event.words(),
            &[WordWeight::new(11, 90, 0), WordWeight::new(12, 40, 0)]
        );
        assert_eq!(event.messages()[0].id, 3);
        assert_eq!(event.published_min(), 300);
        assert_eq!(event.flags, EventFlags(EventFlags::CAN_MERGE));
    }

    #[test]
    fn test_codec_rejects_unknown_and_empty_records() {
        let result = codec::decode::<EventObject>(&[9, 0, 0]);
        assert!(matches!(
            result,
            Err(CodecError::UnsupportedVersion { version: 9, .. })
        ));

        let result = codec::decode::<MessageInfo>(&[]);
        assert!(matches!(result, Err(CodecError::Empty("message"))));

        let result = codec::decode::<MessageInfo>(&[1, 0]);
        assert!(matches!(result, Err(CodecError::Bincode(_))));
    }

    #[test]
    fn test_message_and_disposition_records() {
        let info = message(77, 12_345);
        let bytes = codec::encode(&info).expect("Encoding failed");
        let restored: MessageInfo = codec::decode(&bytes).expect("Decoding failed");
        assert_eq!(restored, info);

        let snapshot = DispositionSnapshot {
            guid: uuid::Uuid::new_v4(),
            banks: vec![BankId("10.0.0.1:7000".into()), BankId("10.0.0.2:7000".into())],
        };
        let bytes = codec::encode(&snapshot).expect("Encoding failed");
        let restored: DispositionSnapshot = codec::decode(&bytes).expect("Decoding failed");
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn test_digest_and_word_pair_records_keep_their_kind() {
        let digest = MessageDigest {
            id: 9,
            lang: 2,
            published: 1_700_000_000,
            core_words: vec![30, 10, 20],
        };
        let bytes = codec::encode(&digest).expect("Encoding failed");
        let restored: MessageDigest = codec::decode(&bytes).expect("Decoding failed");
        assert_eq!(restored, digest);
        assert!(matches!(
            codec::decode::<MessageDigest>(&[2, 0]),
            Err(CodecError::UnsupportedVersion {
                kind: "message digest",
                version: 2
            })
        ));

        let key = WordPairKey::new(2, 1_700_000_000, 30, 10);
        let bytes = codec::encode(&key).expect("Encoding failed");
        let restored: WordPairKey = codec::decode(&bytes).expect("Decoding failed");
        assert_eq!(restored, key);
    }
}
