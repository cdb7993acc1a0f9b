//! Similarity Engine Tests
//!
//! ## Test Scopes
//! - **Overlap**: symmetry, maximal self-similarity, early rejection and monotonic decay.
//! - **Weights**: core word weighting and profile ranking rules.
//! - **Merge Level**: monotonicity in every input and clamping to `[min, 100]`.

#[cfg(test)]
mod tests {
    use crate::similarity::tables::pw;
    use crate::similarity::{
        MergeParams, Profile, WordId, WordWeight, core_word_weight, merge_level, overlap,
    };

    fn profile(words: &[WordId]) -> Profile {
        Profile::of_message(words, 20)
    }

    fn range(from: WordId, to: WordId) -> Vec<WordId> {
        (from..to).collect()
    }

    // ============================================================
    // OVERLAP TESTS
    // ============================================================

    #[test]
    fn test_overlap_is_symmetric() {
        let pairs = [
            (range(1, 11), range(1, 11)),
            (range(1, 11), range(3, 9)),
            (vec![1, 2, 3, 4, 5, 6], vec![6, 5, 4, 3, 2, 1]),
            (range(1, 21), vec![20, 2, 7, 11, 30, 31]),
            (vec![9, 8, 7], range(1, 40)),
        ];

        for (a, b) in pairs {
            let (pa, pb) = (profile(&a), profile(&b));
            assert_eq!(overlap(&pa, &pb), overlap(&pb, &pa), "{:?} vs {:?}", a, b);
        }
    }

    #[test]
    fn test_self_overlap_is_maximal() {
        for len in [3, 4, 5, 10, 20, 99, 120] {
            let p = Profile::new(
                (0..len)
                    .map(|i| WordWeight::new(i, 1000 - i, 0))
                    .collect(),
            );
            assert_eq!(overlap(&p, &p), 100, "length {}", len);
        }
    }

    #[test]
    fn test_disjoint_and_empty_profiles_score_zero() {
        let a = profile(&range(1, 6));
        let b = profile(&range(10, 16));
        let empty = Profile::default();

        assert_eq!(overlap(&a, &b), 0);
        assert_eq!(overlap(&a, &empty), 0);
        assert_eq!(overlap(&empty, &empty), 0);
    }

    #[test]
    fn test_few_common_words_are_rejected() {
        // Two shared words between profiles longer than two words
        let a = profile(&[1, 2, 3, 4]);
        let b = profile(&[1, 2, 7, 8, 9]);

        assert_eq!(overlap(&a, &b), 0);

        // A lone shared word in a single-word profile still counts
        let single = profile(&[1]);
        let pair = profile(&[1, 2]);
        assert!(overlap(&single, &pair) > 0);
    }

    #[test]
    fn test_overlap_decays_when_tail_matches_are_removed() {
        let a = profile(&range(1, 11));
        let mut previous = 100;

        for removed in 1..=10 {
            // Replace the lightest `removed` words of B with unrelated ones
            let mut words = range(1, 11 - removed);
            words.extend(100..100 + removed);
            let score = overlap(&a, &profile(&words));

            assert!(score <= previous, "removed {}: {} > {}", removed, score, previous);
            previous = score;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn test_overlap_decays_when_head_matches_are_removed() {
        let a = profile(&range(1, 11));
        let mut previous = 100;

        for removed in 1..=10 {
            let mut words: Vec<WordId> = (100..100 + removed).collect();
            words.extend(range(1 + removed, 11));
            let score = overlap(&a, &profile(&words));

            assert!(score <= previous, "removed {}: {} > {}", removed, score, previous);
            previous = score;
        }
    }

    #[test]
    fn test_late_start_is_penalised() {
        let a = profile(&range(1, 11));
        let aligned = profile(&range(1, 11));
        let shifted = profile(&[50, 51, 1, 2, 3, 4, 5, 6, 7, 8]);

        assert!(overlap(&a, &shifted) < overlap(&a, &aligned));
    }

    // ============================================================
    // WEIGHT TESTS
    // ============================================================

    #[test]
    fn test_core_word_weight_boosts_leading_word() {
        assert_eq!(core_word_weight(0, 20, 20), (pw(20) * 1.75).round() as u32);
        assert_eq!(core_word_weight(1, 20, 20), pw(19).round() as u32);
        assert_eq!(core_word_weight(19, 20, 20), 1);
    }

    #[test]
    fn test_core_word_weight_stretches_short_messages() {
        // 5 words on a scale of 20: index 1 has 4 remaining -> 16
        assert_eq!(core_word_weight(1, 5, 20), pw(16).round() as u32);
        assert_eq!(core_word_weight(4, 5, 20), pw(4).round() as u32);
        assert_eq!(core_word_weight(5, 5, 20), 0);
    }

    #[test]
    fn test_core_word_weight_is_decreasing() {
        for count in [1u32, 3, 7, 20, 30] {
            let weights: Vec<u32> = (0..count).map(|i| core_word_weight(i, count, 20)).collect();
            assert!(weights.windows(2).all(|w| w[0] > w[1]), "{:?}", weights);
        }
    }

    #[test]
    fn test_message_profile_ranks() {
        let p = profile(&[7, 3, 9]);

        assert_eq!(p.len(), 3);
        assert_eq!(p.rank(7), Some(3));
        assert_eq!(p.rank(3), Some(2));
        assert_eq!(p.rank(9), Some(1));
        assert_eq!(p.rank(1), None);
        assert_eq!(p.words()[0].first_count, 1);
        assert_eq!(p.words()[1].first_count, 0);
    }

    #[test]
    fn test_ranked_orders_and_truncates_on_weight_change() {
        let weights = vec![
            WordWeight::new(1, 10, 0),
            WordWeight::new(2, 50, 0),
            WordWeight::new(3, 30, 0),
            WordWeight::new(4, 30, 0),
            WordWeight::new(5, 0, 0),
            WordWeight::new(6, 5, 0),
        ];

        // ACT: limit to 2, but 3 and 4 share a weight and stay together
        let p = Profile::ranked(weights.clone(), 2, false);

        // ASSERT
        let ids: Vec<WordId> = p.word_ids().collect();
        assert_eq!(ids, vec![2, 3, 4]);

        // Zero weights are never kept
        let p = Profile::ranked(weights, 100, false);
        let ids: Vec<WordId> = p.word_ids().collect();
        assert_eq!(ids, vec![2, 3, 4, 1, 6]);
    }

    #[test]
    fn test_ranked_promotes_most_frequent_leader() {
        let weights = vec![
            WordWeight::new(1, 100, 1),
            WordWeight::new(2, 80, 3),
            WordWeight::new(3, 60, 0),
        ];

        let promoted = Profile::ranked(weights.clone(), 10, true);
        let plain = Profile::ranked(weights, 10, false);

        assert_eq!(promoted.words()[0].word_id, 2);
        assert_eq!(promoted.rank(2), Some(3));
        assert_eq!(plain.words()[0].word_id, 1);
    }

    #[test]
    fn test_profile_serde_rebuilds_ranks() {
        let p = profile(&[4, 5, 6]);

        let json = serde_json::to_string(&p).expect("Serialization failed");
        let restored: Profile = serde_json::from_str(&json).expect("Deserialization failed");

        assert_eq!(restored, p);
        assert_eq!(restored.rank(4), Some(3));
    }

    // ============================================================
    // MERGE LEVEL TESTS
    // ============================================================

    #[test]
    fn test_merge_level_base_case() {
        let params = MergeParams::default();
        assert_eq!(merge_level(0, 0, 0, 0, &params), params.base);
    }

    #[test]
    fn test_merge_level_monotonic_in_each_input() {
        let params = MergeParams::default();

        let by_range: Vec<u32> = (0..50u64)
            .map(|r| merge_level(10, 5, 0, r * 20_000, &params))
            .collect();
        assert!(by_range.windows(2).all(|w| w[0] <= w[1]));

        let by_strain: Vec<u32> = (0..=100u32)
            .map(|s| merge_level(10, s, 0, 3_600, &params))
            .collect();
        assert!(by_strain.windows(2).all(|w| w[0] <= w[1]));

        let by_size: Vec<u32> = (0..2_000u32)
            .step_by(25)
            .map(|n| merge_level(n, 20, 0, 3_600, &params))
            .collect();
        assert!(by_size.windows(2).all(|w| w[0] >= w[1]));

        let by_gap: Vec<u32> = (0..40u64)
            .map(|g| merge_level(10, 0, g * 3_600, 0, &params))
            .collect();
        assert!(by_gap.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_merge_level_is_clamped() {
        let params = MergeParams::default();

        // Huge events floor at the configured minimum
        assert_eq!(merge_level(1_000_000, 0, 0, 0, &params), params.min);
        // Everything maxed out caps at 100
        assert_eq!(merge_level(0, 100, 10_000_000, 10_000_000, &params), 100);
    }

    #[test]
    fn test_merge_level_ignores_gap_within_rift() {
        let params = MergeParams::default();

        assert_eq!(
            merge_level(0, 0, params.min_rift_time, 0, &params),
            merge_level(0, 0, 0, 0, &params)
        );
        assert!(
            merge_level(0, 0, params.min_rift_time + 20_000, 0, &params)
                > merge_level(0, 0, 0, 0, &params)
        );
    }
}
