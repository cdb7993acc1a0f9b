use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::merge::core_word_weight;

pub type WordId = u32;

/// One entry of a ranked profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordWeight {
    pub word_id: WordId,
    pub weight: u32,
    /// How many member messages had this word as their most significant one.
    pub first_count: u32,
}

impl WordWeight {
    pub fn new(word_id: WordId, weight: u32, first_count: u32) -> Self {
        Self {
            word_id,
            weight,
            first_count,
        }
    }
}

/// A weight-ordered word array plus its `word -> rank` index.
///
/// The heaviest word has rank `len()`, the lightest has rank `1`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<WordWeight>", into = "Vec<WordWeight>")]
pub struct Profile {
    words: Vec<WordWeight>,
    ranks: HashMap<WordId, u32>,
}

impl Profile {
    /// Takes `words` in the given order. Duplicate ids keep their first
    /// (heaviest) occurrence.
    pub fn new(words: Vec<WordWeight>) -> Self {
        let mut seen = HashSet::with_capacity(words.len());
        let words: Vec<WordWeight> = words
            .into_iter()
            .filter(|w| seen.insert(w.word_id))
            .collect();

        let len = words.len() as u32;
        let ranks = words
            .iter()
            .enumerate()
            .map(|(i, w)| (w.word_id, len - i as u32))
            .collect();

        Self { words, ranks }
    }

    /// Builds a profile out of aggregated weights.
    ///
    /// Words are ordered by descending weight (ties by word id). With
    /// `respect_most_frequent`, the word that most often led its messages is
    /// promoted to the front when it did so more than once. The array is cut
    /// at the first zero weight, and after `max_words` entries as soon as the
    /// weight changes, so equally weighted words are never split.
    pub fn ranked(
        weights: impl IntoIterator<Item = WordWeight>,
        max_words: usize,
        respect_most_frequent: bool,
    ) -> Self {
        let mut words: Vec<WordWeight> = weights.into_iter().collect();
        words.sort_by(|a, b| b.weight.cmp(&a.weight).then(a.word_id.cmp(&b.word_id)));

        if respect_most_frequent
            && let Some((pos, leader)) = words
                .iter()
                .enumerate()
                .max_by(|(ia, a), (ib, b)| a.first_count.cmp(&b.first_count).then(ib.cmp(ia)))
            && leader.first_count > 1
            && pos > 0
        {
            let leader = words.remove(pos);
            words.insert(0, leader);
        }

        let mut cut = words.len();
        for (i, w) in words.iter().enumerate() {
            if w.weight == 0 || (i >= max_words && i > 0 && w.weight != words[i - 1].weight) {
                cut = i;
                break;
            }
        }
        words.truncate(cut);

        Self::new(words)
    }

    /// Profile of a single message out of its core words, most significant
    /// first.
    pub fn of_message(core_words: &[WordId], max_core_words: usize) -> Self {
        let count = core_words.len() as u32;
        let words = core_words
            .iter()
            .enumerate()
            .map(|(i, &word_id)| {
                WordWeight::new(
                    word_id,
                    core_word_weight(i as u32, count, max_core_words as u32),
                    u32::from(i == 0),
                )
            })
            .collect();
        Self::new(words)
    }

    pub fn words(&self) -> &[WordWeight] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn rank(&self, word_id: WordId) -> Option<u32> {
        self.ranks.get(&word_id).copied()
    }

    pub fn contains(&self, word_id: WordId) -> bool {
        self.ranks.contains_key(&word_id)
    }

    pub fn word_ids(&self) -> impl Iterator<Item = WordId> + '_ {
        self.words.iter().map(|w| w.word_id)
    }
}

impl From<Vec<WordWeight>> for Profile {
    fn from(words: Vec<WordWeight>) -> Self {
        Self::new(words)
    }
}

impl From<Profile> for Vec<WordWeight> {
    fn from(profile: Profile) -> Self {
        profile.words
    }
}
