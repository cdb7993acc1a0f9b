//! Bank-side event bookkeeping.
//!
//! Events live in an arena keyed by `EventNumber`. The message index and the
//! word index hold numbers, never references, so events can be merged and
//! dropped without invalidating anything but their own entries.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::config::BankConfig;
use crate::event::types::{
    EventFlags, EventId, EventObject, Language, MessageDigest, MessageEvent, MessageId,
    MessageInfo,
};
use crate::similarity::{Profile, WordId, core_word_weight, merge_level, overlap};

pub type EventNumber = u64;

/// Per-message customization applied before a digest is inserted.
pub trait MessageAdjuster: Send + Sync {
    /// Returns `false` to drop the digest.
    fn adjust(&self, digest: &mut MessageDigest) -> bool;
}

pub struct NoAdjustment;

impl MessageAdjuster for NoAdjustment {
    fn adjust(&self, _digest: &mut MessageDigest) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The message was already known; nothing changed.
    Existing(MessageEvent),
    Inserted(MessageEvent),
    /// Expired or dropped by the adjuster.
    Rejected,
}

impl InsertOutcome {
    pub fn event(&self) -> Option<MessageEvent> {
        match self {
            Self::Existing(event) | Self::Inserted(event) => Some(*event),
            Self::Rejected => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub merged: usize,
    pub ejected: usize,
}

struct StoredMessage {
    lang: Language,
    published: u64,
    core_words: Vec<WordId>,
    event: EventNumber,
}

impl StoredMessage {
    fn digest(&self, id: MessageId) -> MessageDigest {
        MessageDigest {
            id,
            lang: self.lang,
            published: self.published,
            core_words: self.core_words.clone(),
        }
    }
}

struct Candidate {
    number: EventNumber,
    relative: f64,
    time_diff: u64,
}

impl Candidate {
    fn beats(&self, other: &Option<Candidate>) -> bool {
        match other {
            None => true,
            Some(best) => {
                self.relative > best.relative
                    || (self.relative == best.relative && self.time_diff < best.time_diff)
            }
        }
    }
}

pub struct EventManager {
    config: BankConfig,
    adjuster: Box<dyn MessageAdjuster>,
    events: HashMap<EventNumber, EventObject>,
    numbers: HashMap<EventId, EventNumber>,
    messages: HashMap<MessageId, StoredMessage>,
    word_events: HashMap<WordId, BTreeSet<EventNumber>>,
    next_number: EventNumber,
    removed: Vec<EventId>,
}

impl EventManager {
    pub fn new(config: BankConfig) -> Self {
        Self::with_adjuster(config, Box::new(NoAdjustment))
    }

    pub fn with_adjuster(config: BankConfig, adjuster: Box<dyn MessageAdjuster>) -> Self {
        Self {
            config,
            adjuster,
            events: HashMap::new(),
            numbers: HashMap::new(),
            messages: HashMap::new(),
            word_events: HashMap::new(),
            next_number: 1,
            removed: Vec::new(),
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn message_event(&self, id: MessageId) -> Option<MessageEvent> {
        let stored = self.messages.get(&id)?;
        let event = self.events.get(&stored.event)?;
        Some(MessageEvent {
            message_id: id,
            event_id: event.id,
            capacity: event.size(),
        })
    }

    /// The digest as stored: adjusted, with repeated and surplus core
    /// words dropped.
    pub fn message_digest(&self, id: MessageId) -> Option<MessageDigest> {
        self.messages.get(&id).map(|stored| stored.digest(id))
    }

    /// Events of the known messages among `ids`; unknown ids are skipped.
    pub fn get_message_events(&self, ids: &[MessageId]) -> Vec<MessageEvent> {
        ids.iter().filter_map(|&id| self.message_event(id)).collect()
    }

    pub fn get_events(&self, ids: &[EventId]) -> Vec<EventObject> {
        ids.iter()
            .filter_map(|id| self.numbers.get(id))
            .filter_map(|number| self.events.get(number))
            .cloned()
            .collect()
    }

    pub fn event(&self, id: &EventId) -> Option<&EventObject> {
        self.numbers.get(id).and_then(|number| self.events.get(number))
    }

    /// Places one message into the best matching event, or a new one.
    pub fn insert(&mut self, mut digest: MessageDigest, now_secs: u64) -> InsertOutcome {
        if let Some(existing) = self.message_event(digest.id) {
            return InsertOutcome::Existing(existing);
        }
        if !self.adjuster.adjust(&mut digest) {
            tracing::debug!("Message {} dropped by adjuster", digest.id);
            return InsertOutcome::Rejected;
        }
        if now_secs.saturating_sub(digest.published) > self.config.message_expiration_secs {
            tracing::debug!("Message {} expired (published {})", digest.id, digest.published);
            return InsertOutcome::Rejected;
        }

        let core_words = distinct_words(&digest.core_words, self.config.max_core_words);
        let profile = Profile::of_message(&core_words, self.config.max_core_words);

        let number = match self.best_event_for(digest.lang, digest.published, &profile) {
            Some(number) => number,
            None => self.create_event(digest.lang),
        };

        self.messages.insert(
            digest.id,
            StoredMessage {
                lang: digest.lang,
                published: digest.published,
                core_words,
                event: number,
            },
        );
        if let Some(event) = self.events.get_mut(&number) {
            let joined_existing = !event.is_empty();
            event.add_message(MessageInfo {
                id: digest.id,
                published: digest.published,
            });
            event.flags.insert(EventFlags::DIRTY);
            if joined_existing {
                event.flags.remove(EventFlags::REVISED);
            }
        }
        self.rebuild_words(number);
        self.set_merge(number);

        match self.message_event(digest.id) {
            Some(event) => {
                tracing::trace!(
                    "Message {} -> event {} ({} messages)",
                    digest.id,
                    event.event_id,
                    event.capacity
                );
                InsertOutcome::Inserted(event)
            }
            None => InsertOutcome::Rejected,
        }
    }

    /// Removes messages, returning the digests of those that were known.
    pub fn delete_messages(&mut self, ids: &[MessageId]) -> Vec<MessageDigest> {
        let mut removed = Vec::new();
        let mut touched = BTreeSet::new();

        for &id in ids {
            let Some(stored) = self.messages.remove(&id) else {
                continue;
            };
            if let Some(event) = self.events.get_mut(&stored.event) {
                event.remove_message(id);
                touched.insert(stored.event);
            }
            removed.push(stored.digest(id));
        }

        for number in touched {
            let empty = self.events.get(&number).is_none_or(|e| e.is_empty());
            if empty {
                self.drop_event(number);
                continue;
            }
            self.rebuild_words(number);
            if let Some(event) = self.events.get_mut(&number) {
                event.flags.insert(EventFlags::DIRTY);
                event.flags.remove(EventFlags::REVISED | EventFlags::CAN_MERGE);
            }
        }

        removed
    }

    /// One maintenance pass: refresh merge flags, eject dissenters from
    /// strained events, then merge each event into its best partner.
    pub fn merge_events(&mut self) -> MergeReport {
        let mut report = MergeReport::default();

        let mut numbers: Vec<EventNumber> = self.events.keys().copied().collect();
        numbers.sort_unstable();

        for &number in &numbers {
            let unrevised = self
                .events
                .get(&number)
                .is_some_and(|e| !e.flags.contains(EventFlags::REVISED));
            if unrevised {
                let dissenters = self.count_dissenters(number);
                if let Some(event) = self.events.get_mut(&number) {
                    event.set_dissenters(dissenters);
                    event.flags.insert(EventFlags::REVISED);
                }
                self.set_merge(number);
            }
        }

        for &number in &numbers {
            let needs_cleanup = self
                .events
                .get(&number)
                .is_some_and(|e| e.flags.contains(EventFlags::DISSENTERS_CLEANUP));
            if needs_cleanup {
                report.ejected += self.eject_dissenters(number);
            }
        }

        for &number in &numbers {
            let ready = self.events.get(&number).is_some_and(|e| {
                e.flags
                    .contains(EventFlags::CAN_MERGE | EventFlags::REVISED)
            });
            if !ready {
                continue;
            }
            if let Some(partner) = self.find_best_overlap(number) {
                self.merge_pair(number, partner);
                report.merged += 1;
            }
        }

        if report.merged > 0 || report.ejected > 0 {
            tracing::debug!(
                "Merge pass: {} merges, {} dissenters ejected, {} events",
                report.merged,
                report.ejected,
                self.events.len()
            );
        }
        report
    }

    /// Copies of all dirty events, clearing their dirty state, plus the ids
    /// of events dropped since the last call.
    pub fn take_dirty(&mut self) -> (Vec<EventObject>, Vec<EventId>) {
        let mut dirty = Vec::new();
        for event in self.events.values_mut() {
            if event.flags.contains(EventFlags::DIRTY) {
                dirty.push(event.clone());
                event.flags.remove(EventFlags::DIRTY | EventFlags::MEM_ONLY);
            }
        }
        dirty.sort_by_key(|e| e.id);
        (dirty, std::mem::take(&mut self.removed))
    }

    /// Deletes every message published before `oldest_kept`.
    pub fn expire(&mut self, oldest_kept: u64) -> Vec<MessageDigest> {
        let expired: Vec<MessageId> = self
            .messages
            .iter()
            .filter(|(_, stored)| stored.published < oldest_kept)
            .map(|(&id, _)| id)
            .collect();
        if expired.is_empty() {
            return Vec::new();
        }
        tracing::info!("Expiring {} messages", expired.len());
        self.delete_messages(&expired)
    }

    /// Rebuilds state from persisted events and member digests. Members
    /// without a digest leave their event; events left empty are reported
    /// as removed. Returns the digests that found their event.
    pub fn restore(
        &mut self,
        events: Vec<EventObject>,
        digests: Vec<MessageDigest>,
    ) -> Vec<MessageDigest> {
        let mut by_id: HashMap<MessageId, MessageDigest> =
            digests.into_iter().map(|d| (d.id, d)).collect();
        let mut restored = Vec::new();

        for mut event in events {
            if self.numbers.contains_key(&event.id) {
                continue;
            }
            let number = self.next_number;
            let members: Vec<MessageId> = event.messages().iter().map(|m| m.id).collect();
            let mut lost = 0;

            for id in members {
                let digest = by_id
                    .remove(&id)
                    .filter(|_| !self.messages.contains_key(&id));
                let Some(digest) = digest else {
                    event.remove_message(id);
                    lost += 1;
                    continue;
                };
                let stored = StoredMessage {
                    lang: digest.lang,
                    published: digest.published,
                    core_words: distinct_words(&digest.core_words, self.config.max_core_words),
                    event: number,
                };
                restored.push(stored.digest(id));
                self.messages.insert(id, stored);
            }

            if event.is_empty() {
                self.removed.push(event.id);
                continue;
            }
            if lost > 0 {
                tracing::warn!("Event {} lost {} members without a digest", event.id, lost);
                event.flags.insert(EventFlags::DIRTY);
                event.flags.remove(EventFlags::REVISED);
            }

            self.next_number += 1;
            self.numbers.insert(event.id, number);
            self.events.insert(number, event);
            self.rebuild_words(number);
            self.set_merge(number);
        }

        tracing::info!(
            "Restored {} events with {} messages",
            self.events.len(),
            self.messages.len()
        );
        restored
    }

    pub fn dump(&self) -> String {
        let mut numbers: Vec<&EventNumber> = self.events.keys().collect();
        numbers.sort_unstable();
        numbers
            .into_iter()
            .filter_map(|n| self.events.get(n))
            .map(|e| e.dump())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn create_event(&mut self, lang: Language) -> EventNumber {
        let number = self.next_number;
        self.next_number += 1;

        let mut event = EventObject::new(EventId::new(), lang);
        event
            .flags
            .insert(EventFlags::DIRTY | EventFlags::MEM_ONLY | EventFlags::REVISED);
        self.numbers.insert(event.id, number);
        self.events.insert(number, event);
        number
    }

    fn drop_event(&mut self, number: EventNumber) -> Option<EventObject> {
        let event = self.events.remove(&number)?;
        self.numbers.remove(&event.id);
        for word_id in event.profile().word_ids() {
            self.unindex_word(word_id, number);
        }
        self.removed.push(event.id);
        Some(event)
    }

    fn unindex_word(&mut self, word_id: WordId, number: EventNumber) {
        if let Some(set) = self.word_events.get_mut(&word_id) {
            set.remove(&number);
            if set.is_empty() {
                self.word_events.remove(&word_id);
            }
        }
    }

    /// Recomputes an event's word profile from its members' core words and
    /// reindexes it.
    fn rebuild_words(&mut self, number: EventNumber) {
        let max_core_words = self.config.max_core_words as u32;
        let Some(event) = self.events.get_mut(&number) else {
            return;
        };

        let mut weights: HashMap<WordId, (u32, u32)> = HashMap::new();
        for info in event.messages() {
            let Some(stored) = self.messages.get(&info.id) else {
                continue;
            };
            let count = stored.core_words.len() as u32;
            for (i, &word_id) in stored.core_words.iter().enumerate() {
                let entry = weights.entry(word_id).or_default();
                entry.0 += core_word_weight(i as u32, count, max_core_words);
                if i == 0 {
                    entry.1 += 1;
                }
            }
        }

        let old: Vec<WordId> = event.profile().word_ids().collect();
        event.set_words(
            &weights,
            self.config.max_event_words,
            self.config.respect_most_frequent,
        );
        let new: Vec<WordId> = event.profile().word_ids().collect();

        for word_id in old {
            self.unindex_word(word_id, number);
        }
        for word_id in new {
            self.word_events.entry(word_id).or_default().insert(number);
        }
    }

    fn set_merge(&mut self, number: EventNumber) {
        let limits = self.config.limits;
        if let Some(event) = self.events.get_mut(&number) {
            if event.strain() > limits.max_strain {
                event.flags.insert(EventFlags::DISSENTERS_CLEANUP);
            }
            let can_merge =
                event.can_merge(limits.max_strain, limits.max_time_range_secs, limits.max_size);
            event.flags.set(EventFlags::CAN_MERGE, can_merge);
        }
    }

    fn candidates(&self, profile: &Profile) -> BTreeSet<EventNumber> {
        let mut found = BTreeSet::new();
        for word_id in profile.word_ids() {
            if let Some(set) = self.word_events.get(&word_id) {
                found.extend(set.iter().copied());
            }
        }
        found
    }

    /// Best event for a single new message, if any clears the threshold.
    fn best_event_for(
        &self,
        lang: Language,
        published: u64,
        profile: &Profile,
    ) -> Option<EventNumber> {
        let limits = &self.config.limits;
        let mut best: Option<Candidate> = None;

        for number in self.candidates(profile) {
            let Some(event) = self.events.get(&number) else {
                continue;
            };
            if event.lang != lang
                || !event.flags.contains(EventFlags::CAN_MERGE)
                || event.size() < limits.min_size
                || event.size() + 1 > limits.max_size
            {
                continue;
            }

            let time_diff = event.time_diff_to(published);
            let time_range = event.time_range_to(published);
            if time_diff > limits.max_time_diff_secs || time_range > limits.max_time_range_secs {
                continue;
            }

            let score = overlap(profile, event.profile());
            let level = merge_level(
                event.size(),
                event.strain(),
                time_diff,
                time_range,
                &self.config.merge,
            );
            if score < limits.merge_level_min || score < level {
                continue;
            }

            let candidate = Candidate {
                number,
                relative: f64::from(score) / f64::from(level.max(1)),
                time_diff,
            };
            if candidate.beats(&best) {
                best = Some(candidate);
            }
        }

        best.map(|c| c.number)
    }

    /// Best merge partner for an existing event.
    fn find_best_overlap(&self, number: EventNumber) -> Option<EventNumber> {
        let limits = &self.config.limits;
        let event = self.events.get(&number)?;
        if event.size() < limits.min_size {
            return None;
        }
        let mut best: Option<Candidate> = None;

        for other_number in self.candidates(event.profile()) {
            if other_number == number {
                continue;
            }
            let Some(other) = self.events.get(&other_number) else {
                continue;
            };
            if other.lang != event.lang
                || other.size() < limits.min_size
                || !other
                    .flags
                    .contains(EventFlags::CAN_MERGE | EventFlags::REVISED)
                || other.size() + event.size() > limits.max_size
            {
                continue;
            }

            let time_diff = event.time_diff(other);
            let time_range = event.time_range_with(other);
            if time_diff > limits.max_time_diff_secs || time_range > limits.max_time_range_secs {
                continue;
            }

            let score = overlap(event.profile(), other.profile());
            let level = merge_level(
                0,
                event.strain().max(other.strain()),
                time_diff,
                time_range,
                &self.config.merge,
            );
            if score < limits.merge_level_min || score < level {
                continue;
            }

            let candidate = Candidate {
                number: other_number,
                relative: f64::from(score) / f64::from(level.max(1)),
                time_diff,
            };
            if candidate.beats(&best) {
                best = Some(candidate);
            }
        }

        best.map(|c| c.number)
    }

    /// Folds the smaller event into the larger one. Ties keep the older
    /// (lower numbered) event.
    fn merge_pair(&mut self, a: EventNumber, b: EventNumber) {
        let (Some(size_a), Some(size_b)) = (
            self.events.get(&a).map(|e| e.size()),
            self.events.get(&b).map(|e| e.size()),
        ) else {
            return;
        };
        let (dest, src) = if size_b > size_a || (size_b == size_a && b < a) {
            (b, a)
        } else {
            (a, b)
        };

        let Some(absorbed) = self.drop_event(src) else {
            return;
        };
        for info in absorbed.messages() {
            if let Some(stored) = self.messages.get_mut(&info.id) {
                stored.event = dest;
            }
        }
        let absorbed_id = absorbed.id;
        if let Some(event) = self.events.get_mut(&dest) {
            event.absorb(absorbed);
            event.flags.insert(EventFlags::DIRTY);
            event.flags.remove(EventFlags::REVISED);
            tracing::debug!(
                "Event {} absorbed {} ({} messages)",
                event.id,
                absorbed_id,
                event.size()
            );
        }

        self.rebuild_words(dest);
        let dissenters = self.count_dissenters(dest);
        if let Some(event) = self.events.get_mut(&dest) {
            event.set_dissenters(dissenters);
        }
        self.set_merge(dest);
    }

    /// Overlap a member needs to keep with its own event.
    fn dissent_level(&self, event: &EventObject) -> u32 {
        merge_level(event.size(), 0, 0, event.time_range(), &self.config.merge)
    }

    fn is_dissenter(&self, stored: &StoredMessage, event_profile: &Profile, level: u32) -> bool {
        let profile = Profile::of_message(&stored.core_words, self.config.max_core_words);
        overlap(&profile, event_profile) < level
    }

    /// Members whose own profile no longer resembles the event's. A single
    /// message never dissents.
    fn dissenting_members(&self, number: EventNumber) -> Vec<MessageId> {
        let Some(event) = self.events.get(&number) else {
            return Vec::new();
        };
        if event.size() <= 1 {
            return Vec::new();
        }
        let level = self.dissent_level(event);
        event
            .messages()
            .iter()
            .filter(|info| {
                self.messages
                    .get(&info.id)
                    .is_some_and(|stored| self.is_dissenter(stored, event.profile(), level))
            })
            .map(|info| info.id)
            .collect()
    }

    fn count_dissenters(&self, number: EventNumber) -> u32 {
        self.dissenting_members(number).len() as u32
    }

    /// Moves every dissenting member into a fresh event of its own.
    fn eject_dissenters(&mut self, number: EventNumber) -> usize {
        let mut ejected = self.dissenting_members(number);
        let size = self.events.get(&number).map_or(0, |e| e.messages().len());
        if !ejected.is_empty() && ejected.len() == size {
            // The first member stays, an event is never emptied here.
            ejected.remove(0);
        }

        for &id in &ejected {
            let Some(stored) = self.messages.get(&id) else {
                continue;
            };
            let published = stored.published;
            let lang = stored.lang;

            if let Some(event) = self.events.get_mut(&number) {
                event.remove_message(id);
            }
            let fresh = self.create_event(lang);
            if let Some(event) = self.events.get_mut(&fresh) {
                event.add_message(MessageInfo { id, published });
            }
            if let Some(stored) = self.messages.get_mut(&id) {
                stored.event = fresh;
            }
            self.rebuild_words(fresh);
            self.set_merge(fresh);
        }

        self.rebuild_words(number);
        if let Some(event) = self.events.get_mut(&number) {
            event.set_dissenters(0);
            event.flags.insert(EventFlags::DIRTY);
        }
        self.set_merge(number);

        if !ejected.is_empty() {
            tracing::debug!("Ejected {} dissenters from event #{}", ejected.len(), number);
        }
        ejected.len()
    }
}

/// Core words without repeats, most significant first, at most `limit`.
fn distinct_words(words: &[WordId], limit: usize) -> Vec<WordId> {
    let mut seen = HashSet::with_capacity(words.len());
    words
        .iter()
        .copied()
        .filter(|w| seen.insert(*w))
        .take(limit)
        .collect()
}
