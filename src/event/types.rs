use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::checksum::Fnv1a32;
use crate::similarity::{Profile, WordId, WordWeight};

pub type MessageId = u64;
pub type Language = u16;

/// Globally unique event identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A member message: id plus publication time in seconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub id: MessageId,
    pub published: u64,
}

/// What an upstream caller sends in for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDigest {
    pub id: MessageId,
    pub lang: Language,
    pub published: u64,
    /// Most significant first.
    pub core_words: Vec<WordId>,
}

/// Event membership of one message as reported back to callers.
/// A nil `event_id` means no bank knows the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub message_id: MessageId,
    pub event_id: EventId,
    /// Number of messages in the event.
    pub capacity: u32,
}

impl MessageEvent {
    pub fn unknown(message_id: MessageId) -> Self {
        Self {
            message_id,
            event_id: EventId::nil(),
            capacity: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventFlags(pub u8);

impl EventFlags {
    pub const REVISED: u8 = 0x1;
    pub const CAN_MERGE: u8 = 0x2;
    pub const DISSENTERS_CLEANUP: u8 = 0x4;
    pub const PUSH_IN_PROGRESS: u8 = 0x20;
    pub const MEM_ONLY: u8 = 0x40;
    pub const DIRTY: u8 = 0x80;

    const TRANSIENT: u8 = Self::MEM_ONLY | Self::DIRTY | Self::PUSH_IN_PROGRESS;

    pub fn contains(&self, flags: u8) -> bool {
        self.0 & flags == flags
    }

    pub fn insert(&mut self, flags: u8) {
        self.0 |= flags;
    }

    pub fn remove(&mut self, flags: u8) {
        self.0 &= !flags;
    }

    pub fn set(&mut self, flags: u8, on: bool) {
        if on {
            self.insert(flags)
        } else {
            self.remove(flags)
        }
    }

    /// The subset that survives persistence.
    pub fn persistent(&self) -> EventFlags {
        EventFlags(self.0 & !Self::TRANSIENT)
    }
}

impl fmt::Display for EventFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marks = [
            (Self::REVISED, 'R'),
            (Self::DIRTY, 'D'),
            (Self::MEM_ONLY, 'M'),
            (Self::PUSH_IN_PROGRESS, 'P'),
            (Self::CAN_MERGE, 'G'),
            (Self::DISSENTERS_CLEANUP, 'C'),
        ];
        for (flag, mark) in marks {
            write!(f, "{}", if self.contains(flag) { mark } else { '-' })?;
        }
        Ok(())
    }
}

/// An event: messages believed to describe the same occurrence.
///
/// `messages` is kept sorted by id. `hash`, `published_min`,
/// `published_max` and `strain` are derived from the member set and the
/// dissenter count; every mutator here keeps them current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventObject {
    pub id: EventId,
    pub lang: Language,
    pub spin: i32,
    pub flags: EventFlags,
    dissenters: u32,
    strain: u32,
    hash: u32,
    published_min: u64,
    published_max: u64,
    profile: Profile,
    messages: Vec<MessageInfo>,
}

impl EventObject {
    pub fn new(id: EventId, lang: Language) -> Self {
        Self {
            id,
            lang,
            spin: 0,
            flags: EventFlags::default(),
            dissenters: 0,
            strain: 0,
            hash: Fnv1a32::new().finish(),
            published_min: 0,
            published_max: 0,
            profile: Profile::default(),
            messages: Vec::new(),
        }
    }

    /// Reassembles an event from stored parts, recomputing derived fields.
    pub fn from_parts(
        id: EventId,
        lang: Language,
        spin: i32,
        flags: EventFlags,
        dissenters: u32,
        words: Vec<WordWeight>,
        mut messages: Vec<MessageInfo>,
    ) -> Self {
        messages.sort_by_key(|m| m.id);
        messages.dedup_by_key(|m| m.id);

        let mut event = Self::new(id, lang);
        event.spin = spin;
        event.flags = flags;
        event.dissenters = dissenters;
        event.profile = Profile::new(words);
        event.messages = messages;
        event.recalc();
        event
    }

    pub fn size(&self) -> u32 {
        self.messages.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[MessageInfo] {
        &self.messages
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn words(&self) -> &[WordWeight] {
        self.profile.words()
    }

    pub fn dissenters(&self) -> u32 {
        self.dissenters
    }

    pub fn strain(&self) -> u32 {
        self.strain
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn published_min(&self) -> u64 {
        self.published_min
    }

    pub fn published_max(&self) -> u64 {
        self.published_max
    }

    pub fn contains_message(&self, id: MessageId) -> bool {
        self.messages.binary_search_by_key(&id, |m| m.id).is_ok()
    }

    /// Returns `false` if the message was already a member.
    pub fn add_message(&mut self, info: MessageInfo) -> bool {
        match self.messages.binary_search_by_key(&info.id, |m| m.id) {
            Ok(_) => false,
            Err(pos) => {
                self.messages.insert(pos, info);
                self.recalc();
                true
            }
        }
    }

    pub fn remove_message(&mut self, id: MessageId) -> Option<MessageInfo> {
        let pos = self.messages.binary_search_by_key(&id, |m| m.id).ok()?;
        let removed = self.messages.remove(pos);
        self.recalc();
        Some(removed)
    }

    /// Moves every message of `other` into this event.
    pub fn absorb(&mut self, other: EventObject) {
        self.messages.extend(other.messages);
        self.messages.sort_by_key(|m| m.id);
        self.messages.dedup_by_key(|m| m.id);
        self.dissenters += other.dissenters;
        self.recalc();
    }

    pub fn set_dissenters(&mut self, dissenters: u32) {
        self.dissenters = dissenters;
        if dissenters == 0 {
            self.flags.remove(EventFlags::DISSENTERS_CLEANUP);
        }
        self.recalc_strain();
    }

    /// Replaces the word profile from aggregated per-word totals.
    pub fn set_words(
        &mut self,
        weights: &HashMap<WordId, (u32, u32)>,
        max_words: usize,
        respect_most_frequent: bool,
    ) {
        let words = weights
            .iter()
            .map(|(&word_id, &(weight, first_count))| WordWeight::new(word_id, weight, first_count));
        self.profile = Profile::ranked(words, max_words, respect_most_frequent);
    }

    pub fn time_range(&self) -> u64 {
        self.published_max - self.published_min
    }

    /// Gap between the published spans of two events, 0 when they overlap.
    pub fn time_diff(&self, other: &EventObject) -> u64 {
        span_gap(self.published_min, self.published_max, other.published_min, other.published_max)
    }

    /// Span covered by both events together.
    pub fn time_range_with(&self, other: &EventObject) -> u64 {
        self.published_max.max(other.published_max) - self.published_min.min(other.published_min)
    }

    /// Gap between this event's span and a single timestamp.
    pub fn time_diff_to(&self, published: u64) -> u64 {
        span_gap(self.published_min, self.published_max, published, published)
    }

    pub fn time_range_to(&self, published: u64) -> u64 {
        if self.is_empty() {
            return 0;
        }
        self.published_max.max(published) - self.published_min.min(published)
    }

    pub fn can_merge(&self, max_strain: u32, max_time_range: u64, max_size: u32) -> bool {
        !self.flags.contains(EventFlags::DISSENTERS_CLEANUP)
            && self.time_range() <= max_time_range
            && self.strain <= max_strain
            && self.published_min != 0
            && self.size() <= max_size
            && !self.flags.contains(EventFlags::PUSH_IN_PROGRESS)
    }

    /// Multi-line human readable dump.
    pub fn dump(&self) -> String {
        let words: Vec<String> = self
            .words()
            .iter()
            .map(|w| format!("{}:{}/{}", w.word_id, w.weight, w.first_count))
            .collect();
        let messages: Vec<String> = self
            .messages
            .iter()
            .map(|m| format!("{}@{}", m.id, m.published))
            .collect();

        format!(
            "event {} lang={} flags={} spin={} size={} dissenters={} strain={} hash={:08x} published=[{}, {}]\n  words: {}\n  messages: {}",
            self.id,
            self.lang,
            self.flags,
            self.spin,
            self.size(),
            self.dissenters,
            self.strain,
            self.hash,
            self.published_min,
            self.published_max,
            words.join(" "),
            messages.join(" "),
        )
    }

    fn recalc(&mut self) {
        let mut hasher = Fnv1a32::new();
        let mut min = 0;
        let mut max = 0;
        for (i, message) in self.messages.iter().enumerate() {
            hasher.update(&message.id.to_le_bytes());
            if i == 0 || message.published < min {
                min = message.published;
            }
            if message.published > max {
                max = message.published;
            }
        }
        self.hash = hasher.finish();
        self.published_min = min;
        self.published_max = max;
        self.recalc_strain();
    }

    fn recalc_strain(&mut self) {
        self.strain = if self.messages.is_empty() {
            0
        } else {
            (100.0 * f64::from(self.dissenters) / self.messages.len() as f64).round() as u32
        };
    }
}

fn span_gap(min_a: u64, max_a: u64, min_b: u64, max_b: u64) -> u64 {
    if max_a < min_b {
        min_b - max_a
    } else if max_b < min_a {
        min_a - max_b
    } else {
        0
    }
}
