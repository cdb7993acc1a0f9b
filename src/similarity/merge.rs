use serde::{Deserialize, Serialize};

use super::tables::pw;

/// Boost applied to a message's single most significant word.
const LEADING_WORD_BOOST: f64 = 1.75;

/// Weight of the `index`-th most significant word among `count` core words.
///
/// Messages with fewer than `max_count` core words are stretched onto the
/// full `max_count` scale.
pub fn core_word_weight(index: u32, count: u32, max_count: u32) -> u32 {
    if index >= count {
        return 0;
    }

    let remaining = count - index;
    let weight = if count < max_count {
        pw((f64::from(max_count) * f64::from(remaining) / f64::from(count)).round() as u32)
    } else {
        pw(remaining)
    };

    let weight = if index == 0 {
        weight * LEADING_WORD_BOOST
    } else {
        weight
    };
    weight.round() as u32
}

/// Tuning of the adaptive merge threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeParams {
    pub base: u32,
    /// Floor of the threshold.
    pub min: u32,
    /// Seconds between an event and a newcomer before the gap starts to count.
    pub min_rift_time: u64,
    pub step_size: f64,
    pub step_time: f64,
    pub step_range: f64,
    pub step_strain: f64,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            base: 40,
            min: 25,
            min_rift_time: 7_200,
            step_size: 0.05,
            step_time: 0.001,
            step_range: 0.000_2,
            step_strain: 0.3,
        }
    }
}

/// Overlap an event of `event_size` messages must reach before it may absorb
/// something `time_diff` seconds away, given a combined span of `time_range`
/// seconds. Always within `[params.min, 100]`.
pub fn merge_level(
    event_size: u32,
    strain: u32,
    time_diff: u64,
    time_range: u64,
    params: &MergeParams,
) -> u32 {
    let mut level = u64::from(params.base) + (params.step_range * time_range as f64) as u64;

    if time_diff > params.min_rift_time {
        level += (params.step_time * (time_diff - params.min_rift_time) as f64) as u64;
    }

    level += (params.step_strain * f64::from(strain)) as u64;

    let decrement = (params.step_size * f64::from(event_size)) as u64;
    level = level.saturating_sub(decrement);

    level.max(u64::from(params.min)).min(100) as u32
}
