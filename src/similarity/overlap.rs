use super::profile::Profile;
use super::tables::{offset_penalty, overlap_scale, pw};

/// Overlap score of two profiles in `0..=100`. Symmetric.
///
/// Matched words are paired so the strongest ranks of the longer profile
/// meet the short profile's words in their own order. The score is the
/// normalised rank-weighted sum minus a quadratic penalty for matches that
/// only start deep into either profile.
pub fn overlap(a: &Profile, b: &Profile) -> u32 {
    let (short, long) = if a.len() > b.len() { (b, a) } else { (a, b) };
    let ls = short.len() as u32;
    let ll = long.len() as u32;
    if ls == 0 {
        return 0;
    }

    let mut short_ranks = Vec::with_capacity(short.len());
    let mut long_ranks = Vec::with_capacity(short.len());
    for (i, word) in short.words().iter().enumerate() {
        if let Some(rank) = long.rank(word.word_id) {
            short_ranks.push(ls - i as u32);
            long_ranks.push(rank);
        }
    }

    let common = short_ranks.len();
    if common == 0 || (common < 3 && (ll > 2 || (common == 1 && ls > 1))) {
        return 0;
    }

    long_ranks.sort_unstable_by(|x, y| y.cmp(x));

    let raw: f64 = short_ranks
        .iter()
        .zip(&long_ranks)
        .map(|(&s, &l)| pw(s) * pw(l))
        .sum();
    let normalised = (raw * overlap_scale(ls, ll)).round() as i64;

    let mut short_offset = f64::from(ls - short_ranks[0]);
    let mut long_offset = f64::from(ll - long_ranks[0]);
    if ls < ll {
        let ratio = f64::from(ls) / f64::from(ll);
        short_offset = (short_offset / ratio).round();
        long_offset = (long_offset * ratio).round();
    }
    let penalty = i64::from(offset_penalty((short_offset + long_offset) as u32));

    (normalised - penalty).clamp(0, 100) as u32
}
