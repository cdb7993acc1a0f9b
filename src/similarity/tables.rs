use std::sync::OnceLock;

/// Exponent of the rank weighting curve.
const POWER: f64 = 1.1;
const TABLE_SIZE: usize = 100;

fn power_table() -> &'static [f64] {
    static TABLE: OnceLock<Vec<f64>> = OnceLock::new();
    TABLE.get_or_init(|| (0..TABLE_SIZE).map(|x| (x as f64).powf(POWER)).collect())
}

/// `x^1.1`.
pub fn pw(x: u32) -> f64 {
    let x = x as usize;
    if x < TABLE_SIZE {
        power_table()[x]
    } else {
        (x as f64).powf(POWER)
    }
}

/// Highest raw overlap two profiles of lengths `short <= long` can reach:
/// every word of the short profile matched against the tail-aligned ranks of
/// the long one.
fn max_overlap(short: u32, long: u32) -> f64 {
    let mut total = 0.0;
    let (mut s, mut l) = (short, long);
    while s > 0 {
        total += pw(s) * pw(l);
        s -= 1;
        l -= 1;
    }
    total
}

fn scale_table() -> &'static [f64] {
    static TABLE: OnceLock<Vec<f64>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = vec![0.0; TABLE_SIZE * TABLE_SIZE];
        for long in 1..TABLE_SIZE as u32 {
            for short in 1..=long {
                table[long as usize * TABLE_SIZE + short as usize] =
                    100.0 / max_overlap(short, long);
            }
        }
        table
    })
}

/// Factor turning a raw overlap of profiles `(short, long)` into 0..=100.
pub fn overlap_scale(short: u32, long: u32) -> f64 {
    debug_assert!(short <= long);
    if short == 0 {
        return 0.0;
    }
    if (long as usize) < TABLE_SIZE {
        scale_table()[long as usize * TABLE_SIZE + short as usize]
    } else {
        100.0 / max_overlap(short, long)
    }
}

fn penalty_table() -> &'static [u32] {
    static TABLE: OnceLock<Vec<u32>> = OnceLock::new();
    TABLE.get_or_init(|| (0..TABLE_SIZE as u32).map(quadratic_penalty).collect())
}

fn quadratic_penalty(offset: u32) -> u32 {
    let n = u64::from(offset);
    let penalty = (n.saturating_mul(n + 1) / 2).saturating_mul(5);
    u32::try_from(penalty).unwrap_or(u32::MAX)
}

/// Penalty for matches that start late in either profile.
pub fn offset_penalty(offset: u32) -> u32 {
    if (offset as usize) < TABLE_SIZE {
        penalty_table()[offset as usize]
    } else {
        quadratic_penalty(offset)
    }
}
