//! Similarity Engine
//!
//! Pure numeric scoring of weighted-word profiles. Everything here is
//! deterministic and free of I/O; banks call into it while deciding whether a
//! message extends an existing event or two events should be combined.
//!
//! ## Building Blocks
//! - **`profile`**: ranked word-weight arrays and the reverse `word -> rank` index.
//! - **`overlap`**: the 0..=100 overlap score with its leading-offset penalty.
//! - **`merge`**: core word weighting and the adaptive merge threshold.
//! - **`tables`**: lazily memoized power, normalisation and penalty tables.

pub mod merge;
pub mod overlap;
pub mod profile;
mod tables;

pub use merge::{MergeParams, core_word_weight, merge_level};
pub use overlap::overlap;
pub use profile::{Profile, WordId, WordWeight};

#[cfg(test)]
mod tests;
