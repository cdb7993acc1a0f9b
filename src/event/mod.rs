//! Event Records
//!
//! The unit of clustering: an `EventObject` groups messages that describe the
//! same occurrence, keeps a ranked word profile aggregated over its members,
//! and carries the bookkeeping (strain, hash, published span, flags) the
//! similarity engine and the banks rely on.
//!
//! `codec` holds the versioned binary layout used when events and the other
//! shared records are persisted.

pub mod codec;
pub mod types;

#[cfg(test)]
mod tests;
