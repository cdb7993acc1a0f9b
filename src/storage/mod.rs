//! Storage Collaborators
//!
//! Read/write contracts the banks depend on, with in-memory implementations.
//!
//! ## Core Concepts
//! - **Counters**: word co-occurrence statistics keyed by language, day bucket and word pair.
//! - **Write-Back Cache**: batches counter deltas before they reach the backing store.
//! - **Event Store**: versioned binary event records written whenever an event is dirty.

pub mod cache;
pub mod counter;
pub mod events;

#[cfg(test)]
mod tests;
