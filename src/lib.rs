//! Event Bank Cluster Library
//!
//! Groups news messages into events across a ring of banks. The binary
//! (`main.rs`) runs either the manager or one bank on top of these modules.
//!
//! ## Architecture Modules
//! - **`similarity`**: weighted word profiles, the overlap score and the adaptive merge level.
//! - **`event`**: message digests, event objects with their flags, and the versioned binary codec.
//! - **`membership`**: the manager's disposition state machine forming banks into a ring.
//! - **`bank`**: the per-bank event manager, session lifecycle and RPC handlers.
//! - **`client`**: RPC transports plus the fan-out session callers use to reach every bank.
//! - **`storage`**: word-pair counters, the write-back cache and the event store.
//! - **`config`** / **`error`** / **`checksum`**: shared configuration, error taxonomy and hashing.

pub mod bank;
pub mod checksum;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod membership;
pub mod similarity;
pub mod storage;
