//! Membership & Disposition Module
//!
//! The manager side of cluster membership. Banks register with a single
//! manager, which freezes them into a ring (the disposition), hands every
//! bank a session token for its ring position, and watches the ring through
//! token-authenticated pings.
//!
//! ## Core Mechanisms
//! - **Registration Windows**: a quiet period with no new banks freezes the ring; a second quiet period with no new logins publishes it.
//! - **Verification**: periodic presence checks; any silent bank or bad token dissolves the ring.
//! - **Disbandment**: a draining timeout after which registration starts over with a fresh epoch.

pub mod handlers;
pub mod protocol;
pub mod service;
pub mod state;
pub mod types;
