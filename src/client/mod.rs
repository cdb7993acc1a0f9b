//! Client Module
//!
//! Everything a caller needs to talk to the ring: the RPC seams to the
//! manager and the banks, the fan-out plumbing, and the session that turns a
//! request into one call per bank and one merged answer.
//!
//! ## Core Mechanisms
//! - **Fan-out**: each request goes to every live bank; replies are merged by lowest bank checksum so the answer never depends on arrival order.
//! - **Placement**: a message no bank knows is posted to the least loaded bank willing to take it.
//! - **Escalation**: per-bank failures fold into one `RequestResult` whose code only grows in severity.

pub mod session;
pub mod tasks;
pub mod transport;
