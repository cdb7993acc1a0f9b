//! Manager Network Protocol
//!
//! Endpoints and request bodies banks and client sessions use to reach the
//! manager. Every reply body is a JSON `Result` whose error side is a
//! `BankError`.

use serde::{Deserialize, Serialize};

use super::types::{BankId, SessionToken};

// --- API Endpoints ---

/// Bank asks for its ring position.
pub const ENDPOINT_LOGIN: &str = "/manager/login";
/// Bank proves liveness with its session token.
pub const ENDPOINT_PING: &str = "/manager/ping";
/// Any caller fetches the current disposition for a client session.
pub const ENDPOINT_CLIENT_SESSION: &str = "/manager/client_session";

// --- Data Transfer Objects ---

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub bank: BankId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingRequest {
    pub bank: BankId,
    pub token: SessionToken,
}
