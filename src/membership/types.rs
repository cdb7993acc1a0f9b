use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;
use uuid::Uuid;

/// A bank's identity: the endpoint it serves its RPCs on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BankId(pub String);

impl BankId {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self(endpoint.into())
    }

    /// Stable checksum of the endpoint, used to break ties between banks.
    pub fn checksum(&self) -> u32 {
        crate::checksum::fnv1a32(self.0.as_bytes())
    }
}

impl fmt::Display for BankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A ring member as the manager tracks it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankInfo {
    pub id: BankId,

    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

/// Proof of a bank's ring position within one disposition epoch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionToken {
    pub guid: Uuid,
    pub index: u32,
    pub size: u32,
}

/// What a bank receives on a successful login.
///
/// Neighbours are absent in a single-bank ring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BankSession {
    pub token: SessionToken,
    pub left: Option<BankId>,
    pub right: Option<BankId>,
}

/// Ordered bank endpoints of one disposition epoch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DispositionSnapshot {
    pub guid: Uuid,
    pub banks: Vec<BankId>,
}

/// Everything a client session needs to start talking to the ring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientSessionInfo {
    pub disposition: DispositionSnapshot,
    pub refresh_period_ms: u64,
    pub invalidate_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ManagerPhase {
    Gathering,
    LoggingIn,
    Verification,
    Disbandment,
}

impl fmt::Display for ManagerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gathering => "registering banks (gathering)",
            Self::LoggingIn => "registering banks (logging in)",
            Self::Verification => "disposition verification",
            Self::Disbandment => "disposition disbandment",
        };
        f.write_str(name)
    }
}
