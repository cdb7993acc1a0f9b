//! Error taxonomy shared by the manager, the banks and client sessions.
//!
//! `BankError` is what a single RPC can fail with. `RequestResult` is what a
//! fan-out call reports after folding every per-bank outcome together; its
//! code only ever moves towards the worst severity seen.

use axum::{Json, http::StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "code", content = "description")]
pub enum BankError {
    /// Membership is not established yet. Retry later.
    #[error("not ready: {0}")]
    NotReady(String),

    /// The presented session token is stale. The caller must log in again.
    #[error("logout: {0}")]
    Logout(String),

    #[error("implementation error: {0}")]
    Implementation(String),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type BankResult<T> = std::result::Result<T, BankError>;

impl BankError {
    pub fn not_ready(description: impl Into<String>) -> Self {
        Self::NotReady(description.into())
    }

    pub fn logout(description: impl Into<String>) -> Self {
        Self::Logout(description.into())
    }

    pub fn transport(description: impl ToString) -> Self {
        Self::Transport(description.to_string())
    }

    pub fn implementation(description: impl ToString) -> Self {
        Self::Implementation(description.to_string())
    }

    pub fn description(&self) -> &str {
        match self {
            Self::NotReady(d) | Self::Logout(d) | Self::Implementation(d) | Self::Transport(d) => d,
        }
    }

    /// Severity of this failure when folded into a fan-out result.
    /// A stale session seen by a fan-out means the ring is being rebuilt.
    pub fn code(&self) -> RequestResultCode {
        match self {
            Self::NotReady(_) | Self::Logout(_) => RequestResultCode::NotReady,
            Self::Implementation(_) => RequestResultCode::BankError,
            Self::Transport(_) => RequestResultCode::TransportError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Logout(_) => StatusCode::CONFLICT,
            Self::Implementation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Ordered by severity: `Ok < NotReady < BankError < TransportError`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RequestResultCode {
    #[default]
    Ok,
    NotReady,
    BankError,
    TransportError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestResult {
    pub code: RequestResultCode,
    pub description: String,
}

impl RequestResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn new(code: RequestResultCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == RequestResultCode::Ok
    }

    /// Raises the code if `code` is worse. The first description recorded at
    /// the worst level is kept.
    pub fn escalate(&mut self, code: RequestResultCode, description: impl Into<String>) {
        if code > self.code {
            self.code = code;
            self.description = description.into();
        }
    }

    pub fn escalate_error(&mut self, error: &BankError) {
        self.escalate(error.code(), error.description());
    }
}

impl From<BankError> for RequestResult {
    fn from(error: BankError) -> Self {
        Self::new(error.code(), error.description())
    }
}

/// Shapes an RPC outcome into an axum reply. The body always carries the
/// full `Result` so the remote side decodes errors with their kind intact.
pub fn reply<T: Serialize>(result: BankResult<T>) -> (StatusCode, Json<BankResult<T>>) {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status(),
    };
    (status, Json(result))
}
