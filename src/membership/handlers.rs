use axum::{Json, extract::Extension, http::StatusCode};
use std::sync::Arc;

use super::protocol::{LoginRequest, PingRequest};
use super::service::BankManagerService;
use super::types::{BankSession, ClientSessionInfo};
use crate::error::{BankResult, reply};

pub async fn handle_login(
    Extension(manager): Extension<Arc<BankManagerService>>,
    Json(req): Json<LoginRequest>,
) -> (StatusCode, Json<BankResult<BankSession>>) {
    let result = manager.bank_login(&req.bank);
    if let Err(e) = &result {
        tracing::debug!("Login of {} refused: {}", req.bank, e);
    }
    reply(result)
}

pub async fn handle_ping(
    Extension(manager): Extension<Arc<BankManagerService>>,
    Json(req): Json<PingRequest>,
) -> (StatusCode, Json<BankResult<()>>) {
    reply(manager.ping(&req.bank, &req.token))
}

pub async fn handle_client_session(
    Extension(manager): Extension<Arc<BankManagerService>>,
) -> (StatusCode, Json<BankResult<ClientSessionInfo>>) {
    reply(Ok(manager.bank_client_session()))
}
