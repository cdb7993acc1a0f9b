use axum::{Json, extract::Extension, http::StatusCode};
use std::sync::Arc;

use super::protocol::{
    DeleteMessagesRequest, EventsRequest, MessageEventsReply, MessageEventsRequest,
    PostDigestsRequest,
};
use super::service::BankService;
use crate::error::{BankResult, reply};
use crate::event::types::{EventObject, MessageEvent};

pub async fn handle_message_events(
    Extension(bank): Extension<Arc<BankService>>,
    Json(req): Json<MessageEventsRequest>,
) -> (StatusCode, Json<BankResult<MessageEventsReply>>) {
    reply(bank.get_message_events(&req.ids))
}

pub async fn handle_post_digests(
    Extension(bank): Extension<Arc<BankService>>,
    Json(req): Json<PostDigestsRequest>,
) -> (StatusCode, Json<BankResult<Vec<MessageEvent>>>) {
    let result = bank.post_message_digest(&req.digests);
    if let Err(e) = &result {
        tracing::debug!("Refused {} digests: {}", req.digests.len(), e);
    }
    reply(result)
}

pub async fn handle_events(
    Extension(bank): Extension<Arc<BankService>>,
    Json(req): Json<EventsRequest>,
) -> (StatusCode, Json<BankResult<Vec<EventObject>>>) {
    reply(bank.get_events(&req.ids))
}

pub async fn handle_delete_messages(
    Extension(bank): Extension<Arc<BankService>>,
    Json(req): Json<DeleteMessagesRequest>,
) -> (StatusCode, Json<BankResult<()>>) {
    reply(bank.delete_messages(&req.ids))
}
