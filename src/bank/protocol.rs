use serde::{Deserialize, Serialize};

use crate::event::types::{EventId, MessageDigest, MessageEvent, MessageId};

pub const ENDPOINT_MESSAGE_EVENTS: &str = "/bank/message_events";
pub const ENDPOINT_POST_DIGESTS: &str = "/bank/post_digests";
pub const ENDPOINT_EVENTS: &str = "/bank/events";
pub const ENDPOINT_DELETE_MESSAGES: &str = "/bank/delete_messages";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEventsRequest {
    pub ids: Vec<MessageId>,
}

/// A bank's load and what it knows about the requested messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEventsReply {
    pub message_count: u64,
    pub events: Vec<MessageEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDigestsRequest {
    pub digests: Vec<MessageDigest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsRequest {
    pub ids: Vec<EventId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteMessagesRequest {
    pub ids: Vec<MessageId>,
}
