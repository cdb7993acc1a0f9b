//! RPC seams between the processes.
//!
//! `ManagerApi` and `BankApi` are implemented twice: over HTTP with `reqwest`
//! for real deployments, and directly on the in-process services so a whole
//! ring can run inside one runtime.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::bank::protocol::{
    DeleteMessagesRequest, ENDPOINT_DELETE_MESSAGES, ENDPOINT_EVENTS, ENDPOINT_MESSAGE_EVENTS,
    ENDPOINT_POST_DIGESTS, EventsRequest, MessageEventsReply, MessageEventsRequest,
    PostDigestsRequest,
};
use crate::bank::service::BankService;
use crate::config::ClientConfig;
use crate::error::{BankError, BankResult};
use crate::event::types::{EventId, EventObject, MessageDigest, MessageEvent, MessageId};
use crate::membership::protocol::{
    ENDPOINT_CLIENT_SESSION, ENDPOINT_LOGIN, ENDPOINT_PING, LoginRequest, PingRequest,
};
use crate::membership::service::BankManagerService;
use crate::membership::types::{BankId, BankSession, ClientSessionInfo, SessionToken};

#[async_trait]
pub trait ManagerApi: Send + Sync {
    async fn bank_login(&self, bank: &BankId) -> BankResult<BankSession>;

    async fn ping(&self, bank: &BankId, token: &SessionToken) -> BankResult<()>;

    async fn bank_client_session(&self) -> BankResult<ClientSessionInfo>;
}

#[async_trait]
pub trait BankApi: Send + Sync {
    /// Total messages held by the bank plus the events of the `ids` it knows.
    async fn get_message_events(&self, ids: &[MessageId]) -> BankResult<MessageEventsReply>;

    async fn post_message_digest(&self, digests: &[MessageDigest])
    -> BankResult<Vec<MessageEvent>>;

    async fn get_events(&self, ids: &[EventId]) -> BankResult<Vec<EventObject>>;

    async fn delete_messages(&self, ids: &[MessageId]) -> BankResult<()>;
}

/// Turns a bank endpoint from a disposition into something callable.
pub trait BankConnector: Send + Sync {
    fn connect(&self, bank: &BankId) -> Arc<dyn BankApi>;
}

// --- HTTP ---

/// Shared `reqwest` plumbing: JSON bodies, per-call timeout, and retries
/// with exponential backoff and jitter on connection-level failures.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
    attempts: usize,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: config.rpc_timeout(),
            attempts: config.rpc_attempts.max(1),
        }
    }

    async fn post_with_retry<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
    ) -> anyhow::Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..self.attempts {
            let response = self
                .client
                .post(url)
                .json(payload)
                .timeout(self.timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == self.attempts {
                        return Err(anyhow::anyhow!(e));
                    }
                    tracing::debug!("POST {} failed (attempt {}): {}", url, attempt + 1, e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }

    async fn get_with_retry(&self, url: &str) -> anyhow::Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..self.attempts {
            let response = self.client.get(url).timeout(self.timeout).send().await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == self.attempts {
                        return Err(anyhow::anyhow!(e));
                    }
                    tracing::debug!("GET {} failed (attempt {}): {}", url, attempt + 1, e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }

    pub async fn post<T, R>(&self, url: &str, payload: &T) -> BankResult<R>
    where
        T: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .post_with_retry(url, payload)
            .await
            .map_err(BankError::transport)?;
        decode_reply(response).await
    }

    pub async fn get<R: DeserializeOwned>(&self, url: &str) -> BankResult<R> {
        let response = self.get_with_retry(url).await.map_err(BankError::transport)?;
        decode_reply(response).await
    }
}

async fn decode_reply<R: DeserializeOwned>(response: reqwest::Response) -> BankResult<R> {
    let status = response.status();
    response
        .json::<BankResult<R>>()
        .await
        .map_err(|e| BankError::transport(format!("unreadable reply ({}): {}", status, e)))?
}

fn base_url(addr: &str) -> String {
    let trimmed = addr.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

pub struct HttpManagerClient {
    base_url: String,
    transport: HttpTransport,
}

impl HttpManagerClient {
    pub fn new(manager_addr: &str, transport: HttpTransport) -> Self {
        Self {
            base_url: base_url(manager_addr),
            transport,
        }
    }
}

#[async_trait]
impl ManagerApi for HttpManagerClient {
    async fn bank_login(&self, bank: &BankId) -> BankResult<BankSession> {
        let req = LoginRequest { bank: bank.clone() };
        self.transport
            .post(&format!("{}{}", self.base_url, ENDPOINT_LOGIN), &req)
            .await
    }

    async fn ping(&self, bank: &BankId, token: &SessionToken) -> BankResult<()> {
        let req = PingRequest {
            bank: bank.clone(),
            token: *token,
        };
        self.transport
            .post(&format!("{}{}", self.base_url, ENDPOINT_PING), &req)
            .await
    }

    async fn bank_client_session(&self) -> BankResult<ClientSessionInfo> {
        self.transport
            .get(&format!("{}{}", self.base_url, ENDPOINT_CLIENT_SESSION))
            .await
    }
}

pub struct HttpBankClient {
    base_url: String,
    transport: HttpTransport,
}

impl HttpBankClient {
    pub fn new(bank: &BankId, transport: HttpTransport) -> Self {
        Self {
            base_url: base_url(&bank.0),
            transport,
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }
}

#[async_trait]
impl BankApi for HttpBankClient {
    async fn get_message_events(&self, ids: &[MessageId]) -> BankResult<MessageEventsReply> {
        let req = MessageEventsRequest { ids: ids.to_vec() };
        self.transport
            .post(&self.url(ENDPOINT_MESSAGE_EVENTS), &req)
            .await
    }

    async fn post_message_digest(
        &self,
        digests: &[MessageDigest],
    ) -> BankResult<Vec<MessageEvent>> {
        let req = PostDigestsRequest {
            digests: digests.to_vec(),
        };
        self.transport
            .post(&self.url(ENDPOINT_POST_DIGESTS), &req)
            .await
    }

    async fn get_events(&self, ids: &[EventId]) -> BankResult<Vec<EventObject>> {
        let req = EventsRequest { ids: ids.to_vec() };
        self.transport.post(&self.url(ENDPOINT_EVENTS), &req).await
    }

    async fn delete_messages(&self, ids: &[MessageId]) -> BankResult<()> {
        let req = DeleteMessagesRequest { ids: ids.to_vec() };
        self.transport
            .post(&self.url(ENDPOINT_DELETE_MESSAGES), &req)
            .await
    }
}

pub struct HttpConnector {
    transport: HttpTransport,
}

impl HttpConnector {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

impl BankConnector for HttpConnector {
    fn connect(&self, bank: &BankId) -> Arc<dyn BankApi> {
        Arc::new(HttpBankClient::new(bank, self.transport.clone()))
    }
}

// --- In-process ---

#[async_trait]
impl ManagerApi for BankManagerService {
    async fn bank_login(&self, bank: &BankId) -> BankResult<BankSession> {
        BankManagerService::bank_login(self, bank)
    }

    async fn ping(&self, bank: &BankId, token: &SessionToken) -> BankResult<()> {
        BankManagerService::ping(self, bank, token)
    }

    async fn bank_client_session(&self) -> BankResult<ClientSessionInfo> {
        Ok(BankManagerService::bank_client_session(self))
    }
}

#[async_trait]
impl BankApi for BankService {
    async fn get_message_events(&self, ids: &[MessageId]) -> BankResult<MessageEventsReply> {
        BankService::get_message_events(self, ids)
    }

    async fn post_message_digest(
        &self,
        digests: &[MessageDigest],
    ) -> BankResult<Vec<MessageEvent>> {
        BankService::post_message_digest(self, digests)
    }

    async fn get_events(&self, ids: &[EventId]) -> BankResult<Vec<EventObject>> {
        BankService::get_events(self, ids)
    }

    async fn delete_messages(&self, ids: &[MessageId]) -> BankResult<()> {
        BankService::delete_messages(self, ids)
    }
}

/// Connector over a fixed table of in-process banks. Endpoints missing
/// from the table behave as unreachable.
#[derive(Default)]
pub struct StaticConnector {
    banks: DashMap<BankId, Arc<dyn BankApi>>,
}

impl StaticConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, bank: BankId, api: Arc<dyn BankApi>) {
        self.banks.insert(bank, api);
    }
}

impl BankConnector for StaticConnector {
    fn connect(&self, bank: &BankId) -> Arc<dyn BankApi> {
        match self.banks.get(bank) {
            Some(api) => api.value().clone(),
            None => Arc::new(UnreachableBank(bank.clone())),
        }
    }
}

struct UnreachableBank(BankId);

impl UnreachableBank {
    fn error(&self) -> BankError {
        BankError::transport(format!("bank {} is unreachable", self.0))
    }
}

#[async_trait]
impl BankApi for UnreachableBank {
    async fn get_message_events(&self, _ids: &[MessageId]) -> BankResult<MessageEventsReply> {
        Err(self.error())
    }

    async fn post_message_digest(
        &self,
        _digests: &[MessageDigest],
    ) -> BankResult<Vec<MessageEvent>> {
        Err(self.error())
    }

    async fn get_events(&self, _ids: &[EventId]) -> BankResult<Vec<EventObject>> {
        Err(self.error())
    }

    async fn delete_messages(&self, _ids: &[MessageId]) -> BankResult<()> {
        Err(self.error())
    }
}
