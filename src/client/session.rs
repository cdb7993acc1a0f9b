//! Client Session
//!
//! The caller-facing view of the ring. A session caches the manager's
//! disposition, fans every request out to all banks and folds the replies
//! into one deterministic answer plus a severity-escalated `RequestResult`.
//!
//! ## Responsibilities
//! - **Refresh**: re-reads the disposition at most once per refresh period, carrying invalidation marks over by endpoint.
//! - **Fan-out**: bounded concurrent tasks (or sequential calls) per bank, merged by lowest bank checksum.
//! - **Placement**: unknown messages go to the least loaded bank that accepts them.
//! - **Invalidation**: banks failing at the transport level are skipped until their timeout passes.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use uuid::Uuid;

use super::tasks::{BankRef, FanOutState, merge_by_key, run_tasks};
use super::transport::{BankConnector, ManagerApi};
use crate::config::ClientConfig;
use crate::error::{BankError, BankResult, RequestResult};
use crate::event::types::{EventId, EventObject, MessageDigest, MessageEvent, MessageId};
use crate::membership::types::{BankId, ClientSessionInfo};

struct SessionView {
    guid: Uuid,
    banks: Vec<BankRef>,
    invalidated: HashMap<BankId, Instant>,
    refreshed_at: Option<Instant>,
    refresh_period: Duration,
    invalidate_timeout: Duration,
}

pub struct BankClientSession {
    manager: Arc<dyn ManagerApi>,
    connector: Arc<dyn BankConnector>,
    pool: Option<Arc<Semaphore>>,
    view: RwLock<SessionView>,
}

impl BankClientSession {
    pub fn new(
        manager: Arc<dyn ManagerApi>,
        connector: Arc<dyn BankConnector>,
        config: &ClientConfig,
    ) -> Self {
        let pool = (config.request_threads > 0)
            .then(|| Arc::new(Semaphore::new(config.request_threads)));
        Self {
            manager,
            connector,
            pool,
            view: RwLock::new(SessionView {
                guid: Uuid::nil(),
                banks: Vec::new(),
                invalidated: HashMap::new(),
                refreshed_at: None,
                refresh_period: Duration::from_millis(config.session_refresh_period_ms),
                invalidate_timeout: Duration::from_millis(config.bank_invalidate_timeout_ms),
            }),
        }
    }

    /// Endpoints of the ring as last seen, in ring order.
    pub fn banks(&self) -> Vec<BankId> {
        self.view.read().banks.iter().map(|b| b.id.clone()).collect()
    }

    pub fn is_invalidated(&self, bank: &BankId) -> bool {
        self.view.read().invalidated.contains_key(bank)
    }

    /// Re-reads the disposition unless the current one is still fresh.
    pub async fn refresh_session(&self) -> BankResult<()> {
        let now = Instant::now();
        {
            let view = self.view.read();
            if let Some(at) = view.refreshed_at
                && now < at + view.refresh_period
            {
                return Ok(());
            }
        }

        let info = self.manager.bank_client_session().await?;
        self.apply(info, now);
        Ok(())
    }

    fn apply(&self, info: ClientSessionInfo, now: Instant) {
        let mut view = self.view.write();
        let disposition = info.disposition;

        if disposition.guid != view.guid || disposition.banks.len() != view.banks.len() {
            tracing::info!(
                "Client session switched to disposition {} with {} banks",
                disposition.guid,
                disposition.banks.len()
            );
        }

        let members: HashSet<&BankId> = disposition.banks.iter().collect();
        view.invalidated.retain(|id, _| members.contains(id));

        view.banks = disposition
            .banks
            .iter()
            .map(|id| BankRef::new(id.clone(), self.connector.connect(id)))
            .collect();
        view.guid = disposition.guid;
        view.refresh_period = Duration::from_millis(info.refresh_period_ms);
        view.invalidate_timeout = Duration::from_millis(info.invalidate_timeout_ms);
        view.refreshed_at = Some(now);
    }

    /// Refreshes (keeping the previous view if the manager cannot be
    /// reached) and splits the ring into banks to ask and banks still
    /// invalidated.
    async fn targets(&self) -> BankResult<(Vec<BankRef>, Vec<BankRef>)> {
        if let Err(e) = self.refresh_session().await {
            tracing::warn!("Client session refresh failed: {}", e);
        }

        let now = Instant::now();
        let view = self.view.read();
        if view.banks.is_empty() {
            return Err(BankError::not_ready("no banks available"));
        }

        let (skipped, usable): (Vec<BankRef>, Vec<BankRef>) =
            view.banks.iter().cloned().partition(|bank| {
                view.invalidated
                    .get(&bank.id)
                    .is_some_and(|&since| since + view.invalidate_timeout > now)
            });
        Ok((usable, skipped))
    }

    /// Invalidates banks whose transport failed and clears banks that
    /// answered.
    fn note_outcomes<V>(&self, state: &FanOutState<V>) {
        if state.transport_failures.is_empty()
            && state
                .replies
                .iter()
                .all(|(bank, _)| !self.is_invalidated(&bank.id))
        {
            return;
        }

        let now = Instant::now();
        let mut view = self.view.write();
        for id in &state.transport_failures {
            tracing::warn!("Invalidating bank {}", id);
            view.invalidated.insert(id.clone(), now);
        }
        for (bank, _) in &state.replies {
            if view.invalidated.remove(&bank.id).is_some() {
                tracing::info!("Bank {} is reachable again", bank.id);
            }
        }
    }

    fn note_failure(&self, bank: &BankRef, error: &BankError) {
        if matches!(error, BankError::Transport(_)) {
            tracing::warn!("Invalidating bank {}", bank.id);
            self.view.write().invalidated.insert(bank.id.clone(), Instant::now());
        }
    }

    fn note_success(&self, bank: &BankRef) {
        if self.view.write().invalidated.remove(&bank.id).is_some() {
            tracing::info!("Bank {} is reachable again", bank.id);
        }
    }

    fn skipped_error(bank: &BankRef) -> BankError {
        BankError::transport(format!("bank {} is invalidated", bank.id))
    }

    /// Places every digest, returning one entry per input in input order.
    /// Entries for messages no bank took keep a nil event id.
    pub async fn post_message_digest(
        &self,
        digests: &[MessageDigest],
    ) -> (RequestResult, Vec<MessageEvent>) {
        if digests.is_empty() {
            return (RequestResult::ok(), Vec::new());
        }

        let (usable, skipped) = match self.targets().await {
            Ok(targets) => targets,
            Err(e) => return (e.into(), unknown_all(digests)),
        };

        let ids: Arc<[MessageId]> = digests.iter().map(|d| d.id).collect();
        let mut state = run_tasks(&usable, self.pool.as_ref(), move |api| {
            let ids = ids.clone();
            async move { api.get_message_events(&ids).await }
        })
        .await;
        for bank in &skipped {
            state.result.escalate_error(&Self::skipped_error(bank));
        }
        self.note_outcomes(&state);

        let mut known = merge_by_key(
            state
                .replies
                .iter()
                .flat_map(|(_, reply)| reply.events.iter().copied())
                .filter(|e| !e.event_id.is_nil()),
            |e| e.message_id,
        );

        if !state.result.is_ok() {
            return (state.result, collect_in_order(digests, &known));
        }

        let mut loads: Vec<(u64, &BankRef)> = state
            .replies
            .iter()
            .map(|(bank, reply)| (reply.message_count, bank))
            .collect();
        loads.sort_by(|a, b| (a.0, a.1.checksum).cmp(&(b.0, b.1.checksum)));

        let mut seen = HashSet::new();
        let unknown: Vec<MessageDigest> = digests
            .iter()
            .filter(|d| !known.contains_key(&d.id) && seen.insert(d.id))
            .cloned()
            .collect();

        let mut result = state.result;
        if !unknown.is_empty() {
            // Refusals only count when no bank takes the batch.
            let mut refusals = RequestResult::ok();
            let mut accepted = false;
            for (_, bank) in loads {
                match bank.api.post_message_digest(&unknown).await {
                    Ok(events) => {
                        self.note_success(bank);
                        tracing::debug!("Bank {} took {} messages", bank.id, events.len());
                        for event in events {
                            known.entry(event.message_id).or_insert(event);
                        }
                        accepted = true;
                        break;
                    }
                    Err(e) => {
                        tracing::debug!("Bank {} refused messages: {}", bank.id, e);
                        self.note_failure(bank, &e);
                        refusals.escalate_error(&e);
                    }
                }
            }
            if !accepted {
                result.escalate(refusals.code, refusals.description);
            }
        }

        (result, collect_in_order(digests, &known))
    }

    /// Events by id from whichever banks hold them, sorted by id.
    pub async fn get_events(&self, ids: &[EventId]) -> (RequestResult, Vec<EventObject>) {
        if ids.is_empty() {
            return (RequestResult::ok(), Vec::new());
        }

        let (usable, skipped) = match self.targets().await {
            Ok(targets) => targets,
            Err(e) => return (e.into(), Vec::new()),
        };

        let ids: Arc<[EventId]> = ids.into();
        let mut state = run_tasks(&usable, self.pool.as_ref(), move |api| {
            let ids = ids.clone();
            async move { api.get_events(&ids).await }
        })
        .await;
        for bank in &skipped {
            state.result.escalate_error(&Self::skipped_error(bank));
        }
        self.note_outcomes(&state);

        let merged = merge_by_key(
            state
                .replies
                .into_iter()
                .flat_map(|(_, events)| events.into_iter()),
            |e| e.id,
        );
        (state.result, merged.into_values().collect())
    }

    pub async fn delete_messages(&self, ids: &[MessageId]) -> RequestResult {
        if ids.is_empty() {
            return RequestResult::ok();
        }

        let (usable, skipped) = match self.targets().await {
            Ok(targets) => targets,
            Err(e) => return e.into(),
        };

        let ids: Arc<[MessageId]> = ids.into();
        let mut state = run_tasks(&usable, self.pool.as_ref(), move |api| {
            let ids = ids.clone();
            async move { api.delete_messages(&ids).await }
        })
        .await;
        for bank in &skipped {
            state.result.escalate_error(&Self::skipped_error(bank));
        }
        self.note_outcomes(&state);
        state.result
    }
}

fn unknown_all(digests: &[MessageDigest]) -> Vec<MessageEvent> {
    digests.iter().map(|d| MessageEvent::unknown(d.id)).collect()
}

fn collect_in_order(
    digests: &[MessageDigest],
    known: &std::collections::BTreeMap<MessageId, MessageEvent>,
) -> Vec<MessageEvent> {
    digests
        .iter()
        .map(|d| {
            known
                .get(&d.id)
                .copied()
                .unwrap_or_else(|| MessageEvent::unknown(d.id))
        })
        .collect()
}
