//! Bank Process
//!
//! Holds one shard of the event space. A bank logs in to the manager, keeps
//! its session alive with periodic pings, and serves the client RPCs only
//! while it holds a valid ring position.
//!
//! ## Responsibilities
//! - **Session**: login retries while `LoggingIn`, pings while `Active`; a `Logout` reply drops back to `LoggingIn`.
//! - **Events**: message insertion, lookups and deletion through the `EventManager`.
//! - **Restore**: events and member digests saved by a previous run are reloaded on construction.
//! - **Maintenance**: periodic merge pass, expiration, persistence of dirty events, word-pair counter flushes and expiry.

use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::manager::{EventManager, InsertOutcome, MergeReport, MessageAdjuster, NoAdjustment};
use super::protocol::MessageEventsReply;
use crate::client::transport::ManagerApi;
use crate::config::BankConfig;
use crate::error::{BankError, BankResult};
use crate::event::types::{EventId, EventObject, MessageDigest, MessageEvent, MessageId};
use crate::membership::types::{BankId, BankSession};
use crate::storage::cache::WriteBackCounter;
use crate::storage::counter::{BUCKET_SECONDS, CounterStore, MemoryCounterStore, WordPairKey};
use crate::storage::events::EventStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    LoggingIn,
    Active(BankSession),
}

pub struct BankService {
    id: BankId,
    config: BankConfig,
    manager: Arc<dyn ManagerApi>,
    session: RwLock<SessionState>,
    events: Mutex<EventManager>,
    word_pairs: WriteBackCounter<MemoryCounterStore>,
    store: Arc<dyn EventStore>,
}

impl BankService {
    pub fn new(
        id: BankId,
        config: BankConfig,
        manager: Arc<dyn ManagerApi>,
        store: Arc<dyn EventStore>,
    ) -> Arc<Self> {
        Self::new_with_adjuster(id, config, manager, store, Box::new(NoAdjustment))
    }

    pub fn new_with_adjuster(
        id: BankId,
        config: BankConfig,
        manager: Arc<dyn ManagerApi>,
        store: Arc<dyn EventStore>,
        adjuster: Box<dyn MessageAdjuster>,
    ) -> Arc<Self> {
        let word_pairs = WriteBackCounter::new(
            Arc::new(MemoryCounterStore::new()),
            config.word_pair_cache_capacity,
        );
        let events = EventManager::with_adjuster(config.clone(), adjuster);
        let service = Arc::new(Self {
            id,
            events: Mutex::new(events),
            config,
            manager,
            session: RwLock::new(SessionState::LoggingIn),
            word_pairs,
            store,
        });
        service.restore();
        service
    }

    /// Reloads whatever the store holds from a previous run. Digests no
    /// event claims are dropped from the store.
    fn restore(&self) {
        let (events, digests) = match (self.store.load_all(), self.store.load_messages()) {
            (Ok(events), Ok(digests)) => (events, digests),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!("Bank {} starts empty, stored state unreadable: {}", self.id, e);
                return;
            }
        };
        if events.is_empty() && digests.is_empty() {
            return;
        }

        let stored_ids: Vec<MessageId> = digests.iter().map(|d| d.id).collect();
        let restored = self.events.lock().restore(events, digests);

        let kept: HashSet<MessageId> = restored.iter().map(|d| d.id).collect();
        for id in stored_ids.into_iter().filter(|id| !kept.contains(id)) {
            self.store.remove_message(id);
        }
        for digest in &restored {
            self.count_pairs(digest, 1);
        }
        tracing::info!("Bank {} restored {} messages", self.id, restored.len());
    }

    /// Spawns the session and maintenance loops and returns immediately.
    pub async fn start(self: Arc<Self>) {
        tracing::info!("Starting bank {}", self.id);

        let session = self.clone();
        tokio::spawn(async move {
            session.session_loop().await;
        });

        let maintenance = self.clone();
        tokio::spawn(async move {
            maintenance.maintenance_loop().await;
        });
    }

    pub fn id(&self) -> &BankId {
        &self.id
    }

    pub fn session(&self) -> SessionState {
        self.session.read().clone()
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.session.read(), SessionState::Active(_))
    }

    pub async fn login_once(&self) -> BankResult<BankSession> {
        let session = self.manager.bank_login(&self.id).await?;
        tracing::info!(
            "Bank {} active at ring index {}/{} (left: {:?}, right: {:?})",
            self.id,
            session.token.index,
            session.token.size,
            session.left.as_ref().map(|b| b.0.as_str()),
            session.right.as_ref().map(|b| b.0.as_str()),
        );
        *self.session.write() = SessionState::Active(session.clone());
        Ok(session)
    }

    pub async fn ping_once(&self) -> BankResult<()> {
        let token = match &*self.session.read() {
            SessionState::Active(session) => session.token,
            SessionState::LoggingIn => return Err(BankError::not_ready("not logged in")),
        };

        let result = self.manager.ping(&self.id, &token).await;
        if let Err(BankError::Logout(reason)) = &result {
            tracing::info!("Bank {} logged out by manager: {}", self.id, reason);
            let mut session = self.session.write();
            // A concurrent login may already hold a newer token.
            if matches!(&*session, SessionState::Active(s) if s.token == token) {
                *session = SessionState::LoggingIn;
            }
        }
        result
    }

    async fn session_loop(&self) {
        loop {
            if self.is_active() {
                tokio::time::sleep(self.config.ping_period()).await;
                match self.ping_once().await {
                    Ok(()) => tracing::trace!("Ping from {} accepted", self.id),
                    Err(BankError::Logout(_)) => {}
                    Err(e) => tracing::warn!("Ping from {} failed: {}", self.id, e),
                }
            } else {
                match self.login_once().await {
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::debug!("Login of {} pending: {}", self.id, e);
                        tokio::time::sleep(self.config.login_retry_period()).await;
                    }
                }
            }
        }
    }

    async fn maintenance_loop(&self) {
        let mut interval = tokio::time::interval(self.config.merge_period());
        interval.tick().await;

        loop {
            interval.tick().await;
            self.run_maintenance();
        }
    }

    /// Merge pass, expiration, then persistence of everything that changed.
    pub fn run_maintenance(&self) -> MergeReport {
        let oldest_kept = now_secs().saturating_sub(self.config.message_expiration_secs);

        let (report, expired, dirty, removed) = {
            let mut events = self.events.lock();
            let expired = events.expire(oldest_kept);
            let report = events.merge_events();
            let (dirty, removed) = events.take_dirty();
            (report, expired, dirty, removed)
        };

        for digest in &expired {
            self.count_pairs(digest, -1);
            self.store.remove_message(digest.id);
        }

        for event in &dirty {
            if let Err(e) = self.store.save(event) {
                tracing::error!("Failed to persist event {}: {}", event.id, e);
            }
        }
        for id in &removed {
            self.store.remove(id);
        }

        let flushed = self.word_pairs.flush();
        let dropped_days = self
            .word_pairs
            .backend()
            .expire_before((oldest_kept / BUCKET_SECONDS) as u32);
        tracing::debug!(
            "Bank {} maintenance: {} merged, {} ejected, {} saved, {} removed, {} counters flushed, {} days dropped, {} counters live",
            self.id,
            report.merged,
            report.ejected,
            dirty.len(),
            removed.len(),
            flushed,
            dropped_days,
            self.word_pairs.backend().key_count()
        );
        report
    }

    fn ensure_active(&self) -> BankResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(BankError::not_ready("bank is logging in"))
        }
    }

    pub fn get_message_events(&self, ids: &[MessageId]) -> BankResult<MessageEventsReply> {
        self.ensure_active()?;
        let events = self.events.lock();
        Ok(MessageEventsReply {
            message_count: events.message_count() as u64,
            events: events.get_message_events(ids),
        })
    }

    /// Inserts every digest and returns the event of each accepted one.
    pub fn post_message_digest(&self, digests: &[MessageDigest]) -> BankResult<Vec<MessageEvent>> {
        self.ensure_active()?;
        let now = now_secs();

        let mut placed = Vec::with_capacity(digests.len());
        let mut inserted = Vec::new();
        {
            let mut events = self.events.lock();
            for digest in digests {
                let outcome = events.insert(digest.clone(), now);
                if let InsertOutcome::Inserted(event) = outcome
                    && let Some(stored) = events.message_digest(event.message_id)
                {
                    inserted.push(stored);
                }
                if let Some(event) = outcome.event() {
                    placed.push(event);
                }
            }
        }

        for digest in &inserted {
            self.count_pairs(digest, 1);
            if let Err(e) = self.store.save_message(digest) {
                tracing::error!("Failed to persist message {}: {}", digest.id, e);
            }
        }
        tracing::debug!("Bank {} placed {}/{} digests", self.id, placed.len(), digests.len());
        Ok(placed)
    }

    pub fn get_events(&self, ids: &[EventId]) -> BankResult<Vec<EventObject>> {
        self.ensure_active()?;
        Ok(self.events.lock().get_events(ids))
    }

    pub fn delete_messages(&self, ids: &[MessageId]) -> BankResult<()> {
        self.ensure_active()?;
        let removed = self.events.lock().delete_messages(ids);
        for digest in &removed {
            self.count_pairs(digest, -1);
            self.store.remove_message(digest.id);
        }
        if !removed.is_empty() {
            tracing::debug!("Bank {} deleted {} messages", self.id, removed.len());
        }
        Ok(())
    }

    pub fn word_pair_count(&self, key: &WordPairKey) -> i64 {
        self.word_pairs.get(key)
    }

    /// Day buckets the word-pair counters still hold.
    pub fn word_pair_days(&self) -> usize {
        self.word_pairs.backend().bucket_count()
    }

    pub fn dump_events(&self) -> String {
        self.events.lock().dump()
    }

    /// Pairs the leading core word with each of the others.
    fn count_pairs(&self, digest: &MessageDigest, delta: i64) {
        let mut words = digest.core_words.iter().copied();
        let Some(first) = words.next() else {
            return;
        };
        for second in words.filter(|&w| w != first) {
            self.word_pairs
                .add(WordPairKey::new(digest.lang, digest.published, first, second), delta);
        }
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
