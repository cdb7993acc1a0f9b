//! Per-call fan-out plumbing.
//!
//! Each per-bank task folds its reply into a shared accumulator under a
//! mutex; the caller waits until every task has reported. Replies are merged
//! by bank checksum afterwards, so the outcome never depends on the order in
//! which banks answered.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::transport::BankApi;
use crate::error::{BankError, BankResult, RequestResult};
use crate::membership::types::BankId;

/// A ring member as a client session addresses it.
#[derive(Clone)]
pub struct BankRef {
    pub id: BankId,
    pub checksum: u32,
    pub api: Arc<dyn BankApi>,
}

impl BankRef {
    pub fn new(id: BankId, api: Arc<dyn BankApi>) -> Self {
        Self {
            checksum: id.checksum(),
            id,
            api,
        }
    }
}

pub struct FanOutState<V> {
    pub result: RequestResult,
    pub replies: Vec<(BankRef, V)>,
    pub transport_failures: Vec<BankId>,
    pub completed: usize,
}

/// Shared sink of one fan-out call.
pub struct FanOut<V> {
    state: Mutex<FanOutState<V>>,
}

impl<V> FanOut<V> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FanOutState {
                result: RequestResult::ok(),
                replies: Vec::new(),
                transport_failures: Vec::new(),
                completed: 0,
            }),
        }
    }

    pub fn record(&self, bank: &BankRef, reply: BankResult<V>) {
        let mut state = self.state.lock();
        state.completed += 1;
        match reply {
            Ok(value) => state.replies.push((bank.clone(), value)),
            Err(e) => {
                tracing::debug!("Bank {} failed: {}", bank.id, e);
                if matches!(e, BankError::Transport(_)) {
                    state.transport_failures.push(bank.id.clone());
                }
                state.result.escalate_error(&e);
            }
        }
    }

    /// Counts a bank that was not asked at all.
    pub fn skip(&self, bank: &BankRef, error: BankError) {
        self.record(bank, Err(error));
    }

    pub fn completed(&self) -> usize {
        self.state.lock().completed
    }

    /// Takes the folded outcome, replies ordered by bank checksum. Banks
    /// that never reported out of `total` count as failed.
    pub fn finish(&self, total: usize) -> FanOutState<V> {
        let mut state = self.state.lock();
        let mut done = FanOutState {
            result: std::mem::take(&mut state.result),
            replies: std::mem::take(&mut state.replies),
            transport_failures: std::mem::take(&mut state.transport_failures),
            completed: state.completed,
        };
        drop(state);

        if done.completed < total {
            done.result.escalate_error(&BankError::implementation(format!(
                "{} bank requests did not complete",
                total - done.completed
            )));
        }
        done.replies
            .sort_by(|(a, _), (b, _)| (a.checksum, &a.id).cmp(&(b.checksum, &b.id)));
        done
    }
}

impl<V> Default for FanOut<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `call` against every bank and folds the replies into one `FanOut`.
///
/// With a pool each call is a spawned task gated by the semaphore; without
/// one the calls run one after another on the caller.
pub async fn run_tasks<V, F, Fut>(
    banks: &[BankRef],
    pool: Option<&Arc<Semaphore>>,
    call: F,
) -> FanOutState<V>
where
    V: Send + 'static,
    F: Fn(Arc<dyn BankApi>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = BankResult<V>> + Send + 'static,
{
    let fan_out = Arc::new(FanOut::new());

    match pool {
        None => {
            for bank in banks {
                let reply = call(bank.api.clone()).await;
                fan_out.record(bank, reply);
            }
        }
        Some(pool) => {
            let mut tasks = JoinSet::new();
            for bank in banks.iter().cloned() {
                let call = call.clone();
                let pool = pool.clone();
                let sink = fan_out.clone();
                tasks.spawn(async move {
                    let reply = match pool.acquire_owned().await {
                        Ok(_permit) => call(bank.api.clone()).await,
                        Err(_) => Err(BankError::implementation("request pool closed")),
                    };
                    sink.record(&bank, reply);
                });
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!("Bank request task failed: {}", e);
                }
            }
        }
    }

    fan_out.finish(banks.len())
}

/// Keeps one value per key, preferring the reply of the bank with the lower
/// checksum. `replies` must already be ordered by checksum.
pub fn merge_by_key<K, V, I>(replies: I, key: impl Fn(&V) -> K) -> BTreeMap<K, V>
where
    K: Ord,
    I: IntoIterator<Item = V>,
{
    let mut merged = BTreeMap::new();
    for value in replies {
        merged.entry(key(&value)).or_insert(value);
    }
    merged
}
