use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::state::DispositionStateMachine;
use super::types::{
    BankId, BankSession, ClientSessionInfo, DispositionSnapshot, ManagerPhase, SessionToken,
};
use crate::config::{ClientConfig, ManagerConfig};
use crate::error::BankResult;

/// The manager process: owns the disposition state machine and the timer
/// task that drives it.
pub struct BankManagerService {
    state: Mutex<DispositionStateMachine>,
    client: ClientConfig,
    wake: Notify,
}

impl BankManagerService {
    pub fn new(config: ManagerConfig, client: ClientConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DispositionStateMachine::new(config, Instant::now())),
            client,
            wake: Notify::new(),
        })
    }

    pub async fn start(self: Arc<Self>) {
        tracing::info!("Starting bank manager...");

        let service = self.clone();
        tokio::spawn(async move {
            service.timer_loop().await;
        });

        tracing::info!("Manager timer started in phase: {}", self.phase());
    }

    pub fn phase(&self) -> ManagerPhase {
        self.state.lock().phase()
    }

    pub fn snapshot(&self) -> DispositionSnapshot {
        self.state.lock().snapshot()
    }

    pub fn bank_login(&self, bank: &BankId) -> BankResult<BankSession> {
        let result = self.state.lock().login(bank, Instant::now());
        self.wake.notify_one();
        result
    }

    pub fn ping(&self, bank: &BankId, token: &SessionToken) -> BankResult<()> {
        let result = self.state.lock().ping(bank, token, Instant::now());
        self.wake.notify_one();
        result
    }

    /// Disposition snapshot plus the client tuning sessions should use.
    pub fn bank_client_session(&self) -> ClientSessionInfo {
        ClientSessionInfo {
            disposition: self.snapshot(),
            refresh_period_ms: self.client.session_refresh_period_ms,
            invalidate_timeout_ms: self.client.bank_invalidate_timeout_ms,
        }
    }

    /// Sleeps until the state's next deadline, or until an RPC may have
    /// moved it, then lets the state machine catch up.
    async fn timer_loop(self: Arc<Self>) {
        loop {
            let deadline = self.state.lock().next_deadline();

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = self.wake.notified() => continue,
            }

            let mut state = self.state.lock();
            let before = state.phase();
            state.on_timer(Instant::now());
            let after = state.phase();
            drop(state);

            if before != after {
                tracing::info!("Manager phase: {} -> {}", before, after);
            }
        }
    }
}
