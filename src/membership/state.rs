//! The manager's disposition state machine.
//!
//! Pure and synchronous: every entry point takes the current instant, so the
//! service can drive it from RPC handlers and one timer task while tests
//! drive it with hand-picked instants.

use std::collections::BTreeSet;
use tokio::time::Instant;
use uuid::Uuid;

use super::types::{BankId, BankInfo, BankSession, DispositionSnapshot, ManagerPhase, SessionToken};
use crate::config::ManagerConfig;
use crate::error::{BankError, BankResult};

/// A frozen ring. Position in `banks` is the ring index.
#[derive(Debug, Clone)]
pub struct Disposition {
    guid: Uuid,
    banks: Vec<BankInfo>,
}

impl Disposition {
    /// Freezes `members` in lexicographic endpoint order.
    fn freeze(guid: Uuid, members: &BTreeSet<BankId>) -> Self {
        let banks = members
            .iter()
            .map(|id| BankInfo {
                id: id.clone(),
                last_seen: None,
            })
            .collect();
        Self { guid, banks }
    }

    fn position(&self, bank: &BankId) -> Option<usize> {
        self.banks.iter().position(|b| &b.id == bank)
    }

    fn session(&self, index: usize) -> BankSession {
        let size = self.banks.len();
        let (left, right) = if size > 1 {
            let left = (index + size - 1) % size;
            let right = (index + 1) % size;
            (
                Some(self.banks[left].id.clone()),
                Some(self.banks[right].id.clone()),
            )
        } else {
            (None, None)
        };

        BankSession {
            token: SessionToken {
                guid: self.guid,
                index: index as u32,
                size: size as u32,
            },
            left,
            right,
        }
    }

    /// Ring index of `bank` if `token` matches this epoch and position.
    fn check_token(&self, bank: &BankId, token: &SessionToken) -> Result<usize, &'static str> {
        if token.guid != self.guid {
            return Err("stale registration");
        }
        if token.size as usize != self.banks.len() {
            return Err("ring size mismatch");
        }
        let index = token.index as usize;
        if index >= self.banks.len() {
            return Err("ring index out of range");
        }
        if &self.banks[index].id != bank {
            return Err("bank position mismatch");
        }
        Ok(index)
    }

    pub fn snapshot(&self) -> DispositionSnapshot {
        DispositionSnapshot {
            guid: self.guid,
            banks: self.banks.iter().map(|b| b.id.clone()).collect(),
        }
    }

    pub fn banks(&self) -> &[BankInfo] {
        &self.banks
    }
}

#[derive(Debug)]
enum ManagerState {
    /// Without a disposition the set is still gathering; with one, the
    /// frozen ring is waiting for its members to log in.
    Registering {
        guid: Uuid,
        candidates: BTreeSet<BankId>,
        disposition: Option<Disposition>,
        window_end: Instant,
    },
    Verification {
        disposition: Disposition,
        next_check: Instant,
    },
    Disbandment {
        reset_at: Instant,
    },
}

pub struct DispositionStateMachine {
    config: ManagerConfig,
    state: ManagerState,
}

impl DispositionStateMachine {
    pub fn new(config: ManagerConfig, now: Instant) -> Self {
        let state = Self::registering(&config, now);
        Self { config, state }
    }

    fn registering(config: &ManagerConfig, now: Instant) -> ManagerState {
        ManagerState::Registering {
            guid: Uuid::new_v4(),
            candidates: BTreeSet::new(),
            disposition: None,
            window_end: now + config.registration_timeout(),
        }
    }

    pub fn phase(&self) -> ManagerPhase {
        match &self.state {
            ManagerState::Registering {
                disposition: None, ..
            } => ManagerPhase::Gathering,
            ManagerState::Registering { .. } => ManagerPhase::LoggingIn,
            ManagerState::Verification { .. } => ManagerPhase::Verification,
            ManagerState::Disbandment { .. } => ManagerPhase::Disbandment,
        }
    }

    /// When `on_timer` next has something to do.
    pub fn next_deadline(&self) -> Instant {
        match &self.state {
            ManagerState::Registering { window_end, .. } => *window_end,
            ManagerState::Verification { next_check, .. } => *next_check,
            ManagerState::Disbandment { reset_at } => *reset_at,
        }
    }

    /// Current ring as handed to client sessions. Empty unless verified.
    pub fn snapshot(&self) -> DispositionSnapshot {
        match &self.state {
            ManagerState::Verification { disposition, .. } => disposition.snapshot(),
            ManagerState::Registering { guid, .. } => DispositionSnapshot {
                guid: *guid,
                banks: Vec::new(),
            },
            ManagerState::Disbandment { .. } => DispositionSnapshot::default(),
        }
    }

    pub fn disposition(&self) -> Option<&Disposition> {
        match &self.state {
            ManagerState::Registering { disposition, .. } => disposition.as_ref(),
            ManagerState::Verification { disposition, .. } => Some(disposition),
            ManagerState::Disbandment { .. } => None,
        }
    }

    pub fn login(&mut self, bank: &BankId, now: Instant) -> BankResult<BankSession> {
        let registration_timeout = self.config.registration_timeout();

        match &mut self.state {
            ManagerState::Registering {
                candidates,
                disposition: None,
                window_end,
                ..
            } => {
                if candidates.insert(bank.clone()) {
                    *window_end = now + registration_timeout;
                    tracing::info!(
                        "Bank {} registered ({} banks gathered)",
                        bank,
                        candidates.len()
                    );
                }
                Err(BankError::not_ready("still waiting for others"))
            }

            ManagerState::Registering {
                disposition: Some(disposition),
                window_end,
                ..
            } => match disposition.position(bank) {
                Some(index) => {
                    disposition.banks[index].last_seen = Some(now);
                    *window_end = now + registration_timeout;
                    let session = disposition.session(index);
                    tracing::info!(
                        "Bank {} logged in at ring index {}/{}",
                        bank,
                        index,
                        session.token.size
                    );
                    Ok(session)
                }
                None => {
                    tracing::warn!("Unknown bank {} appeared, restarting registration", bank);
                    self.restart_gathering(now, Some(bank));
                    Err(BankError::not_ready("new bank appeared"))
                }
            },

            ManagerState::Verification { .. } => {
                tracing::warn!("Bank {} logged in while disposition was verified", bank);
                self.breakdown(now);
                Err(BankError::not_ready("disposition breakdown"))
            }

            ManagerState::Disbandment { .. } => Err(BankError::not_ready("disbanding")),
        }
    }

    pub fn ping(&mut self, bank: &BankId, token: &SessionToken, now: Instant) -> BankResult<()> {
        let registration_timeout = self.config.registration_timeout();
        let reset_timeout = self.config.reset_timeout();

        match &mut self.state {
            ManagerState::Registering {
                disposition: None,
                window_end,
                ..
            } => {
                *window_end = now + registration_timeout;
                Err(BankError::logout("registration in progress"))
            }

            ManagerState::Registering {
                disposition: Some(disposition),
                ..
            } => match disposition.check_token(bank, token) {
                Ok(index) => {
                    disposition.banks[index].last_seen = Some(now);
                    Ok(())
                }
                Err(reason) => {
                    tracing::warn!("Bank {} pinged with bad token: {}", bank, reason);
                    self.restart_gathering(now, None);
                    Err(BankError::logout(reason))
                }
            },

            ManagerState::Verification { disposition, .. } => {
                match disposition.check_token(bank, token) {
                    Ok(index) => {
                        disposition.banks[index].last_seen = Some(now);
                        tracing::trace!("Ping from {}", bank);
                        Ok(())
                    }
                    Err(reason) => {
                        tracing::warn!("Bank {} pinged with bad token: {}", bank, reason);
                        self.breakdown(now);
                        Err(BankError::logout(reason))
                    }
                }
            }

            ManagerState::Disbandment { reset_at } => {
                *reset_at = now + reset_timeout;
                Err(BankError::logout("disbanding"))
            }
        }
    }

    /// Runs whatever the current state has scheduled for `now` or earlier.
    pub fn on_timer(&mut self, now: Instant) {
        if now < self.next_deadline() {
            return;
        }

        let registration_timeout = self.config.registration_timeout();
        let poll_timeout = self.config.presence_poll_timeout();
        let check_period = self.config.presence_check_period();

        match &mut self.state {
            ManagerState::Registering {
                guid,
                candidates,
                disposition,
                window_end,
            } => match disposition.take() {
                None if candidates.is_empty() => {
                    *window_end = now + registration_timeout;
                }
                None => {
                    let frozen = Disposition::freeze(*guid, candidates);
                    tracing::info!(
                        "Registration window closed with {} banks, waiting for logins",
                        frozen.banks.len()
                    );
                    *disposition = Some(frozen);
                    *window_end = now + registration_timeout;
                }
                Some(mut frozen) => {
                    for bank in frozen.banks.iter_mut() {
                        bank.last_seen.get_or_insert(now);
                    }
                    tracing::info!(
                        "Disposition {} established with {} banks",
                        frozen.guid,
                        frozen.banks.len()
                    );
                    self.state = ManagerState::Verification {
                        disposition: frozen,
                        next_check: now + check_period,
                    };
                }
            },

            ManagerState::Verification {
                disposition,
                next_check,
            } => {
                let vanished = disposition.banks.iter().find(|bank| {
                    bank.last_seen
                        .is_none_or(|seen| seen + poll_timeout < now)
                });
                match vanished {
                    Some(bank) => {
                        tracing::warn!("Bank {} stopped pinging", bank.id);
                        self.breakdown(now);
                    }
                    None => *next_check = now + check_period,
                }
            }

            ManagerState::Disbandment { .. } => {
                tracing::info!("Disbandment finished, registering banks again");
                self.state = Self::registering(&self.config, now);
            }
        }
    }

    /// Drops the frozen ring and starts a fresh epoch. A newcomer that
    /// triggered the restart is gathered right away.
    fn restart_gathering(&mut self, now: Instant, newcomer: Option<&BankId>) {
        let mut state = Self::registering(&self.config, now);
        if let (Some(bank), ManagerState::Registering { candidates, .. }) = (newcomer, &mut state) {
            candidates.insert(bank.clone());
        }
        self.state = state;
    }

    fn breakdown(&mut self, now: Instant) {
        tracing::info!("Disposition breakdown, disbanding");
        self.state = ManagerState::Disbandment {
            reset_at: now + self.config.reset_timeout(),
        };
    }
}
