//! Process configuration.
//!
//! Every section has working defaults; a JSON file passed with `--config`
//! overrides any subset of fields. Durations are milliseconds unless the
//! field name says otherwise.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::similarity::MergeParams;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub manager: ManagerConfig,
    pub client: ClientConfig,
    pub bank: BankConfig,
}

impl ClusterConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let config: ClusterConfig = serde_json::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?;
                tracing::info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }
}

/// Timings of the disposition state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Quiet period that closes a registration window.
    pub registration_timeout_ms: u64,
    /// A bank silent for longer than this is considered gone.
    pub presence_poll_timeout_ms: u64,
    pub presence_check_period_ms: u64,
    /// How long a disbandment drains before registration starts over.
    pub reset_timeout_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            registration_timeout_ms: 5_000,
            presence_poll_timeout_ms: 15_000,
            presence_check_period_ms: 5_000,
            reset_timeout_ms: 10_000,
        }
    }
}

impl ManagerConfig {
    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }

    pub fn presence_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.presence_poll_timeout_ms)
    }

    pub fn presence_check_period(&self) -> Duration {
        Duration::from_millis(self.presence_check_period_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Client session tuning, handed out by the manager with every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub session_refresh_period_ms: u64,
    pub bank_invalidate_timeout_ms: u64,
    /// Concurrent per-bank tasks. Zero runs fan-outs sequentially.
    pub request_threads: usize,
    pub rpc_timeout_ms: u64,
    pub rpc_attempts: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            session_refresh_period_ms: 10_000,
            bank_invalidate_timeout_ms: 30_000,
            request_threads: 4,
            rpc_timeout_ms: 2_000,
            rpc_attempts: 3,
        }
    }
}

impl ClientConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

/// Hard limits on what the banks may merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeLimits {
    /// Absolute overlap floor, regardless of the adaptive level.
    pub merge_level_min: u32,
    /// Strain above which an event needs dissenter cleanup and stops merging.
    pub max_strain: u32,
    pub max_time_range_secs: u64,
    pub max_size: u32,
    pub max_time_diff_secs: u64,
    /// Events smaller than this are not offered as merge candidates.
    pub min_size: u32,
}

impl Default for MergeLimits {
    fn default() -> Self {
        Self {
            merge_level_min: 25,
            max_strain: 30,
            max_time_range_secs: 3 * 86_400,
            max_size: 1_000,
            max_time_diff_secs: 2 * 86_400,
            min_size: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankConfig {
    pub ping_period_ms: u64,
    pub login_retry_period_ms: u64,
    pub merge_period_ms: u64,
    pub max_core_words: usize,
    pub max_event_words: usize,
    pub respect_most_frequent: bool,
    /// Digests published longer ago than this are ignored.
    pub message_expiration_secs: u64,
    pub word_pair_cache_capacity: usize,
    pub merge: MergeParams,
    pub limits: MergeLimits,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            ping_period_ms: 3_000,
            login_retry_period_ms: 2_000,
            merge_period_ms: 10_000,
            max_core_words: 20,
            max_event_words: 40,
            respect_most_frequent: true,
            message_expiration_secs: 7 * 86_400,
            word_pair_cache_capacity: 1_024,
            merge: MergeParams::default(),
            limits: MergeLimits::default(),
        }
    }
}

impl BankConfig {
    pub fn ping_period(&self) -> Duration {
        Duration::from_millis(self.ping_period_ms)
    }

    pub fn login_retry_period(&self) -> Duration {
        Duration::from_millis(self.login_retry_period_ms)
    }

    pub fn merge_period(&self) -> Duration {
        Duration::from_millis(self.merge_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "manager": { "registration_timeout_ms": 250 },
            "bank": { "limits": { "max_size": 10 }, "merge": { "base": 55 } }
        }"#;

        let config: ClusterConfig = serde_json::from_str(json).expect("Parsing failed");

        assert_eq!(config.manager.registration_timeout(), Duration::from_millis(250));
        assert_eq!(config.manager.reset_timeout_ms, 10_000);
        assert_eq!(config.bank.limits.max_size, 10);
        assert_eq!(config.bank.limits.max_strain, 30);
        assert_eq!(config.bank.merge.base, 55);
        assert_eq!(config.bank.merge.min, 25);
        assert_eq!(config.client, ClientConfig::default());
    }

    #[test]
    fn test_load_without_path_is_default() {
        let config = ClusterConfig::load(None).expect("Loading failed");
        assert_eq!(config, ClusterConfig::default());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let result = ClusterConfig::load(Some(Path::new("/nonexistent/cluster.json")));
        assert!(result.is_err());
    }
}
