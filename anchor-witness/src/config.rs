//! Witness subsystem configuration.
//!
//! Supports loading from environment variables with the ANCHOR_WITNESS_
//! prefix; the node's configuration loader composes this into its own file.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime configuration for the witness subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessConfig {
    /// TTL of cached witness-policy configs, in seconds.
    #[serde(default = "default_policy_cache_ttl_secs")]
    pub policy_cache_ttl_secs: u64,

    /// Lifetime of witness records before the TTL sweep reclaims them, in
    /// seconds. Must equal or exceed the anchor's maximum outstanding
    /// window so records survive until the anchor completes or is abandoned.
    #[serde(default = "default_record_expiry_secs")]
    pub record_expiry_secs: u64,

    /// Interval between expiry sweeps, in seconds.
    #[serde(default = "default_expiry_sweep_interval_secs")]
    pub expiry_sweep_interval_secs: u64,
}

fn default_policy_cache_ttl_secs() -> u64 {
    30
}

fn default_record_expiry_secs() -> u64 {
    3600
}

fn default_expiry_sweep_interval_secs() -> u64 {
    60
}

impl Default for WitnessConfig {
    fn default() -> Self {
        Self {
            policy_cache_ttl_secs: default_policy_cache_ttl_secs(),
            record_expiry_secs: default_record_expiry_secs(),
            expiry_sweep_interval_secs: default_expiry_sweep_interval_secs(),
        }
    }
}

impl WitnessConfig {
    /// Development profile: short TTLs so policy edits show up quickly.
    pub fn development() -> Self {
        Self {
            policy_cache_ttl_secs: 5,
            record_expiry_secs: 600,
            expiry_sweep_interval_secs: 10,
        }
    }

    /// Test profile: everything short enough for integration tests to
    /// observe expiry without long waits.
    pub fn test() -> Self {
        Self {
            policy_cache_ttl_secs: 1,
            record_expiry_secs: 2,
            expiry_sweep_interval_secs: 1,
        }
    }

    /// Load configuration from ANCHOR_WITNESS_* environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_u64("ANCHOR_WITNESS_POLICY_CACHE_TTL_SECS") {
            config.policy_cache_ttl_secs = v;
        }
        if let Some(v) = env_u64("ANCHOR_WITNESS_RECORD_EXPIRY_SECS") {
            config.record_expiry_secs = v;
        }
        if let Some(v) = env_u64("ANCHOR_WITNESS_EXPIRY_SWEEP_INTERVAL_SECS") {
            config.expiry_sweep_interval_secs = v;
        }

        config
    }

    pub fn policy_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.policy_cache_ttl_secs)
    }

    pub fn record_expiry(&self) -> Duration {
        Duration::from_secs(self.record_expiry_secs)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
