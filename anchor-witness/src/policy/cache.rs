//! Cache of parsed policy configs.
//!
//! Small, capacity-bounded cache in front of the durable config store. Each
//! entry carries a TTL; on miss or expiry the loader reads the raw policy
//! string (stored JSON-quoted), parses it and caches the parsed form. Parse
//! failures are returned but never cached, so a corrected policy takes
//! effect on the next read. Concurrent misses coalesce behind a single
//! loader; waiters re-check the cache before loading themselves.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use super::config::PolicyConfig;
use crate::error::{WitnessError, WitnessResult};
use crate::storage::StorageBackend;

pub(crate) const DEFAULT_CAPACITY: usize = 10;

struct CacheEntry {
    config: PolicyConfig,
    expires_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    // Least-recently-used key at the front.
    order: VecDeque<String>,
}

impl CacheState {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }
}

/// TTL cache of parsed [`PolicyConfig`]s, loading through the config store.
pub(crate) struct PolicyCache {
    config_store: Arc<dyn StorageBackend>,
    capacity: usize,
    ttl: Duration,
    state: Mutex<CacheState>,
    load_lock: Mutex<()>,
}

impl PolicyCache {
    pub(crate) fn new(config_store: Arc<dyn StorageBackend>, ttl: Duration) -> Self {
        Self::with_capacity(config_store, ttl, DEFAULT_CAPACITY)
    }

    pub(crate) fn with_capacity(
        config_store: Arc<dyn StorageBackend>,
        ttl: Duration,
        capacity: usize,
    ) -> Self {
        Self {
            config_store,
            capacity,
            ttl,
            state: Mutex::new(CacheState::default()),
            load_lock: Mutex::new(()),
        }
    }

    /// The parsed policy under `key`, loading it on miss or expiry.
    pub(crate) async fn get(&self, key: &str) -> WitnessResult<PolicyConfig> {
        if let Some(config) = self.lookup(key).await {
            return Ok(config);
        }

        // At most one reload runs at a time; anyone queued behind it picks
        // up the freshly cached value instead of loading again.
        let _guard = self.load_lock.lock().await;

        if let Some(config) = self.lookup(key).await {
            return Ok(config);
        }

        let config = self.load(key).await?;
        self.insert(key, config.clone()).await;

        Ok(config)
    }

    async fn lookup(&self, key: &str) -> Option<PolicyConfig> {
        let mut state = self.state.lock().await;

        let live = match state.entries.get(key) {
            None => return None,
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.config.clone()),
            Some(_) => None,
        };

        match live {
            Some(config) => {
                state.touch(key);
                Some(config)
            }
            None => {
                state.remove(key);
                None
            }
        }
    }

    async fn insert(&self, key: &str, config: PolicyConfig) {
        let mut state = self.state.lock().await;

        if !state.entries.contains_key(key) && state.entries.len() >= self.capacity {
            if let Some(evicted) = state.order.pop_front() {
                state.entries.remove(&evicted);
            }
        }

        state.entries.insert(
            key.to_string(),
            CacheEntry {
                config,
                expires_at: Instant::now() + self.ttl,
            },
        );
        state.touch(key);
    }

    async fn load(&self, key: &str) -> WitnessResult<PolicyConfig> {
        let raw = match self.config_store.get(key).await {
            Ok(Some(bytes)) => serde_json::from_slice::<String>(&bytes).map_err(|e| {
                WitnessError::permanent(format!(
                    "failed to unmarshal policy[{key}] from config store: {e}"
                ))
            })?,
            // A missing policy key is legal and means no requirements.
            Ok(None) => String::new(),
            Err(e) => {
                return Err(WitnessError::transient(format!(
                    "failed to read policy[{key}] from config store: {e}"
                )))
            }
        };

        debug!(key, policy = %raw, "loaded witness policy from config store");

        Ok(PolicyConfig::parse(&raw)?)
    }
}
