//! TTL sweeping for tag-indexed stores.
//!
//! Stores register themselves with an [`ExpiryService`] along with the tag
//! that carries each record's expiry time (unix epoch seconds). A background
//! task periodically queries for records whose time has passed, notifies the
//! registered handler, then removes them. Handlers run before removal so
//! they can still resolve record tags.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::storage::{Operation, StorageBackend};

/// Receives the primary keys of expired records before they are removed.
///
/// Handlers are notification-only: they cannot veto removal and must not
/// fail. Anything worth reporting goes to the log.
#[async_trait]
pub trait ExpiryHandler: Send + Sync {
    async fn handle_expired_keys(&self, keys: &[String]);
}

#[derive(Clone)]
struct Registration {
    backend: Arc<dyn StorageBackend>,
    expiry_tag: String,
    namespace: String,
    handler: Option<Arc<dyn ExpiryHandler>>,
}

/// Periodic TTL sweeper over registered stores.
pub struct ExpiryService {
    sweep_interval: Duration,
    registrations: Arc<RwLock<Vec<Registration>>>,
    running: Arc<AtomicBool>,
}

impl ExpiryService {
    pub fn new(sweep_interval: Duration) -> Self {
        Self {
            sweep_interval,
            registrations: Arc::new(RwLock::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a store for sweeping.
    ///
    /// `expiry_tag` names the tag whose value is the record's expiry time in
    /// unix epoch seconds; records without it are never swept. `namespace`
    /// only labels log output.
    pub async fn register(
        &self,
        backend: Arc<dyn StorageBackend>,
        expiry_tag: &str,
        namespace: &str,
        handler: Option<Arc<dyn ExpiryHandler>>,
    ) {
        let mut registrations = self.registrations.write().await;
        registrations.push(Registration {
            backend,
            expiry_tag: expiry_tag.to_string(),
            namespace: namespace.to_string(),
            handler,
        });

        debug!(namespace, expiry_tag, "store registered for expiry sweeping");
    }

    /// Run a single sweep over all registered stores.
    pub async fn sweep_once(&self) {
        let registrations = self.registrations.read().await.clone();

        for registration in &registrations {
            sweep_registration(registration).await;
        }
    }

    /// Start the background sweeper.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("expiry service already running");
            return;
        }

        let registrations = self.registrations.clone();
        let running = self.running.clone();
        let sweep_interval = self.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = interval(sweep_interval);

            info!(interval_secs = sweep_interval.as_secs(), "expiry service started");

            while running.load(Ordering::SeqCst) {
                ticker.tick().await;

                let snapshot = registrations.read().await.clone();
                for registration in &snapshot {
                    sweep_registration(registration).await;
                }
            }

            info!("expiry service stopped");
        });
    }

    /// Stop the background sweeper.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

async fn sweep_registration(registration: &Registration) {
    let namespace = registration.namespace.as_str();
    let expression = format!("{}<={}", registration.expiry_tag, Utc::now().timestamp());

    let entries = match registration.backend.query(&expression).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(namespace, error = %e, "expiry query failed, will retry next sweep");
            return;
        }
    };

    if entries.is_empty() {
        return;
    }

    let keys: Vec<String> = entries.into_iter().map(|e| e.key).collect();

    // Notify before removal so handlers can still read the records' tags.
    if let Some(handler) = &registration.handler {
        handler.handle_expired_keys(&keys).await;
    }

    let deletes = keys.iter().cloned().map(Operation::delete).collect();
    match registration.backend.batch(deletes).await {
        Ok(()) => debug!(namespace, count = keys.len(), "swept expired records"),
        Err(e) => {
            warn!(namespace, error = %e, "failed to remove expired records, will retry next sweep");
        }
    }
}
