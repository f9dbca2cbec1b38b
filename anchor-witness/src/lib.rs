//! Anchor witness subsystem for a DID anchoring node.
//!
//! Nodes publish anchors (bundles of DID operations) and accept them only
//! once enough peers have countersigned under the node's witness policy.
//! This crate is the part that decides *who* must sign and *when* an anchor
//! is sufficiently witnessed:
//!
//! - **Policy engine** ([`WitnessPolicy`]): parses the policy expression,
//!   caches the parsed config with a TTL, selects a minimum satisfying
//!   witness set and evaluates collected proofs against the policy.
//! - **Witness store** ([`WitnessStore`]): durable, anchor-indexed,
//!   expiring store of per-witness records with idempotent proof updates.
//! - **Expiry service** ([`ExpiryService`]): TTL sweeper reclaiming records
//!   of anchors that never completed.
//!
//! Transporting proofs, verifying signatures and deciding anchor content
//! are the caller's concern; proofs arrive here as opaque bytes from an
//! authenticated transport.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use anchor_core::{AnchorId, Witness, WitnessType};
//! use anchor_witness::storage::MemoryBackend;
//! use anchor_witness::{WitnessConfig, WitnessService};
//! use url::Url;
//!
//! async fn example() -> anchor_witness::WitnessResult<()> {
//!     let service = WitnessService::new(
//!         Arc::new(MemoryBackend::new()),
//!         Arc::new(MemoryBackend::new()),
//!         WitnessConfig::default(),
//!     )
//!     .await;
//!     service.start();
//!
//!     let anchor = AnchorId::new("anchor-1");
//!     let witnesses = vec![Witness::new(
//!         WitnessType::Batch,
//!         Url::parse("https://w1.example.com/service").unwrap(),
//!         true,
//!     )];
//!
//!     // Select witnesses and record them for the anchor.
//!     let selected = service.propose(&anchor, &witnesses, &[]).await?;
//!
//!     // As proofs arrive, record each one and re-check the policy.
//!     let witnessed = service
//!         .record_proof(&anchor, &selected[0].uri, b"proof-bytes")
//!         .await?;
//!
//!     if witnessed {
//!         // Publish the anchor, then drop its witness state.
//!         service.complete(&anchor).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod policy;
pub mod storage;
pub mod store;

pub use config::WitnessConfig;
pub use error::{WitnessError, WitnessResult};
pub use policy::config::{Operator, PolicyConfig, PolicyParseError};
pub use policy::{WitnessPolicy, WITNESS_POLICY_KEY};
pub use store::expiry::{ExpiryHandler, ExpiryService};
pub use store::WitnessStore;

use std::collections::HashSet;
use std::sync::Arc;

use anchor_core::{AnchorId, Witness, WitnessRecord};
use url::Url;

use crate::policy::selector::SelectionStrategy;
use crate::storage::StorageBackend;

/// Facade over the witness subsystem, wired the way anchor drivers use it:
/// select on proposal, record proofs as they arrive, re-select to widen,
/// delete on completion.
pub struct WitnessService {
    store: Arc<WitnessStore>,
    policy: WitnessPolicy,
    expiry: Arc<ExpiryService>,
}

impl WitnessService {
    /// Wire up the subsystem over a record backend and a config store.
    pub async fn new(
        backend: Arc<dyn StorageBackend>,
        config_store: Arc<dyn StorageBackend>,
        config: WitnessConfig,
    ) -> Self {
        let expiry = Arc::new(ExpiryService::new(config.expiry_sweep_interval()));
        let store = WitnessStore::new(backend, &expiry, config.record_expiry()).await;
        let policy = WitnessPolicy::new(config_store, config.policy_cache_ttl());

        Self {
            store,
            policy,
            expiry,
        }
    }

    /// Replace the witness selection strategy.
    pub fn with_selection_strategy(mut self, selector: Box<dyn SelectionStrategy>) -> Self {
        self.policy = self.policy.with_selector(selector);
        self
    }

    /// Start the background expiry sweeper.
    pub fn start(&self) {
        self.expiry.start();
    }

    /// Stop background services.
    pub fn stop(&self) {
        self.expiry.stop();
    }

    /// Propose an anchor: select witnesses under the current policy, then
    /// record one entry per known witness with the chosen ones flagged.
    ///
    /// Returns the selected witnesses, which the driver solicits for
    /// proofs.
    pub async fn propose(
        &self,
        anchor_id: &AnchorId,
        witnesses: &[Witness],
        exclude: &[Url],
    ) -> WitnessResult<Vec<Witness>> {
        let selected = self.policy.select(witnesses, exclude).await?;
        let chosen: HashSet<&str> = selected.iter().map(|w| w.uri.as_str()).collect();

        let records: Vec<WitnessRecord> = witnesses
            .iter()
            .map(|w| WitnessRecord::new(w, chosen.contains(w.uri.as_str())))
            .collect();

        self.store.put(anchor_id, &records).await?;

        Ok(selected)
    }

    /// Widen the witness set after declines or timeouts, excluding the
    /// peers that already failed. Newly chosen witnesses are flagged as
    /// selected on their existing records.
    pub async fn reselect(
        &self,
        anchor_id: &AnchorId,
        witnesses: &[Witness],
        exclude: &[Url],
    ) -> WitnessResult<Vec<Witness>> {
        let selected = self.policy.select(witnesses, exclude).await?;
        let uris: Vec<Url> = selected.iter().map(|w| w.uri.clone()).collect();

        self.store.update_selection(anchor_id, &uris, true).await?;

        Ok(selected)
    }

    /// Record an inbound proof, then re-check the policy.
    ///
    /// Returns true when the anchor is now sufficiently witnessed to be
    /// published.
    pub async fn record_proof(
        &self,
        anchor_id: &AnchorId,
        witness: &Url,
        proof: &[u8],
    ) -> WitnessResult<bool> {
        self.store.add_proof(anchor_id, witness, proof).await?;
        self.witnessed(anchor_id).await
    }

    /// Whether the proofs on record satisfy the witness policy.
    pub async fn witnessed(&self, anchor_id: &AnchorId) -> WitnessResult<bool> {
        let records = self.store.get(anchor_id).await?;
        self.policy.evaluate(&records).await
    }

    /// Drop all witness state for a completed or abandoned anchor.
    pub async fn complete(&self, anchor_id: &AnchorId) -> WitnessResult<()> {
        self.store.delete(anchor_id).await
    }

    pub fn store(&self) -> &Arc<WitnessStore> {
        &self.store
    }

    pub fn policy(&self) -> &WitnessPolicy {
        &self.policy
    }

    pub fn expiry(&self) -> &Arc<ExpiryService> {
        &self.expiry
    }
}
