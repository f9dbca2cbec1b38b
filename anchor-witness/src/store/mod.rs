//! Anchor witness store.
//!
//! Durable, anchor-indexed, expiring store of [`WitnessRecord`]s. Each
//! record lives under a fresh UUID primary key; a secondary index tag maps
//! the base64url-encoded anchor id to its records, and an expiry tag lets
//! the TTL sweeper reclaim records for anchors that never completed.
//!
//! Update paths are two-phase: matching records are collected from an index
//! snapshot first, then rewritten with point writes. Writes are independent;
//! a failure mid-way is surfaced with a count of how many records were
//! already updated.

pub mod expiry;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anchor_core::{AnchorId, WitnessRecord};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{WitnessError, WitnessResult};
use crate::storage::{Operation, QueryEntry, StorageBackend, Tag};

use self::expiry::{ExpiryHandler, ExpiryService};

/// Namespace label for this store's expiry registration.
pub const NAMESPACE: &str = "witness";

/// Secondary index tag holding the base64url-encoded anchor id.
const ANCHOR_INDEX_TAG: &str = "anchorID";

/// Tag holding the record's expiry time in unix epoch seconds.
const EXPIRY_TAG: &str = "ExpiryTime";

/// Store of per-anchor witness records.
pub struct WitnessStore {
    backend: Arc<dyn StorageBackend>,
    expiry_period: Duration,
}

impl WitnessStore {
    /// Open the witness store over `backend` and register it with the
    /// expiry service for TTL sweeping.
    pub async fn new(
        backend: Arc<dyn StorageBackend>,
        expiry_service: &ExpiryService,
        expiry_period: Duration,
    ) -> Arc<Self> {
        let store = Arc::new(Self {
            backend: backend.clone(),
            expiry_period,
        });

        let handler: Arc<dyn ExpiryHandler> = store.clone();
        expiry_service
            .register(backend, EXPIRY_TAG, NAMESPACE, Some(handler))
            .await;

        store
    }

    /// Save fresh witness records for an anchor.
    ///
    /// One record per witness is committed in a single batch; this is the
    /// only creation path, so `(anchor, uri)` stays unique as long as
    /// callers put each anchor once.
    pub async fn put(&self, anchor_id: &AnchorId, records: &[WitnessRecord]) -> WitnessResult<()> {
        let anchor_encoded = anchor_id.encoded();
        let expiry_time = Utc::now().timestamp() + self.expiry_period.as_secs() as i64;

        let mut operations = Vec::with_capacity(records.len());

        for record in records {
            let value = serde_json::to_vec(record).map_err(|e| {
                WitnessError::permanent(format!(
                    "failed to marshal witness[{}] record for anchorID[{anchor_id}]: {e}",
                    record.uri
                ))
            })?;

            debug!(
                anchor_id = %anchor_id,
                witness = %record.uri,
                witness_type = %record.witness_type,
                "adding witness to storage batch"
            );

            operations.push(Operation::insert(
                Uuid::new_v4().to_string(),
                value,
                vec![
                    Tag::new(ANCHOR_INDEX_TAG, anchor_encoded.clone()),
                    Tag::new(EXPIRY_TAG, expiry_time.to_string()),
                ],
            ));
        }

        self.backend.batch(operations).await.map_err(|e| {
            WitnessError::transient(format!(
                "failed to store witnesses for anchorID[{anchor_id}]: {e}"
            ))
        })?;

        debug!(anchor_id = %anchor_id, count = records.len(), "stored witnesses");

        Ok(())
    }

    /// Retrieve all witness records for an anchor, in no particular order.
    pub async fn get(&self, anchor_id: &AnchorId) -> WitnessResult<Vec<WitnessRecord>> {
        let entries = self.query_anchor(anchor_id).await?;

        let mut records = Vec::with_capacity(entries.len());
        for entry in &entries {
            records.push(decode_record(&entry.value, anchor_id)?);
        }

        if records.is_empty() {
            return Err(WitnessError::not_found(format!(
                "anchorID[{anchor_id}] not found in the store"
            )));
        }

        debug!(anchor_id = %anchor_id, count = records.len(), "retrieved witnesses");

        Ok(records)
    }

    /// Delete all witness records for an anchor. A missing anchor is a
    /// no-op success.
    pub async fn delete(&self, anchor_id: &AnchorId) -> WitnessResult<()> {
        let entries = self.query_anchor(anchor_id).await?;

        if entries.is_empty() {
            debug!(anchor_id = %anchor_id, "no witnesses to delete, nothing to do");
            return Ok(());
        }

        let count = entries.len();
        let deletes = entries
            .into_iter()
            .map(|entry| Operation::delete(entry.key))
            .collect();

        self.backend.batch(deletes).await.map_err(|e| {
            WitnessError::transient(format!(
                "failed to delete witnesses for anchorID[{anchor_id}]: {e}"
            ))
        })?;

        debug!(anchor_id = %anchor_id, count, "deleted witnesses");

        Ok(())
    }

    /// Record the proof delivered by a witness.
    ///
    /// Repeated calls with identical bytes are idempotent; different bytes
    /// overwrite (the transport authenticates delivery, the store does not
    /// arbitrate). `NotFound` when the witness has no record for the anchor.
    pub async fn add_proof(
        &self,
        anchor_id: &AnchorId,
        witness: &Url,
        proof: &[u8],
    ) -> WitnessResult<()> {
        let proof = proof.to_vec();

        self.update_matching(anchor_id, std::slice::from_ref(witness), move |record| {
            record.proof = proof.clone();
        })
        .await
    }

    /// Set the `selected` flag on each matching record.
    ///
    /// Matching is by subset intersection: URIs with no record are skipped
    /// silently, and only a match count of zero is an error.
    pub async fn update_selection(
        &self,
        anchor_id: &AnchorId,
        witnesses: &[Url],
        selected: bool,
    ) -> WitnessResult<()> {
        self.update_matching(anchor_id, witnesses, move |record| {
            record.selected = selected;
        })
        .await
    }

    async fn query_anchor(&self, anchor_id: &AnchorId) -> WitnessResult<Vec<QueryEntry>> {
        let expression = format!("{ANCHOR_INDEX_TAG}:{}", anchor_id.encoded());

        self.backend.query(&expression).await.map_err(|e| {
            WitnessError::transient(format!("failed to get witnesses for[{expression}]: {e}"))
        })
    }

    async fn update_matching<F>(
        &self,
        anchor_id: &AnchorId,
        witnesses: &[Url],
        mut update: F,
    ) -> WitnessResult<()>
    where
        F: FnMut(&mut WitnessRecord),
    {
        let targets: HashSet<&str> = witnesses.iter().map(Url::as_str).collect();

        // Phase one: collect matching records from an index snapshot.
        let entries = self.query_anchor(anchor_id).await?;

        let mut matches = Vec::new();
        for entry in entries {
            let record = decode_record(&entry.value, anchor_id)?;
            if targets.contains(record.uri.as_str()) {
                matches.push((entry.key, entry.tags, record));
            }
        }

        if matches.is_empty() {
            let uris: Vec<&str> = witnesses.iter().map(Url::as_str).collect();
            return Err(WitnessError::not_found(format!(
                "witness[{}] not found for anchorID[{anchor_id}]",
                uris.join(", ")
            )));
        }

        // Phase two: point writes, keeping each record's tags intact so the
        // anchor index and expiry time survive the rewrite.
        let total = matches.len();
        let mut updated = 0usize;

        for (key, tags, mut record) in matches {
            update(&mut record);

            let value = serde_json::to_vec(&record).map_err(|e| {
                WitnessError::permanent(format!(
                    "failed to marshal witness[{}] record for anchorID[{anchor_id}]: {e}",
                    record.uri
                ))
            })?;

            self.backend.put(&key, &value, &tags).await.map_err(|e| {
                WitnessError::transient(format!(
                    "failed to update witness[{}] for anchorID[{anchor_id}] \
                     ({updated} of {total} records updated): {e}",
                    record.uri
                ))
            })?;

            updated += 1;

            debug!(anchor_id = %anchor_id, witness = %record.uri, "updated witness record");
        }

        Ok(())
    }
}

#[async_trait]
impl ExpiryHandler for WitnessStore {
    /// Resolve expired keys back to their anchors and report them.
    ///
    /// Notification-only: the sweeper already removes the records, and a
    /// key that cannot be resolved is skipped so the rest still get
    /// reported.
    async fn handle_expired_keys(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }

        let mut anchors = HashSet::new();

        for key in keys {
            let tags = match self.backend.get_tags(key).await {
                Ok(Some(tags)) => tags,
                Ok(None) => {
                    warn!(key = %key, "expired key has no tags");
                    continue;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to get tags for expired key");
                    continue;
                }
            };

            for tag in tags.iter().filter(|t| t.name == ANCHOR_INDEX_TAG) {
                match AnchorId::from_encoded(&tag.value) {
                    Ok(anchor) => {
                        anchors.insert(anchor.to_string());
                    }
                    Err(e) => {
                        warn!(value = %tag.value, error = %e, "failed to decode anchor index tag");
                    }
                }
            }
        }

        if !anchors.is_empty() {
            let mut anchors: Vec<String> = anchors.into_iter().collect();
            anchors.sort();

            error!(
                anchors = ?anchors,
                "witness records expired before their anchors completed"
            );
        }
    }
}

fn decode_record(value: &[u8], anchor_id: &AnchorId) -> WitnessResult<WitnessRecord> {
    serde_json::from_slice(value).map_err(|e| {
        WitnessError::permanent(format!(
            "failed to unmarshal witness record for anchorID[{anchor_id}]: {e}"
        ))
    })
}
