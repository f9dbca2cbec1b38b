//! Witness policy engine.
//!
//! Combines the three policy-side concerns: loading and caching the parsed
//! policy config, selecting a minimum satisfying witness set for a new
//! anchor, and deciding whether the proofs on record satisfy the policy.

pub mod config;
pub mod selector;

mod cache;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anchor_core::{Witness, WitnessRecord, WitnessType};
use tracing::debug;
use url::Url;

use crate::error::{WitnessError, WitnessResult};
use crate::storage::StorageBackend;

use self::cache::PolicyCache;
use self::config::{Operator, PolicyConfig};
use self::selector::{RandomSelector, SelectionStrategy};

/// Key under which the config store holds the raw policy string.
pub const WITNESS_POLICY_KEY: &str = "witness-policy";

/// Policy engine: witness selection and proof evaluation under the node's
/// configured witness policy.
pub struct WitnessPolicy {
    cache: PolicyCache,
    selector: Box<dyn SelectionStrategy>,
}

impl WitnessPolicy {
    /// New policy engine reading its config through `config_store`, using
    /// uniform random selection.
    pub fn new(config_store: Arc<dyn StorageBackend>, cache_ttl: Duration) -> Self {
        Self {
            cache: PolicyCache::new(config_store, cache_ttl),
            selector: Box::new(RandomSelector::new()),
        }
    }

    /// Replace the selection strategy.
    pub fn with_selector(mut self, selector: Box<dyn SelectionStrategy>) -> Self {
        self.selector = selector;
        self
    }

    /// The current parsed policy config.
    pub async fn config(&self) -> WitnessResult<PolicyConfig> {
        self.cache.get(WITNESS_POLICY_KEY).await
    }

    /// Whether the policy is satisfied by the proofs currently on record.
    ///
    /// This is a snapshot decision: it may observe a state between two
    /// proof writes and return false; re-evaluation on the next proof
    /// arrival converges.
    pub async fn evaluate(&self, records: &[WitnessRecord]) -> WitnessResult<bool> {
        let cfg = self.config().await?;

        let mut total_batch = 0;
        let mut collected_batch = 0;
        let mut total_system = 0;
        let mut collected_system = 0;

        for record in records {
            let counted = log_ok(cfg.log_required, record.has_log) && record.has_proof();

            match record.witness_type {
                WitnessType::Batch => {
                    total_batch += 1;
                    if counted {
                        collected_batch += 1;
                    }
                }
                WitnessType::System => {
                    total_system += 1;
                    if counted {
                        collected_system += 1;
                    }
                }
            }
        }

        let batch_ok = class_satisfied(
            collected_batch,
            total_batch,
            cfg.min_number_batch,
            cfg.min_percent_batch,
        );
        let system_ok = class_satisfied(
            collected_system,
            total_system,
            cfg.min_number_system,
            cfg.min_percent_system,
        );

        let satisfied = match cfg.operator {
            Operator::And => batch_ok && system_ok,
            Operator::Or => batch_ok || system_ok,
        };

        debug!(policy = %cfg, satisfied, batch_ok, system_ok, "evaluated witness policy");

        Ok(satisfied)
    }

    /// Choose a minimum witness set satisfying the policy.
    ///
    /// `exclude` lists URIs that declined, timed out or were already
    /// retried. While `LogRequired` is set, a witness without a
    /// transparency log is entirely ineligible. Percent targets count
    /// against the whole class, not the eligible survivors.
    pub async fn select(
        &self,
        witnesses: &[Witness],
        exclude: &[Url],
    ) -> WitnessResult<Vec<Witness>> {
        let cfg = self.config().await?;
        let excluded: HashSet<&str> = exclude.iter().map(Url::as_str).collect();

        let mut eligible_batch = Vec::new();
        let mut eligible_system = Vec::new();
        let mut total_batch = 0;
        let mut total_system = 0;

        for witness in witnesses {
            let eligible = log_ok(cfg.log_required, witness.has_log)
                && !excluded.contains(witness.uri.as_str());

            match witness.witness_type {
                WitnessType::Batch => {
                    total_batch += 1;
                    if eligible {
                        eligible_batch.push(witness.clone());
                    }
                }
                WitnessType::System => {
                    total_system += 1;
                    if eligible {
                        eligible_system.push(witness.clone());
                    }
                }
            }
        }

        // Under AND, a peer eligible in both classes satisfies both at
        // once; preferring those keeps the total selection small.
        let preferred = if cfg.operator == Operator::And {
            intersection(&eligible_batch, &eligible_system)
        } else {
            Vec::new()
        };

        let batch_selection =
            self.select_class(WitnessType::Batch, &cfg, &eligible_batch, total_batch, &preferred)?;
        let system_selection = self.select_class(
            WitnessType::System,
            &cfg,
            &eligible_system,
            total_system,
            &preferred,
        )?;

        let selection = match cfg.operator {
            Operator::And => {
                let mut selection = preferred;
                selection.extend(batch_selection);
                selection.extend(system_selection);
                selection
            }
            // The smaller satisfying side wins, ties prefer batch. An empty
            // side means that class needs nobody at all.
            Operator::Or => {
                if batch_selection.is_empty() || system_selection.len() < batch_selection.len() {
                    system_selection
                } else {
                    batch_selection
                }
            }
        };

        debug!(policy = %cfg, count = selection.len(), "selected witnesses");

        Ok(selection)
    }

    fn select_class(
        &self,
        class: WitnessType,
        cfg: &PolicyConfig,
        eligible: &[Witness],
        total: usize,
        preferred: &[Witness],
    ) -> WitnessResult<Vec<Witness>> {
        let pool = difference(eligible, preferred);
        let target = class_target(
            cfg.min_number(class),
            cfg.min_percent(class),
            total,
            eligible.len(),
            preferred.len(),
        );

        self.selector
            .select(&pool, target)
            .map_err(|source| WitnessError::Selection {
                class,
                policy: cfg.to_string(),
                source,
            })
    }
}

/// When a log is required, only witnesses operating one count; otherwise
/// everyone counts.
fn log_ok(log_required: bool, has_log: bool) -> bool {
    !log_required || has_log
}

/// Per-class satisfaction check.
///
/// A class with no witnesses on record counts as fully collected (the ratio
/// of an absent class is 100%), so an absent class never blocks an AND
/// policy. A class with no percent clause is trivially satisfied only when
/// it has no count clause either.
fn class_satisfied(
    collected: usize,
    total: usize,
    min_number: usize,
    min_percent: Option<u8>,
) -> bool {
    let percent_ok = match min_percent {
        Some(p) => {
            let ratio = if total == 0 {
                1.0
            } else {
                collected as f64 / total as f64
            };
            ratio >= f64::from(p) / 100.0
        }
        None => min_number == 0,
    };

    (min_number > 0 && collected >= min_number) || percent_ok
}

/// Witnesses still needed from a class after the preferred picks are
/// counted toward it. Without any configured constraint the whole eligible
/// pool is the target.
fn class_target(
    min_number: usize,
    min_percent: Option<u8>,
    total: usize,
    eligible: usize,
    preferred: usize,
) -> usize {
    let needed = if min_number > 0 {
        min_number as isize
    } else if let Some(p) = min_percent {
        (f64::from(p) / 100.0 * total as f64).ceil() as isize
    } else {
        eligible as isize
    };

    (needed - preferred as isize).max(0) as usize
}

fn intersection(a: &[Witness], b: &[Witness]) -> Vec<Witness> {
    let in_b: HashSet<&str> = b.iter().map(|w| w.uri.as_str()).collect();
    let mut seen = HashSet::new();

    a.iter()
        .filter(|w| in_b.contains(w.uri.as_str()) && seen.insert(w.uri.as_str()))
        .cloned()
        .collect()
}

fn difference(a: &[Witness], b: &[Witness]) -> Vec<Witness> {
    let in_b: HashSet<&str> = b.iter().map(|w| w.uri.as_str()).collect();

    a.iter()
        .filter(|w| !in_b.contains(w.uri.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::selector::SelectionError;
    use crate::storage::MemoryBackend;

    /// Deterministic strategy: the first `n` candidates in pool order.
    struct FirstN;

    impl SelectionStrategy for FirstN {
        fn select(
            &self,
            candidates: &[Witness],
            n: usize,
        ) -> Result<Vec<Witness>, SelectionError> {
            if n > candidates.len() {
                return Err(SelectionError {
                    requested: n,
                    available: candidates.len(),
                });
            }
            Ok(candidates[..n].to_vec())
        }
    }

    async fn engine(policy: &str) -> WitnessPolicy {
        let store = Arc::new(MemoryBackend::new());
        let value = serde_json::to_vec(policy).unwrap();
        store.put(WITNESS_POLICY_KEY, &value, &[]).await.unwrap();

        WitnessPolicy::new(store, Duration::from_secs(60)).with_selector(Box::new(FirstN))
    }

    fn witness(uri: &str, witness_type: WitnessType, has_log: bool) -> Witness {
        Witness::new(witness_type, Url::parse(uri).unwrap(), has_log)
    }

    fn record(uri: &str, witness_type: WitnessType, has_log: bool, proof: &[u8]) -> WitnessRecord {
        let mut record = WitnessRecord::new(&witness(uri, witness_type, has_log), true);
        record.proof = proof.to_vec();
        record
    }

    fn uris(witnesses: &[Witness]) -> Vec<&str> {
        witnesses.iter().map(|w| w.uri.as_str()).collect()
    }

    // ---- evaluate ----

    #[tokio::test]
    async fn test_evaluate_empty_policy_empty_proofs() {
        let policy = engine("").await;
        assert!(policy.evaluate(&[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_evaluate_empty_policy_is_always_satisfied() {
        let policy = engine("").await;
        let records = [
            record("https://w1.example.com/", WitnessType::Batch, true, b""),
            record("https://w2.example.com/", WitnessType::System, true, b""),
        ];
        assert!(policy.evaluate(&records).await.unwrap());
    }

    #[tokio::test]
    async fn test_evaluate_percent_counts_all_of_class() {
        let policy = engine("MinPercent(100,batch) AND MinPercent(0,system)").await;

        let mut records = vec![
            record("https://w1.example.com/", WitnessType::Batch, true, b"p1"),
            record("https://w2.example.com/", WitnessType::Batch, true, b"p2"),
            record("https://w3.example.com/", WitnessType::Batch, true, b""),
        ];
        assert!(!policy.evaluate(&records).await.unwrap());

        records[2].proof = b"p3".to_vec();
        assert!(policy.evaluate(&records).await.unwrap());
    }

    #[tokio::test]
    async fn test_evaluate_min_number_or() {
        let policy = engine("MinNumber(2,system) OR MinNumber(2,batch)").await;

        let records = [
            record("https://b1.example.com/", WitnessType::Batch, true, b""),
            record("https://b2.example.com/", WitnessType::Batch, true, b""),
            record("https://s1.example.com/", WitnessType::System, true, b"p1"),
            record("https://s2.example.com/", WitnessType::System, true, b"p2"),
            record("https://s3.example.com/", WitnessType::System, true, b""),
        ];
        assert!(policy.evaluate(&records).await.unwrap());
    }

    #[tokio::test]
    async fn test_evaluate_min_number_alone_is_binding() {
        let policy = engine("MinNumber(2,batch)").await;

        let records = [
            record("https://b1.example.com/", WitnessType::Batch, true, b"p1"),
            record("https://b2.example.com/", WitnessType::Batch, true, b""),
        ];
        assert!(!policy.evaluate(&records).await.unwrap());
    }

    #[tokio::test]
    async fn test_evaluate_absent_class_is_satisfied() {
        // No system witnesses on record: the system side evaluates at 100%.
        let policy = engine("MinPercent(50,batch) AND MinPercent(50,system)").await;

        let records = [record(
            "https://b1.example.com/",
            WitnessType::Batch,
            true,
            b"p1",
        )];
        assert!(policy.evaluate(&records).await.unwrap());
    }

    #[tokio::test]
    async fn test_evaluate_log_required_discounts_proofs() {
        let policy = engine("LogRequired MinNumber(1,batch)").await;

        let records = [record("https://b1.example.com/", WitnessType::Batch, false, b"p1")];
        assert!(!policy.evaluate(&records).await.unwrap());

        let records = [record("https://b1.example.com/", WitnessType::Batch, true, b"p1")];
        assert!(policy.evaluate(&records).await.unwrap());
    }

    // ---- select ----

    #[tokio::test]
    async fn test_select_min_number() {
        let policy = engine("MinNumber(2,batch)").await;

        let witnesses = [
            witness("https://b1.example.com/", WitnessType::Batch, true),
            witness("https://b2.example.com/", WitnessType::Batch, true),
            witness("https://b3.example.com/", WitnessType::Batch, true),
        ];

        let selection = policy.select(&witnesses, &[]).await.unwrap();
        assert_eq!(selection.len(), 2);
    }

    #[tokio::test]
    async fn test_select_percent_over_total_with_log_filter() {
        let policy = engine("LogRequired MinPercent(50,batch)").await;

        let witnesses = [
            witness("https://b1.example.com/", WitnessType::Batch, true),
            witness("https://b2.example.com/", WitnessType::Batch, false),
            witness("https://b3.example.com/", WitnessType::Batch, true),
            witness("https://b4.example.com/", WitnessType::Batch, false),
        ];

        // Half of four is two, and only log-bearing peers are eligible.
        let selection = policy.select(&witnesses, &[]).await.unwrap();
        assert_eq!(selection.len(), 2);
        assert!(selection.iter().all(|w| w.has_log));
    }

    #[tokio::test]
    async fn test_select_excluded_witnesses_are_ineligible() {
        let policy = engine("MinNumber(2,batch)").await;

        let witnesses = [
            witness("https://b1.example.com/", WitnessType::Batch, true),
            witness("https://b2.example.com/", WitnessType::Batch, true),
            witness("https://b3.example.com/", WitnessType::Batch, true),
        ];

        let declined = Url::parse("https://b1.example.com/").unwrap();
        let selection = policy.select(&witnesses, &[declined.clone()]).await.unwrap();

        assert_eq!(selection.len(), 2);
        assert!(!uris(&selection).contains(&declined.as_str()));
    }

    #[tokio::test]
    async fn test_select_no_constraints_returns_all_eligible() {
        let policy = engine("").await;

        let witnesses = [
            witness("https://b1.example.com/", WitnessType::Batch, true),
            witness("https://s1.example.com/", WitnessType::System, true),
        ];

        let selection = policy.select(&witnesses, &[]).await.unwrap();
        assert_eq!(selection.len(), 2);
    }

    #[tokio::test]
    async fn test_select_prefers_common_witnesses_under_and() {
        let policy = engine("MinNumber(1,batch) AND MinNumber(1,system)").await;

        // One peer appears in both classes; picking it covers both.
        let witnesses = [
            witness("https://both.example.com/", WitnessType::Batch, true),
            witness("https://b1.example.com/", WitnessType::Batch, true),
            witness("https://both.example.com/", WitnessType::System, true),
            witness("https://s1.example.com/", WitnessType::System, true),
        ];

        let selection = policy.select(&witnesses, &[]).await.unwrap();
        assert_eq!(uris(&selection), vec!["https://both.example.com/"]);
    }

    #[tokio::test]
    async fn test_select_or_returns_smaller_side() {
        let policy = engine("MinNumber(1,batch) MinNumber(2,system) OR").await;

        let witnesses = [
            witness("https://b1.example.com/", WitnessType::Batch, true),
            witness("https://b2.example.com/", WitnessType::Batch, true),
            witness("https://s1.example.com/", WitnessType::System, true),
            witness("https://s2.example.com/", WitnessType::System, true),
        ];

        let selection = policy.select(&witnesses, &[]).await.unwrap();
        assert_eq!(selection.len(), 1);
        assert_eq!(selection[0].witness_type, WitnessType::Batch);
    }

    #[tokio::test]
    async fn test_select_empty_trivial_class_proceeds() {
        // No system witnesses at all, but the system side requires nothing.
        let policy = engine("MinNumber(1,batch)").await;

        let witnesses = [witness("https://b1.example.com/", WitnessType::Batch, true)];

        let selection = policy.select(&witnesses, &[]).await.unwrap();
        assert_eq!(selection.len(), 1);
    }

    #[tokio::test]
    async fn test_select_shortfall_names_the_failing_class() {
        let policy = engine("MinNumber(2,system)").await;

        let witnesses = [witness("https://s1.example.com/", WitnessType::System, true)];

        let err = policy.select(&witnesses, &[]).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("system"), "got: {message}");
        assert!(message.contains("MinNumber(2,system)"), "got: {message}");
    }

    // ---- helpers ----

    #[test]
    fn test_class_target_clamps_to_zero() {
        // Two preferred picks already cover a MinNumber(1) requirement.
        assert_eq!(class_target(1, None, 5, 5, 2), 0);
    }

    #[test]
    fn test_class_target_percent_rounds_up() {
        assert_eq!(class_target(0, Some(50), 3, 3, 0), 2);
        assert_eq!(class_target(0, Some(1), 1, 1, 0), 1);
        assert_eq!(class_target(0, Some(0), 3, 3, 0), 0);
    }

    #[test]
    fn test_intersection_and_difference_by_uri() {
        let a = [
            witness("https://x.example.com/", WitnessType::Batch, true),
            witness("https://y.example.com/", WitnessType::Batch, true),
        ];
        let b = [witness("https://x.example.com/", WitnessType::System, true)];

        assert_eq!(uris(&intersection(&a, &b)), vec!["https://x.example.com/"]);
        assert_eq!(uris(&difference(&a, &b)), vec!["https://y.example.com/"]);
    }
}
