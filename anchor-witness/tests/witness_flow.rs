//! End-to-end witness flow scenarios, driven through the facade the way an
//! anchor driver uses it: propose, record proofs, widen, complete.

use std::sync::Arc;
use std::time::Duration;

use anchor_core::{AnchorId, Witness, WitnessRecord, WitnessType};
use anchor_witness::storage::{MemoryBackend, StorageBackend};
use anchor_witness::{WitnessConfig, WitnessService, WITNESS_POLICY_KEY};
use url::Url;

async fn service_with_policy(policy: &str, config: WitnessConfig) -> WitnessService {
    let backend = Arc::new(MemoryBackend::new());
    let config_store = Arc::new(MemoryBackend::new());

    let value = serde_json::to_vec(policy).unwrap();
    config_store
        .put(WITNESS_POLICY_KEY, &value, &[])
        .await
        .unwrap();

    WitnessService::new(backend, config_store, config).await
}

fn batch(uri: &str) -> Witness {
    Witness::new(WitnessType::Batch, Url::parse(uri).unwrap(), true)
}

fn system(uri: &str) -> Witness {
    Witness::new(WitnessType::System, Url::parse(uri).unwrap(), true)
}

#[tokio::test]
async fn test_full_batch_quorum() {
    // All batch witnesses must sign before the anchor is witnessed.
    let service = service_with_policy(
        "MinPercent(100,batch) AND MinPercent(0,system)",
        WitnessConfig::default(),
    )
    .await;

    let anchor = AnchorId::new("anchor-1");
    let witnesses = [
        batch("https://w1.example.com/service"),
        batch("https://w2.example.com/service"),
        batch("https://w3.example.com/service"),
    ];

    let selected = service.propose(&anchor, &witnesses, &[]).await.unwrap();
    assert_eq!(selected.len(), 3);

    // Two of three proofs: not witnessed yet.
    assert!(!service
        .record_proof(&anchor, &witnesses[0].uri, b"proof-1")
        .await
        .unwrap());
    assert!(!service
        .record_proof(&anchor, &witnesses[1].uri, b"proof-2")
        .await
        .unwrap());

    // The third proof completes the quorum.
    assert!(service
        .record_proof(&anchor, &witnesses[2].uri, b"proof-3")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_either_class_quorum() {
    // Two system proofs satisfy the OR policy regardless of batch proofs.
    let service = service_with_policy(
        "MinNumber(2,system) OR MinNumber(2,batch)",
        WitnessConfig::default(),
    )
    .await;

    let anchor = AnchorId::new("anchor-1");
    let witnesses = [
        batch("https://b1.example.com/service"),
        batch("https://b2.example.com/service"),
        system("https://s1.example.com/service"),
        system("https://s2.example.com/service"),
        system("https://s3.example.com/service"),
    ];

    service.propose(&anchor, &witnesses, &[]).await.unwrap();

    assert!(!service
        .record_proof(&anchor, &witnesses[2].uri, b"proof-1")
        .await
        .unwrap());
    assert!(service
        .record_proof(&anchor, &witnesses[3].uri, b"proof-2")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_log_required_selection() {
    // Half of the batch fleet is required and only log-bearing peers are
    // eligible: exactly the two log-bearing peers get selected.
    let service =
        service_with_policy("LogRequired MinPercent(50,batch)", WitnessConfig::default()).await;

    let mut no_log_1 = batch("https://b2.example.com/service");
    no_log_1.has_log = false;
    let mut no_log_2 = batch("https://b4.example.com/service");
    no_log_2.has_log = false;

    let witnesses = [
        batch("https://b1.example.com/service"),
        no_log_1,
        batch("https://b3.example.com/service"),
        no_log_2,
    ];

    let anchor = AnchorId::new("anchor-1");
    let selected = service.propose(&anchor, &witnesses, &[]).await.unwrap();

    assert_eq!(selected.len(), 2);
    assert!(selected.iter().all(|w| w.has_log));
}

#[tokio::test]
async fn test_proof_for_unknown_witness() {
    let service = service_with_policy("", WitnessConfig::default()).await;

    let anchor = AnchorId::new("anchor-1");
    let witnesses = [batch("https://w1.example.com/service")];
    service.propose(&anchor, &witnesses, &[]).await.unwrap();

    let unknown = Url::parse("https://intruder.example.com/service").unwrap();
    let err = service
        .record_proof(&anchor, &unknown, b"proof")
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(err.to_string().contains("intruder.example.com"));
    assert!(err.to_string().contains("anchor-1"));
}

#[tokio::test]
async fn test_empty_policy_is_satisfied_with_no_proofs() {
    let service = service_with_policy("", WitnessConfig::default()).await;
    assert!(service.policy().evaluate(&[]).await.unwrap());
}

#[tokio::test]
async fn test_complete_drops_witness_state() {
    let service = service_with_policy("", WitnessConfig::default()).await;

    let anchor = AnchorId::new("anchor-1");
    let witnesses = [batch("https://w1.example.com/service")];
    service.propose(&anchor, &witnesses, &[]).await.unwrap();

    service.complete(&anchor).await.unwrap();
    assert!(service.witnessed(&anchor).await.unwrap_err().is_not_found());

    // Completing an already-completed anchor stays a no-op.
    service.complete(&anchor).await.unwrap();
}

#[tokio::test]
async fn test_recorded_proof_round_trips() {
    let service = service_with_policy("", WitnessConfig::default()).await;

    let anchor = AnchorId::new("anchor-1");
    let witnesses = [batch("https://w1.example.com/service")];
    service.propose(&anchor, &witnesses, &[]).await.unwrap();

    service
        .record_proof(&anchor, &witnesses[0].uri, b"proof-bytes")
        .await
        .unwrap();

    let records = service.store().get(&anchor).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].uri, witnesses[0].uri);
    assert_eq!(records[0].proof, b"proof-bytes");
}

#[tokio::test]
async fn test_selection_satisfies_its_own_policy() {
    // Any AND selection, fully proven, must evaluate as witnessed.
    let service = service_with_policy(
        "MinNumber(2,batch) AND MinNumber(1,system)",
        WitnessConfig::default(),
    )
    .await;

    let witnesses = [
        batch("https://b1.example.com/service"),
        batch("https://b2.example.com/service"),
        batch("https://b3.example.com/service"),
        system("https://s1.example.com/service"),
        system("https://s2.example.com/service"),
    ];

    let selected = service.policy().select(&witnesses, &[]).await.unwrap();

    let proven: Vec<WitnessRecord> = selected
        .iter()
        .map(|w| {
            let mut record = WitnessRecord::new(w, true);
            record.proof = b"proof".to_vec();
            record
        })
        .collect();

    assert!(service.policy().evaluate(&proven).await.unwrap());
}

#[tokio::test]
async fn test_widening_after_decline() {
    let service = service_with_policy("MinNumber(1,batch)", WitnessConfig::default()).await;

    let anchor = AnchorId::new("anchor-1");
    let witnesses = [
        batch("https://b1.example.com/service"),
        batch("https://b2.example.com/service"),
    ];

    let first = service.propose(&anchor, &witnesses, &[]).await.unwrap();
    assert_eq!(first.len(), 1);

    // The first pick declines; widen around it.
    let second = service
        .reselect(&anchor, &witnesses, &[first[0].uri.clone()])
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_ne!(second[0].uri, first[0].uri);

    let records = service.store().get(&anchor).await.unwrap();
    let replacement = records.iter().find(|r| r.uri == second[0].uri).unwrap();
    assert!(replacement.selected);
}

#[tokio::test]
async fn test_records_expire_for_abandoned_anchors() {
    let config = WitnessConfig {
        policy_cache_ttl_secs: 60,
        record_expiry_secs: 1,
        expiry_sweep_interval_secs: 1,
    };
    let service = service_with_policy("", config).await;
    service.start();

    let anchor = AnchorId::new("anchor-1");
    let witnesses = [batch("https://w1.example.com/service")];
    service.propose(&anchor, &witnesses, &[]).await.unwrap();

    // The driver never completes the anchor; the sweeper reclaims it.
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert!(service.witnessed(&anchor).await.unwrap_err().is_not_found());
    service.stop();
}
