//! Audit sealing and tamper evidence, end to end.

use std::sync::Arc;

use medtrust::audit::AuditTrail;
use medtrust::core::{
    Actor, ActorId, ActorRole, Patient, PatientId, RecordId, SigningIdentity,
};
use medtrust::crypto::MasterKeyConfig;
use medtrust::store::{MemoryStore, Store};
use medtrust::{MemoryBlobStore, MerkleTree, Vault, VaultConfig};

async fn vault() -> Vault<MemoryStore> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let store = MemoryStore::new();
    store
        .upsert_actor(&Actor::new(ActorId::from("dr-wren"), ActorRole::Physician))
        .await
        .unwrap();
    store
        .upsert_patient(&Patient::new(PatientId::from("pat-ito")))
        .await
        .unwrap();

    let config = VaultConfig::new(
        MasterKeyConfig::envelope("mk-1", &[0x61; 32]).unwrap(),
        ActorId::from("svc-kernel"),
    );
    Vault::new(
        SigningIdentity::from_seed(&[11u8; 32]),
        store,
        Arc::new(MemoryBlobStore::new()),
        config,
    )
}

#[tokio::test]
async fn sealed_batch_verifies_and_detects_tampering() {
    let vault = vault().await;

    // Generate activity: creations, checks, denials.
    for i in 0..3 {
        vault
            .create_record(
                RecordId::from(format!("record-{i}")),
                PatientId::from("pat-ito"),
                ActorId::from("dr-wren"),
                format!("note {i}").as_bytes(),
            )
            .await
            .unwrap();
    }
    let _ = vault
        .read_record(&RecordId::from("record-0"), &ActorId::from("dr-osei"))
        .await;

    let batch = vault.seal_audit_batch().await.unwrap().unwrap();
    assert!(batch.event_count > 0);

    // The stored batch verifies against its root and signature.
    assert!(vault.audit().verify_seal(&batch.root).await.unwrap());

    // Rebuild from the stored events: same root.
    let events = vault.store().events_for_seal(&batch.root).await.unwrap();
    assert!(AuditTrail::<MemoryStore>::verify_batch_integrity(
        &batch.root,
        &events
    ));

    // Any single mutation breaks the commitment.
    let mut tampered = events.clone();
    tampered.pop();
    assert!(!AuditTrail::<MemoryStore>::verify_batch_integrity(
        &batch.root,
        &tampered
    ));

    // Individual events carry inclusion proofs against the root.
    let proof = vault
        .audit()
        .prove_event_inclusion(&batch.root, &events[0].event_id)
        .await
        .unwrap()
        .unwrap();
    assert!(MerkleTree::verify(&batch.root, &proof));
}

#[tokio::test]
async fn sealing_drains_and_chains() {
    let vault = vault().await;

    vault
        .create_record(
            RecordId::from("record-1"),
            PatientId::from("pat-ito"),
            ActorId::from("dr-wren"),
            b"note",
        )
        .await
        .unwrap();

    let first = vault.seal_audit_batch().await.unwrap().unwrap();

    // The seal's own audit event accumulates for the next batch, so a
    // second seal commits it and chains the batches together.
    let second = vault.seal_audit_batch().await.unwrap().unwrap();
    assert_ne!(first.root, second.root);

    let seal_events = vault.store().events_for_seal(&second.root).await.unwrap();
    assert!(seal_events
        .iter()
        .any(|e| e.resource_id == first.root.to_hex()));

    // Nothing left after the trailing seal event is committed next time.
    let unsealed = vault.store().unsealed_events(100).await.unwrap();
    assert_eq!(unsealed.len(), 1);
}

#[tokio::test]
async fn nothing_to_seal_returns_none() {
    let vault = vault().await;
    assert!(vault.seal_audit_batch().await.unwrap().is_none());
}
