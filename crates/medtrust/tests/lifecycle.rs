//! End-to-end permission lifecycle and decrypt gating.

use std::sync::Arc;

use medtrust::core::{
    now_millis, Actor, ActorId, ActorRole, Patient, PatientId, RecordId, SigningIdentity,
};
use medtrust::crypto::MasterKeyConfig;
use medtrust::store::{MemoryStore, Store};
use medtrust::{ActionType, MemoryBlobStore, Vault, VaultConfig, VaultError};

const BODY: &[u8] = b"hx: type 1 diabetes; rx: insulin glargine 20u nightly";

async fn vault() -> Vault<MemoryStore> {
    let store = MemoryStore::new();
    store
        .upsert_actor(&Actor::new(ActorId::from("dr-wren"), ActorRole::Physician))
        .await
        .unwrap();
    store
        .upsert_actor(&Actor::new(ActorId::from("dr-osei"), ActorRole::Physician))
        .await
        .unwrap();
    store
        .upsert_patient(&Patient::new(PatientId::from("pat-ito")))
        .await
        .unwrap();

    let config = VaultConfig::new(
        MasterKeyConfig::envelope("mk-1", &[0x42; 32]).unwrap(),
        ActorId::from("svc-kernel"),
    );
    Vault::new(
        SigningIdentity::from_seed(&[7u8; 32]),
        store,
        Arc::new(MemoryBlobStore::new()),
        config,
    )
}

#[tokio::test]
async fn owner_can_read_own_record() {
    let vault = vault().await;
    let record = RecordId::from("record-1");

    vault
        .create_record(
            record.clone(),
            PatientId::from("pat-ito"),
            ActorId::from("dr-wren"),
            BODY,
        )
        .await
        .unwrap();

    let plaintext = vault
        .read_record(&record, &ActorId::from("dr-wren"))
        .await
        .unwrap();
    assert_eq!(plaintext, BODY);
}

#[tokio::test]
async fn stranger_is_denied_until_granted() {
    let vault = vault().await;
    let record = RecordId::from("record-1");
    let stranger = ActorId::from("dr-osei");

    vault
        .create_record(
            record.clone(),
            PatientId::from("pat-ito"),
            ActorId::from("dr-wren"),
            BODY,
        )
        .await
        .unwrap();

    // Before grant: denied with the generic message.
    let err = vault.read_record(&record, &stranger).await.unwrap_err();
    assert_eq!(err.to_string(), "Access denied");

    // Request + grant, then access works.
    let requested = vault
        .access()
        .request(
            record.clone(),
            stranger.clone(),
            ActorId::from("dr-wren"),
            ActionType::Read,
        )
        .await
        .unwrap();
    vault
        .access()
        .grant(&requested.permission_id, None)
        .await
        .unwrap();
    assert_eq!(vault.read_record(&record, &stranger).await.unwrap(), BODY);

    // Revoke: denied again, immediately.
    vault
        .access()
        .revoke(&requested.permission_id)
        .await
        .unwrap();
    assert!(vault.read_record(&record, &stranger).await.is_err());
}

#[tokio::test]
async fn expired_grant_denies_without_a_sweep() {
    let vault = vault().await;
    let record = RecordId::from("record-1");
    let stranger = ActorId::from("dr-osei");

    vault
        .create_record(
            record.clone(),
            PatientId::from("pat-ito"),
            ActorId::from("dr-wren"),
            BODY,
        )
        .await
        .unwrap();

    let requested = vault
        .access()
        .request(
            record.clone(),
            stranger.clone(),
            ActorId::from("dr-wren"),
            ActionType::Read,
        )
        .await
        .unwrap();
    vault
        .access()
        .grant(&requested.permission_id, Some(now_millis() + 200))
        .await
        .unwrap();
    assert!(vault.read_record(&record, &stranger).await.is_ok());

    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    // No background job ran; the lazy check alone must deny.
    assert!(vault.read_record(&record, &stranger).await.is_err());
}

#[tokio::test]
async fn update_requires_write_permission() {
    let vault = vault().await;
    let record = RecordId::from("record-1");

    let created = vault
        .create_record(
            record.clone(),
            PatientId::from("pat-ito"),
            ActorId::from("dr-wren"),
            BODY,
        )
        .await
        .unwrap();
    assert_eq!(created.version, 1);

    // A reader without write permission cannot update.
    assert!(vault
        .update_record(&record, &ActorId::from("dr-osei"), b"tampered")
        .await
        .is_err());

    let updated = vault
        .update_record(&record, &ActorId::from("dr-wren"), b"rx adjusted: 22u nightly")
        .await
        .unwrap();
    assert_eq!(updated.version, 2);

    let plaintext = vault
        .read_record(&record, &ActorId::from("dr-wren"))
        .await
        .unwrap();
    assert_eq!(plaintext, b"rx adjusted: 22u nightly");
}

#[tokio::test]
async fn rotation_preserves_access_and_retires_old_key() {
    let vault = vault().await;
    let record = RecordId::from("record-1");

    vault
        .create_record(
            record.clone(),
            PatientId::from("pat-ito"),
            ActorId::from("dr-wren"),
            BODY,
        )
        .await
        .unwrap();

    let rotated = vault
        .rotate_master_key(MasterKeyConfig::envelope("mk-2", &[0x43; 32]).unwrap())
        .await
        .unwrap();
    assert_eq!(rotated, 1);

    // Bodies were never re-encrypted, yet reads still work.
    assert_eq!(
        vault
            .read_record(&record, &ActorId::from("dr-wren"))
            .await
            .unwrap(),
        BODY
    );

    // Rotating again from the new key also works.
    vault
        .rotate_master_key(MasterKeyConfig::envelope("mk-3", &[0x44; 32]).unwrap())
        .await
        .unwrap();
    assert_eq!(
        vault
            .read_record(&record, &ActorId::from("dr-wren"))
            .await
            .unwrap(),
        BODY
    );
}

#[tokio::test]
async fn integrity_check_and_patient_listing() {
    let vault = vault().await;
    let patient = PatientId::from("pat-ito");

    let meta = vault
        .create_record(
            RecordId::from("record-1"),
            patient.clone(),
            ActorId::from("dr-wren"),
            BODY,
        )
        .await
        .unwrap();
    vault
        .create_record(
            RecordId::from("record-2"),
            patient.clone(),
            ActorId::from("dr-wren"),
            b"imaging: chest x-ray clear",
        )
        .await
        .unwrap();

    assert!(vault
        .verify_record_integrity(
            &meta.record_id,
            &ActorId::from("dr-wren"),
            &meta.content_hash,
        )
        .await
        .unwrap());
    assert!(!vault
        .verify_record_integrity(
            &meta.record_id,
            &ActorId::from("dr-wren"),
            &medtrust::ContentHash::hash(b"forged"),
        )
        .await
        .unwrap());

    let records = vault.records_for_patient(&patient).await.unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn unknown_record_is_not_found() {
    let vault = vault().await;
    let err = vault
        .read_record(&RecordId::from("record-missing"), &ActorId::from("dr-wren"))
        .await
        .unwrap_err();
    // Denied before existence is revealed: no permission can match an
    // unknown record.
    assert!(matches!(err, VaultError::Access(_)));
}
