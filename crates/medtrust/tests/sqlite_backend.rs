//! The full flow on the primary (SQLite) backend.

use std::sync::Arc;

use medtrust::core::{
    Actor, ActorId, ActorRole, Patient, PatientId, RecordId, SigningIdentity,
};
use medtrust::crypto::MasterKeyConfig;
use medtrust::store::{SqliteStore, Store};
use medtrust::{ActionType, MemoryBlobStore, Vault, VaultConfig};

const BODY: &[u8] = b"op note: laparoscopic appendectomy, no complications";

async fn vault(path: &std::path::Path) -> Vault<SqliteStore> {
    let store = SqliteStore::open(path).unwrap();
    store
        .upsert_actor(&Actor::new(ActorId::from("dr-wren"), ActorRole::Physician))
        .await
        .unwrap();
    store
        .upsert_actor(&Actor::new(ActorId::from("rn-adeyemi"), ActorRole::Nurse))
        .await
        .unwrap();
    store
        .upsert_patient(&Patient::new(PatientId::from("pat-ito")))
        .await
        .unwrap();

    let config = VaultConfig::new(
        MasterKeyConfig::envelope("mk-1", &[0x71; 32]).unwrap(),
        ActorId::from("svc-kernel"),
    );
    Vault::new(
        SigningIdentity::from_seed(&[13u8; 32]),
        store,
        Arc::new(MemoryBlobStore::new()),
        config,
    )
}

#[tokio::test]
async fn full_flow_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let vault = vault(&dir.path().join("kernel.db")).await;
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

    // Grant the nurse read access, exercise it, revoke it.
    let requested = vault
        .access()
        .request(
            record.clone(),
            ActorId::from("rn-adeyemi"),
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
    assert_eq!(
        vault
            .read_record(&record, &ActorId::from("rn-adeyemi"))
            .await
            .unwrap(),
        BODY
    );

    vault
        .access()
        .revoke(&requested.permission_id)
        .await
        .unwrap();
    assert!(vault
        .read_record(&record, &ActorId::from("rn-adeyemi"))
        .await
        .is_err());

    // Rotate the master key and read again.
    vault
        .rotate_master_key(MasterKeyConfig::envelope("mk-2", &[0x72; 32]).unwrap())
        .await
        .unwrap();
    assert_eq!(
        vault
            .read_record(&record, &ActorId::from("dr-wren"))
            .await
            .unwrap(),
        BODY
    );

    // Seal the accumulated trail and verify it from disk.
    let batch = vault.seal_audit_batch().await.unwrap().unwrap();
    assert!(vault.audit().verify_seal(&batch.root).await.unwrap());
}

#[tokio::test]
async fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kernel.db");
    let record = RecordId::from("record-1");

    {
        let vault = vault(&path).await;
        vault
            .create_record(
                record.clone(),
                PatientId::from("pat-ito"),
                ActorId::from("dr-wren"),
                BODY,
            )
            .await
            .unwrap();
    }

    // A fresh process over the same file sees the permissions and keys.
    let store = SqliteStore::open(&path).unwrap();
    let config = VaultConfig::new(
        MasterKeyConfig::envelope("mk-1", &[0x71; 32]).unwrap(),
        ActorId::from("svc-kernel"),
    );
    let vault = Vault::new(
        SigningIdentity::from_seed(&[13u8; 32]),
        store,
        Arc::new(MemoryBlobStore::new()),
        config,
    );

    // The blob store is empty in the new process, so the read fails at
    // the payload lookup, but the metadata and envelope key are present.
    assert!(vault.store().get_record(&record).await.unwrap().is_some());
    assert!(vault
        .store()
        .get_envelope_key(&record)
        .await
        .unwrap()
        .is_some());
}
