//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: an in-memory Vault with a
//! seeded actor/patient directory.

use std::sync::Arc;

use medtrust::core::{
    now_millis, Actor, ActorId, ActorRole, Patient, PatientId, RecordId, SigningIdentity,
};
use medtrust::crypto::MasterKeyConfig;
use medtrust::store::{MemoryStore, Store};
use medtrust::{ClientInfo, MemoryBlobStore, Vault, VaultConfig};

/// Well-known actors seeded into every fixture.
pub mod actors {
    /// An attending physician.
    pub const PHYSICIAN: &str = "dr-wren";
    /// A second physician, initially without grants.
    pub const PHYSICIAN_2: &str = "dr-osei";
    /// A nurse.
    pub const NURSE: &str = "rn-adeyemi";
    /// A paramedic.
    pub const PARAMEDIC: &str = "medic-ray";
    /// The approving supervisor.
    pub const SUPERVISOR: &str = "sup-juno";
    /// The kernel's own service actor.
    pub const SERVICE: &str = "svc-kernel";
}

/// Well-known patients seeded into every fixture.
pub mod patients {
    /// The default patient.
    pub const DEFAULT: &str = "pat-ito";
    /// A second patient.
    pub const SECOND: &str = "pat-mbeki";
}

/// A test fixture wrapping a fully wired in-memory Vault.
pub struct TestFixture {
    /// The Vault under test.
    pub vault: Vault<MemoryStore>,
}

impl TestFixture {
    /// Create a fixture with a deterministic identity and master key.
    pub async fn new() -> Self {
        Self::with_seed([0x42; 32]).await
    }

    /// Create a fixture with a specific master key seed.
    pub async fn with_seed(master_key: [u8; 32]) -> Self {
        let store = MemoryStore::new();
        seed_directory(&store).await;

        let config = VaultConfig::new(
            MasterKeyConfig::envelope("mk-test", &master_key).expect("32-byte key"),
            ActorId::from(actors::SERVICE),
        );
        let vault = Vault::new(
            SigningIdentity::from_seed(&[0x99; 32]),
            store,
            Arc::new(MemoryBlobStore::new()),
            config,
        );

        Self { vault }
    }

    /// Create a record owned by the default physician.
    pub async fn make_record(&self, name: &str, body: &[u8]) -> RecordId {
        let record_id = RecordId::from(name);
        self.vault
            .create_record(
                record_id.clone(),
                PatientId::from(patients::DEFAULT),
                ActorId::from(actors::PHYSICIAN),
                body,
            )
            .await
            .expect("fixture record");
        record_id
    }

    /// Client info used across fixture-driven tests.
    pub fn client_info() -> ClientInfo {
        ClientInfo::new("198.51.100.4", "fixture-client/1.0")
    }
}

/// Seed the standard directory into any store.
pub async fn seed_directory<S: Store>(store: &S) {
    for (id, role) in [
        (actors::PHYSICIAN, ActorRole::Physician),
        (actors::PHYSICIAN_2, ActorRole::Physician),
        (actors::NURSE, ActorRole::Nurse),
        (actors::PARAMEDIC, ActorRole::Paramedic),
        (actors::SUPERVISOR, ActorRole::Supervisor),
    ] {
        store
            .upsert_actor(&Actor::new(ActorId::from(id), role))
            .await
            .expect("seed actor");
    }
    for id in [patients::DEFAULT, patients::SECOND] {
        store
            .upsert_patient(&Patient::new(PatientId::from(id)))
            .await
            .expect("seed patient");
    }
}

/// A timestamp safely in the future of any test run.
pub fn far_future() -> i64 {
    now_millis() + 365 * 24 * 60 * 60 * 1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use medtrust::core::UrgencyLevel;
    use medtrust::ActionType;

    #[tokio::test]
    async fn test_fixture_end_to_end() {
        let fixture = TestFixture::new().await;
        let record = fixture.make_record("record-smoke", b"smoke body").await;

        // Owner reads through a standing permission.
        let body = fixture
            .vault
            .read_record(&record, &ActorId::from(actors::PHYSICIAN))
            .await
            .unwrap();
        assert_eq!(body, b"smoke body");

        // Paramedic reaches it through the emergency path.
        let outcome = fixture
            .vault
            .emergency()
            .request_emergency_access(
                ActorId::from(actors::PARAMEDIC),
                PatientId::from(patients::DEFAULT),
                record.clone(),
                UrgencyLevel::Critical,
                "smoke test",
                &TestFixture::client_info(),
            )
            .await
            .unwrap();
        let body = fixture
            .vault
            .read_record_emergency(
                &outcome.access.access_id,
                &record,
                outcome.access.verification_code.as_str(),
                &TestFixture::client_info(),
            )
            .await
            .unwrap();
        assert_eq!(body, b"smoke body");

        // The nurse needs a grant first.
        let requested = fixture
            .vault
            .access()
            .request(
                record.clone(),
                ActorId::from(actors::NURSE),
                ActorId::from(actors::PHYSICIAN),
                ActionType::Read,
            )
            .await
            .unwrap();
        fixture
            .vault
            .access()
            .grant(&requested.permission_id, Some(far_future()))
            .await
            .unwrap();
        fixture
            .vault
            .read_record(&record, &ActorId::from(actors::NURSE))
            .await
            .unwrap();
    }
}
