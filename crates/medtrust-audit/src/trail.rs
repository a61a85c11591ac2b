//! The audit trail: local append, batch sealing, batch verification.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use medtrust_core::{
    now_millis, AuditAction, AuditEvent, AuditEventBuilder, ContentHash, EventId, MerkleProof,
    MerkleTree, SealedBatch, SigningIdentity, VerifyingIdentity,
};
use medtrust_store::Store;

use crate::error::{AuditError, Result};
use crate::ledger::{Ledger, TX_PUBLISH_AUDIT_ROOT};

/// How long a ledger publication may take before it is abandoned.
const LEDGER_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of events pulled into one sealed batch.
pub const DEFAULT_BATCH_LIMIT: usize = 256;

/// The append-only audit trail.
///
/// Constructed once at startup with the service signing identity and an
/// optional ledger collaborator, then shared by reference.
pub struct AuditTrail<S> {
    store: Arc<S>,
    signer: SigningIdentity,
    ledger: Option<Arc<dyn Ledger>>,
}

impl<S: Store> AuditTrail<S> {
    /// Create a trail over a store, without ledger publication.
    pub fn new(store: Arc<S>, signer: SigningIdentity) -> Self {
        Self {
            store,
            signer,
            ledger: None,
        }
    }

    /// Attach a ledger collaborator for root publication.
    pub fn with_ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// The identity whose signatures cover sealed roots.
    pub fn verifying_identity(&self) -> VerifyingIdentity {
        self.signer.verifying()
    }

    /// Append an event to the local trail.
    ///
    /// This is the hot path of every security decision: it writes locally
    /// and returns. Ledger publication happens only at sealing time.
    pub async fn log_event(&self, event: AuditEvent) -> Result<()> {
        debug!(
            event = %event.event_id,
            action = ?event.action,
            resource = %event.resource_id,
            "audit event"
        );
        self.store.append_event(&event).await?;
        Ok(())
    }

    /// Seal an explicit batch of events into a signed Merkle root.
    ///
    /// The root commits to the events in the given order. The seal is
    /// recorded locally first; publication to the ledger is best-effort
    /// and its failure does not undo the seal.
    pub async fn seal_batch(&self, events: &[AuditEvent]) -> Result<SealedBatch> {
        if events.is_empty() {
            return Err(AuditError::InvalidBatch("empty batch".into()));
        }

        let leaves: Vec<ContentHash> = events.iter().map(AuditEvent::leaf_hash).collect();
        let tree = MerkleTree::build(&leaves);
        let root = tree.root();

        let batch = SealedBatch {
            root,
            signature: self.signer.sign_root(&root),
            event_count: events.len() as u32,
            sealed_at: now_millis(),
        };

        let ids: Vec<EventId> = events.iter().map(|e| e.event_id).collect();
        self.store.record_seal(&batch, &ids).await?;
        info!(root = %root.to_hex(), events = batch.event_count, "sealed audit batch");

        self.publish_root(&batch).await;
        Ok(batch)
    }

    /// Seal whatever has accumulated since the last seal.
    ///
    /// Returns None when there is nothing to seal. Intended for the
    /// periodic reconciliation job; correctness never depends on it
    /// running.
    pub async fn seal_pending(&self, limit: usize) -> Result<Option<SealedBatch>> {
        let events = self.store.unsealed_events(limit).await?;
        if events.is_empty() {
            return Ok(None);
        }
        let batch = self.seal_batch(&events).await?;
        Ok(Some(batch))
    }

    /// Rebuild a batch and compare to a previously published root.
    ///
    /// The batch must be supplied in the order it was sealed. Any
    /// mutation, reordering, insertion or deletion flips the result.
    pub fn verify_batch_integrity(root: &ContentHash, batch: &[AuditEvent]) -> bool {
        let leaves: Vec<ContentHash> = batch.iter().map(AuditEvent::leaf_hash).collect();
        MerkleTree::build(&leaves).root() == *root
    }

    /// Verify a stored seal: recompute the root from the stored events
    /// and check the service signature over it.
    pub async fn verify_seal(&self, root: &ContentHash) -> Result<bool> {
        let batch = self
            .store
            .get_seal(root)
            .await?
            .ok_or_else(|| AuditError::UnknownSeal(root.to_hex()))?;

        let events = self.store.events_for_seal(root).await?;
        if !Self::verify_batch_integrity(root, &events) {
            return Ok(false);
        }
        Ok(self
            .signer
            .verifying()
            .verify_root(root, &batch.signature)
            .is_ok())
    }

    /// Inclusion proof for one event under a sealed root.
    pub async fn prove_event_inclusion(
        &self,
        root: &ContentHash,
        event_id: &EventId,
    ) -> Result<Option<MerkleProof>> {
        let events = self.store.events_for_seal(root).await?;
        let leaves: Vec<ContentHash> = events.iter().map(AuditEvent::leaf_hash).collect();
        let tree = MerkleTree::build(&leaves);
        Ok(tree.prove_inclusion(&ContentHash(event_id.0)))
    }

    /// Events touching a resource, oldest first.
    pub async fn events_for_resource(&self, resource_id: &str) -> Result<Vec<AuditEvent>> {
        Ok(self.store.events_for_resource(resource_id).await?)
    }

    /// Publish a sealed root to the ledger, best-effort.
    ///
    /// Timeouts and failures are warnings; the local seal stands.
    async fn publish_root(&self, batch: &SealedBatch) {
        let Some(ledger) = &self.ledger else {
            return;
        };

        let args = vec![
            batch.root.to_hex(),
            batch.signature.to_hex(),
            batch.event_count.to_string(),
            batch.sealed_at.to_string(),
        ];

        match tokio::time::timeout(LEDGER_TIMEOUT, ledger.submit(TX_PUBLISH_AUDIT_ROOT, &args))
            .await
        {
            Ok(Ok(tx_id)) => {
                info!(root = %batch.root.to_hex(), tx = %tx_id, "audit root published");
            }
            Ok(Err(e)) => {
                warn!(root = %batch.root.to_hex(), error = %e, "audit root publication failed");
            }
            Err(_) => {
                warn!(root = %batch.root.to_hex(), "audit root publication timed out");
            }
        }
    }

    /// Log that a batch was sealed, as its own audit event.
    ///
    /// Lands in the next batch, chaining the seals together.
    pub async fn log_seal_event(
        &self,
        service_actor: medtrust_core::ActorId,
        batch: &SealedBatch,
    ) -> Result<()> {
        let event = AuditEventBuilder::new(
            service_actor,
            AuditAction::BatchSealed,
            batch.root.to_hex(),
        )
        .details(&serde_json::json!({
            "event_count": batch.event_count,
            "sealed_at": batch.sealed_at,
        }))
        .build();
        self.log_event(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use medtrust_core::{ActorId, AuditResult};
    use medtrust_store::MemoryStore;

    struct RecordingLedger {
        submissions: Mutex<Vec<(String, Vec<String>)>>,
        fail: bool,
    }

    impl RecordingLedger {
        fn new(fail: bool) -> Self {
            Self {
                submissions: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl Ledger for RecordingLedger {
        async fn submit(&self, transaction: &str, args: &[String]) -> anyhow::Result<String> {
            if self.fail {
                anyhow::bail!("gateway unreachable");
            }
            self.submissions
                .lock()
                .unwrap()
                .push((transaction.to_string(), args.to_vec()));
            Ok("tx-1".into())
        }

        async fn evaluate(&self, _transaction: &str, _args: &[String]) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    fn make_events(n: usize) -> Vec<AuditEvent> {
        (0..n)
            .map(|i| {
                AuditEventBuilder::new(
                    ActorId::from("dr-wren"),
                    AuditAction::AccessChecked,
                    format!("record-{i}"),
                )
                .result(AuditResult::Success)
                .build()
            })
            .collect()
    }

    fn trail(store: Arc<MemoryStore>) -> AuditTrail<MemoryStore> {
        AuditTrail::new(store, SigningIdentity::from_seed(&[9u8; 32]))
    }

    #[tokio::test]
    async fn test_seal_and_verify_roundtrip() {
        let store = Arc::new(MemoryStore::new());
        let trail = trail(store.clone());

        let events = make_events(5);
        for event in &events {
            trail.log_event(event.clone()).await.unwrap();
        }

        let batch = trail.seal_pending(100).await.unwrap().unwrap();
        assert_eq!(batch.event_count, 5);
        assert!(AuditTrail::<MemoryStore>::verify_batch_integrity(
            &batch.root,
            &events
        ));
        assert!(trail.verify_seal(&batch.root).await.unwrap());
    }

    #[tokio::test]
    async fn test_tampered_batch_fails_verification() {
        let store = Arc::new(MemoryStore::new());
        let trail = trail(store);

        let events = make_events(4);
        let batch = trail.seal_batch(&events).await.unwrap();

        let mut tampered = events.clone();
        tampered[2] = AuditEventBuilder::new(
            ActorId::from("mallory"),
            AuditAction::AccessChecked,
            "record-2",
        )
        .build();
        assert!(!AuditTrail::<MemoryStore>::verify_batch_integrity(
            &batch.root,
            &tampered
        ));

        let mut reordered = events.clone();
        reordered.swap(0, 1);
        assert!(!AuditTrail::<MemoryStore>::verify_batch_integrity(
            &batch.root,
            &reordered
        ));
    }

    #[tokio::test]
    async fn test_event_inclusion_proof() {
        let store = Arc::new(MemoryStore::new());
        let trail = trail(store);

        let events = make_events(7);
        let batch = trail.seal_batch(&events).await.unwrap();

        let proof = trail
            .prove_event_inclusion(&batch.root, &events[3].event_id)
            .await
            .unwrap()
            .unwrap();
        assert!(MerkleTree::verify(&batch.root, &proof));
    }

    #[tokio::test]
    async fn test_publication_is_best_effort() {
        let store = Arc::new(MemoryStore::new());
        let failing = Arc::new(RecordingLedger::new(true));
        let trail = trail(store.clone()).with_ledger(failing);

        // Sealing succeeds even though the ledger is down.
        let events = make_events(3);
        let batch = trail.seal_batch(&events).await.unwrap();
        assert!(trail.verify_seal(&batch.root).await.unwrap());
    }

    #[tokio::test]
    async fn test_publication_reaches_ledger() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(RecordingLedger::new(false));
        let trail = trail(store).with_ledger(ledger.clone());

        let batch = trail.seal_batch(&make_events(2)).await.unwrap();

        let submissions = ledger.submissions.lock().unwrap();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].0, TX_PUBLISH_AUDIT_ROOT);
        assert_eq!(submissions[0].1[0], batch.root.to_hex());
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let store = Arc::new(MemoryStore::new());
        let trail = trail(store);
        assert!(trail.seal_batch(&[]).await.is_err());
        assert!(trail.seal_pending(10).await.unwrap().is_none());
    }
}
