//! Proptest generators for property-based testing.

use proptest::prelude::*;

use medtrust::core::{
    ActionType, ActorId, AuditAction, AuditEvent, AuditEventBuilder, AuditResult, ContentHash,
    PatientId, RecordId, UrgencyLevel,
};

/// Generate a random content hash.
pub fn content_hash() -> impl Strategy<Value = ContentHash> {
    any::<[u8; 32]>().prop_map(ContentHash::from_bytes)
}

/// Generate an ordered set of Merkle leaves.
pub fn leaves(max: usize) -> impl Strategy<Value = Vec<ContentHash>> {
    proptest::collection::vec(content_hash(), 0..max)
}

/// Generate a record body.
pub fn plaintext() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..4096)
}

/// Generate a record id.
pub fn record_id() -> impl Strategy<Value = RecordId> {
    "[a-z0-9]{8,16}".prop_map(|s| RecordId::new(format!("rec-{s}")))
}

/// Generate an actor id.
pub fn actor_id() -> impl Strategy<Value = ActorId> {
    "[a-z]{4,12}".prop_map(|s| ActorId::new(format!("act-{s}")))
}

/// Generate a patient id.
pub fn patient_id() -> impl Strategy<Value = PatientId> {
    "[a-z]{4,12}".prop_map(|s| PatientId::new(format!("pat-{s}")))
}

/// Generate an action type.
pub fn action_type() -> impl Strategy<Value = ActionType> {
    prop_oneof![
        Just(ActionType::Read),
        Just(ActionType::Write),
        Just(ActionType::Share),
        Just(ActionType::Delete),
    ]
}

/// Generate an urgency level.
pub fn urgency_level() -> impl Strategy<Value = UrgencyLevel> {
    prop_oneof![
        Just(UrgencyLevel::Low),
        Just(UrgencyLevel::Medium),
        Just(UrgencyLevel::High),
        Just(UrgencyLevel::Critical),
    ]
}

/// Generate an audit event with arbitrary content.
pub fn audit_event() -> impl Strategy<Value = AuditEvent> {
    (actor_id(), record_id(), any::<bool>(), 0i64..=i64::MAX / 2).prop_map(
        |(actor, record, success, ts)| {
            AuditEventBuilder::new(actor, AuditAction::AccessChecked, record.as_str())
                .result(if success {
                    AuditResult::Success
                } else {
                    AuditResult::Failure
                })
                .timestamp(ts)
                .build()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use medtrust::MerkleTree;

    proptest! {
        /// Every leaf of every tree proves inclusion against the root.
        #[test]
        fn prop_merkle_inclusion(set in leaves(64)) {
            let tree = MerkleTree::build(&set);
            let root = tree.root();
            for (i, _) in set.iter().enumerate() {
                let proof = tree.prove_index(i);
                prop_assert!(MerkleTree::verify(&root, &proof));
            }
        }

        /// Flipping one byte of a proof's leaf breaks verification.
        #[test]
        fn prop_merkle_tamper_detected(
            set in leaves(64).prop_filter("need leaves", |s| !s.is_empty()),
            byte in any::<u8>(),
            flip in 1u8..=255,
        ) {
            let tree = MerkleTree::build(&set);
            let root = tree.root();
            let mut proof = tree.prove_index(byte as usize % set.len());

            let mut bytes = *proof.leaf_hash.as_bytes();
            bytes[byte as usize % 32] ^= flip;
            proof.leaf_hash = ContentHash::from_bytes(bytes);

            prop_assert!(!MerkleTree::verify(&root, &proof));
        }

        /// Event ids are stable content addresses.
        #[test]
        fn prop_event_id_recomputes(event in audit_event()) {
            prop_assert_eq!(event.event_id, event.compute_id());
        }
    }
}
