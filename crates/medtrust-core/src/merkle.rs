//! Merkle commitments over ordered leaf hashes.
//!
//! Batches of audit events (and record content hashes) are committed to a
//! single root that can be published externally. An inclusion proof lets a
//! verifier confirm membership of one leaf without the full batch.
//!
//! Construction rules, which must match between build and verify:
//! - leaves are combined pairwise, blake3(left || right), bottom-up
//! - an odd node at any level is paired with itself
//! - zero leaves produce the [`ContentHash::ZERO`] sentinel root
//! - a single leaf IS the root (no combination step)

use serde::{Deserialize, Serialize};

use crate::crypto::ContentHash;

/// Which side a sibling hash sits on when recombining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Sibling is the left input of the parent hash.
    Left,
    /// Sibling is the right input of the parent hash.
    Right,
}

/// An inclusion proof: the target leaf and the sibling hash at each level
/// up to the root.
///
/// Valid only against the specific root it was generated for. Any change
/// to the leaf, a sibling, or a side flips verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// The leaf being proven.
    pub leaf_hash: ContentHash,

    /// Sibling hash and side per level, leaf-adjacent first.
    pub sibling_path: Vec<(ContentHash, Side)>,
}

impl MerkleProof {
    /// Recompute the root this proof commits to.
    pub fn compute_root(&self) -> ContentHash {
        let mut current = self.leaf_hash;
        for (sibling, side) in &self.sibling_path {
            current = match side {
                Side::Left => ContentHash::combine(sibling, &current),
                Side::Right => ContentHash::combine(&current, sibling),
            };
        }
        current
    }
}

/// A Merkle tree built over an ordered list of leaf hashes.
///
/// The full node set is retained so proofs can be generated without
/// rebuilding.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// levels[0] are the leaves; the last level holds the single root.
    levels: Vec<Vec<ContentHash>>,
}

impl MerkleTree {
    /// Build a tree from ordered leaf hashes.
    pub fn build(leaves: &[ContentHash]) -> Self {
        if leaves.is_empty() {
            return Self { levels: Vec::new() };
        }

        let mut levels = vec![leaves.to_vec()];
        while levels.last().map(Vec::len).unwrap_or(0) > 1 {
            let current = levels.last().expect("non-empty levels");
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in current.chunks(2) {
                let left = &pair[0];
                // Odd node pairs with itself.
                let right = pair.get(1).unwrap_or(left);
                next.push(ContentHash::combine(left, right));
            }
            levels.push(next);
        }

        Self { levels }
    }

    /// The committed root.
    ///
    /// Zero leaves yield the zero-hash sentinel; a single leaf yields that
    /// leaf's hash unchanged.
    pub fn root(&self) -> ContentHash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(ContentHash::ZERO)
    }

    /// Number of leaves committed.
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    /// Generate an inclusion proof for the first leaf equal to `target`.
    ///
    /// Returns None if the leaf is not in the tree.
    pub fn prove_inclusion(&self, target: &ContentHash) -> Option<MerkleProof> {
        let leaves = self.levels.first()?;
        let index = leaves.iter().position(|leaf| leaf == target)?;
        Some(self.prove_index(index))
    }

    /// Generate an inclusion proof for the leaf at `index`.
    ///
    /// Panics if `index` is out of bounds; callers hold the leaf list.
    pub fn prove_index(&self, index: usize) -> MerkleProof {
        let leaves = &self.levels[0];
        let leaf_hash = leaves[index];

        let mut sibling_path = Vec::new();
        let mut pos = index;
        // All levels except the root contribute one sibling.
        for level in &self.levels[..self.levels.len().saturating_sub(1)] {
            let (sibling_pos, side) = if pos % 2 == 0 {
                (pos + 1, Side::Right)
            } else {
                (pos - 1, Side::Left)
            };
            // An odd trailing node was paired with itself.
            let sibling = level.get(sibling_pos).copied().unwrap_or(level[pos]);
            sibling_path.push((sibling, side));
            pos /= 2;
        }

        MerkleProof {
            leaf_hash,
            sibling_path,
        }
    }

    /// Verify an inclusion proof against a root.
    ///
    /// Equality of the recomputed root is the only success criterion.
    pub fn verify(root: &ContentHash, proof: &MerkleProof) -> bool {
        proof.compute_root() == *root
    }
}
