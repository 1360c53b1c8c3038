//! Ordered Merkle proof verification for manifest roots.
//!
//! The manifest builder assigns each sibling an explicit left/right
//! position, and proofs carry one direction bit per level. Verification
//! combines hashes strictly in the supplied order: a proof that uses the
//! wrong direction bit at any level fails even when the same hashes in the
//! opposite order would reach the root. This asymmetry is load-bearing for
//! round-trip compatibility with the off-instance builder.
//!
//! # Example
//!
//! ```
//! use switchyard_core::crypto::hash_content;
//! use switchyard_core::merkle::{ManifestTree, verify_leaf};
//!
//! let leaves = vec![
//!     hash_content(b"leaf-0"),
//!     hash_content(b"leaf-1"),
//!     hash_content(b"leaf-2"),
//! ];
//! let tree = ManifestTree::from_leaves(leaves.clone()).unwrap();
//! let proof = tree.prove(1).unwrap();
//! assert!(verify_leaf(&tree.root(), &leaves[1], &proof).is_ok());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{Hash, MANIFEST_LEAF_DOMAIN, node_hash};

/// Maximum number of levels a proof may carry.
///
/// Bounds both verification work and the size of manifests an instance
/// will accept (2^32 leaves is far beyond any real manifest).
pub const MAX_PROOF_DEPTH: usize = 32;

/// Position of the supplied sibling at one proof level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub enum Side {
    /// The sibling is the left operand; the running hash is the right.
    Left,
    /// The sibling is the right operand; the running hash is the left.
    Right,
}

impl Side {
    /// Returns the opposite side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Errors that can occur while validating or verifying a proof.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProofError {
    /// The sibling and direction vectors have different lengths.
    #[error("malformed proof: {siblings} siblings but {directions} direction bits")]
    LengthMismatch {
        /// Number of sibling hashes supplied.
        siblings: usize,
        /// Number of direction bits supplied.
        directions: usize,
    },

    /// The proof exceeds the maximum supported depth.
    #[error("proof too deep: {depth} levels exceeds maximum of {max}")]
    TooDeep {
        /// Levels in the supplied proof.
        depth: usize,
        /// Maximum accepted depth.
        max: usize,
    },

    /// The recombined hash does not equal the target root.
    #[error("root mismatch: expected {expected}, computed {computed}")]
    RootMismatch {
        /// The committed root, hex encoded.
        expected: String,
        /// The hash the proof actually reaches, hex encoded.
        computed: String,
    },

    /// A tree cannot be built over zero leaves.
    #[error("manifest tree requires at least one leaf")]
    EmptyTree,

    /// The requested leaf index is outside the tree.
    #[error("leaf index {index} out of range: tree has {leaves} leaves")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of leaves in the tree.
        leaves: usize,
    },
}

/// A Merkle proof with explicit per-level direction bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectedProof {
    /// Sibling hashes, leaf level first.
    pub siblings: Vec<Hash>,
    /// Direction bit for each level, parallel to `siblings`.
    pub directions: Vec<Side>,
}

impl DirectedProof {
    /// Creates a proof from parallel sibling and direction vectors.
    #[must_use]
    pub const fn new(siblings: Vec<Hash>, directions: Vec<Side>) -> Self {
        Self {
            siblings,
            directions,
        }
    }

    /// Number of levels in the proof.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.siblings.len()
    }

    /// Checks structural well-formedness without touching a root.
    ///
    /// # Errors
    ///
    /// Returns [`ProofError::LengthMismatch`] if the vectors differ in
    /// length, or [`ProofError::TooDeep`] past [`MAX_PROOF_DEPTH`].
    pub fn validate(&self) -> Result<(), ProofError> {
        if self.siblings.len() != self.directions.len() {
            return Err(ProofError::LengthMismatch {
                siblings: self.siblings.len(),
                directions: self.directions.len(),
            });
        }
        if self.siblings.len() > MAX_PROOF_DEPTH {
            return Err(ProofError::TooDeep {
                depth: self.siblings.len(),
                max: MAX_PROOF_DEPTH,
            });
        }
        Ok(())
    }
}

/// Verifies that `leaf` belongs to the tree committed to by `root`.
///
/// Walks the proof bottom-up, combining the running hash with each sibling
/// in the order its direction bit dictates.
///
/// # Errors
///
/// Returns [`ProofError`] if the proof is malformed, too deep, or does not
/// reach `root`.
pub fn verify_leaf(root: &Hash, leaf: &Hash, proof: &DirectedProof) -> Result<(), ProofError> {
    proof.validate()?;

    let mut current = *leaf;
    for (sibling, side) in proof.siblings.iter().zip(proof.directions.iter()) {
        current = match side {
            Side::Left => node_hash(sibling, &current),
            Side::Right => node_hash(&current, sibling),
        };
    }

    if current != *root {
        return Err(ProofError::RootMismatch {
            expected: hex::encode(root),
            computed: hex::encode(current),
        });
    }
    Ok(())
}

/// A complete manifest tree with explicit left/right layout.
///
/// Mirrors the off-instance builder: leaves are padded to the next power
/// of two with a domain-separated empty leaf, and every interior node
/// hashes its children in positional order.
#[derive(Debug, Clone)]
pub struct ManifestTree {
    layers: Vec<Vec<Hash>>,
    leaf_count: usize,
}

impl ManifestTree {
    /// Builds a tree over the given leaf hashes.
    ///
    /// # Errors
    ///
    /// Returns [`ProofError::EmptyTree`] for zero leaves and
    /// [`ProofError::TooDeep`] if the padded tree would exceed
    /// [`MAX_PROOF_DEPTH`] levels.
    pub fn from_leaves(mut leaves: Vec<Hash>) -> Result<Self, ProofError> {
        if leaves.is_empty() {
            return Err(ProofError::EmptyTree);
        }

        let leaf_count = leaves.len();
        let padded = leaf_count.next_power_of_two();
        let depth = padded.trailing_zeros() as usize;
        if depth > MAX_PROOF_DEPTH {
            return Err(ProofError::TooDeep {
                depth,
                max: MAX_PROOF_DEPTH,
            });
        }
        leaves.resize(padded, empty_leaf());

        let mut layers = vec![leaves];
        while layers
            .last()
            .map(|layer| layer.len() > 1)
            .unwrap_or_default()
        {
            let previous = &layers[layers.len() - 1];
            let next: Vec<Hash> = previous
                .chunks_exact(2)
                .map(|pair| node_hash(&pair[0], &pair[1]))
                .collect();
            layers.push(next);
        }

        Ok(Self { layers, leaf_count })
    }

    /// The root committed to by this tree.
    #[must_use]
    pub fn root(&self) -> Hash {
        // from_leaves guarantees a non-empty final layer.
        self.layers[self.layers.len() - 1][0]
    }

    /// Number of original (unpadded) leaves.
    #[must_use]
    pub const fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Tree depth in levels.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.layers.len() - 1
    }

    /// Produces the directed proof for the leaf at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ProofError::IndexOutOfRange`] if `index` does not name an
    /// original leaf.
    pub fn prove(&self, index: usize) -> Result<DirectedProof, ProofError> {
        if index >= self.leaf_count {
            return Err(ProofError::IndexOutOfRange {
                index,
                leaves: self.leaf_count,
            });
        }

        let mut siblings = Vec::with_capacity(self.depth());
        let mut directions = Vec::with_capacity(self.depth());
        let mut position = index;
        for layer in &self.layers[..self.layers.len() - 1] {
            if position % 2 == 0 {
                siblings.push(layer[position + 1]);
                directions.push(Side::Right);
            } else {
                siblings.push(layer[position - 1]);
                directions.push(Side::Left);
            }
            position /= 2;
        }

        Ok(DirectedProof::new(siblings, directions))
    }
}

/// The padding leaf used for non-power-of-two manifests.
#[must_use]
pub fn empty_leaf() -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(MANIFEST_LEAF_DOMAIN);
    hasher.update(b"empty");
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_content;

    fn sample_leaves(n: usize) -> Vec<Hash> {
        (0..n)
            .map(|i| hash_content(format!("leaf-{i}").as_bytes()))
            .collect()
    }

    #[test]
    fn single_leaf_tree_has_leaf_as_root() {
        let leaves = sample_leaves(1);
        let tree = ManifestTree::from_leaves(leaves.clone()).unwrap();
        assert_eq!(tree.root(), leaves[0]);
        assert_eq!(tree.depth(), 0);

        let proof = tree.prove(0).unwrap();
        assert_eq!(proof.depth(), 0);
        assert!(verify_leaf(&tree.root(), &leaves[0], &proof).is_ok());
    }

    #[test]
    fn every_leaf_verifies() {
        for n in [2usize, 3, 5, 8, 13] {
            let leaves = sample_leaves(n);
            let tree = ManifestTree::from_leaves(leaves.clone()).unwrap();
            for (i, leaf) in leaves.iter().enumerate() {
                let proof = tree.prove(i).unwrap();
                verify_leaf(&tree.root(), leaf, &proof)
                    .unwrap_or_else(|e| panic!("leaf {i} of {n} failed: {e}"));
            }
        }
    }

    #[test]
    fn flipped_direction_bit_fails() {
        let leaves = sample_leaves(4);
        let tree = ManifestTree::from_leaves(leaves.clone()).unwrap();
        let mut proof = tree.prove(2).unwrap();
        proof.directions[0] = proof.directions[0].opposite();

        let err = verify_leaf(&tree.root(), &leaves[2], &proof).unwrap_err();
        assert!(matches!(err, ProofError::RootMismatch { .. }));
    }

    #[test]
    fn tampered_sibling_fails() {
        let leaves = sample_leaves(4);
        let tree = ManifestTree::from_leaves(leaves.clone()).unwrap();
        let mut proof = tree.prove(0).unwrap();
        proof.siblings[1] = hash_content(b"forged");

        let err = verify_leaf(&tree.root(), &leaves[0], &proof).unwrap_err();
        assert!(matches!(err, ProofError::RootMismatch { .. }));
    }

    #[test]
    fn wrong_leaf_fails() {
        let leaves = sample_leaves(4);
        let tree = ManifestTree::from_leaves(leaves.clone()).unwrap();
        let proof = tree.prove(0).unwrap();
        let err = verify_leaf(&tree.root(), &leaves[1], &proof).unwrap_err();
        assert!(matches!(err, ProofError::RootMismatch { .. }));
    }

    #[test]
    fn length_mismatch_is_rejected_before_hashing() {
        let leaves = sample_leaves(4);
        let tree = ManifestTree::from_leaves(leaves.clone()).unwrap();
        let mut proof = tree.prove(0).unwrap();
        proof.directions.pop();

        let err = verify_leaf(&tree.root(), &leaves[0], &proof).unwrap_err();
        assert_eq!(
            err,
            ProofError::LengthMismatch {
                siblings: 2,
                directions: 1
            }
        );
    }

    #[test]
    fn oversized_proof_is_rejected() {
        let proof = DirectedProof::new(
            vec![[0u8; 32]; MAX_PROOF_DEPTH + 1],
            vec![Side::Left; MAX_PROOF_DEPTH + 1],
        );
        let err = proof.validate().unwrap_err();
        assert!(matches!(err, ProofError::TooDeep { .. }));
    }

    #[test]
    fn prove_rejects_padding_indices() {
        let leaves = sample_leaves(3);
        let tree = ManifestTree::from_leaves(leaves).unwrap();
        let err = tree.prove(3).unwrap_err();
        assert_eq!(
            err,
            ProofError::IndexOutOfRange {
                index: 3,
                leaves: 3
            }
        );
    }

    #[test]
    fn empty_tree_is_rejected() {
        assert_eq!(
            ManifestTree::from_leaves(Vec::new()).unwrap_err(),
            ProofError::EmptyTree
        );
    }
}
