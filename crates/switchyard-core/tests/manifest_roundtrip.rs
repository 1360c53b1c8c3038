//! Property tests: manifests built by the tree builder round-trip through
//! the directed verifier for every leaf, and any direction-bit corruption
//! is caught.

use proptest::prelude::*;

use switchyard_core::crypto::hash_content;
use switchyard_core::merkle::{ManifestTree, ProofError, verify_leaf};
use switchyard_core::routing::RouteEntry;
use switchyard_core::types::{Address, RouteKey};

fn arb_entry() -> impl Strategy<Value = RouteEntry> {
    (
        any::<[u8; 4]>(),
        any::<[u8; 32]>(),
        proptest::collection::vec(any::<u8>(), 0..64),
    )
        .prop_map(|(key, handler, code)| {
            RouteEntry::new(
                RouteKey::from_bytes(key),
                Address::from_bytes(handler),
                hash_content(&code),
            )
        })
}

proptest! {
    #[test]
    fn every_manifest_leaf_verifies_against_its_root(
        entries in proptest::collection::vec(arb_entry(), 1..40)
    ) {
        let leaves: Vec<_> = entries.iter().map(RouteEntry::leaf).collect();
        let tree = ManifestTree::from_leaves(leaves.clone()).unwrap();
        let root = tree.root();

        for (i, leaf) in leaves.iter().enumerate() {
            let proof = tree.prove(i).unwrap();
            prop_assert!(verify_leaf(&root, leaf, &proof).is_ok());
        }
    }

    #[test]
    fn any_flipped_direction_bit_fails_verification(
        entries in proptest::collection::vec(arb_entry(), 2..20),
        leaf_selector in any::<prop::sample::Index>(),
        level_selector in any::<prop::sample::Index>(),
    ) {
        let leaves: Vec<_> = entries.iter().map(RouteEntry::leaf).collect();
        let tree = ManifestTree::from_leaves(leaves.clone()).unwrap();
        let root = tree.root();

        let index = leaf_selector.index(leaves.len());
        let mut proof = tree.prove(index).unwrap();
        prop_assume!(!proof.directions.is_empty());

        let level = level_selector.index(proof.directions.len());
        proof.directions[level] = proof.directions[level].opposite();

        let is_root_mismatch = matches!(
            verify_leaf(&root, &leaves[index], &proof),
            Err(ProofError::RootMismatch { .. })
        );
        prop_assert!(is_root_mismatch);
    }

    #[test]
    fn any_tampered_sibling_fails_verification(
        entries in proptest::collection::vec(arb_entry(), 2..20),
        leaf_selector in any::<prop::sample::Index>(),
        level_selector in any::<prop::sample::Index>(),
        garbage in any::<[u8; 32]>(),
    ) {
        let leaves: Vec<_> = entries.iter().map(RouteEntry::leaf).collect();
        let tree = ManifestTree::from_leaves(leaves.clone()).unwrap();
        let root = tree.root();

        let index = leaf_selector.index(leaves.len());
        let mut proof = tree.prove(index).unwrap();
        prop_assume!(!proof.siblings.is_empty());

        let level = level_selector.index(proof.siblings.len());
        prop_assume!(proof.siblings[level] != garbage);
        proof.siblings[level] = garbage;

        prop_assert!(verify_leaf(&root, &leaves[index], &proof).is_err());
    }

    #[test]
    fn roots_are_stable_across_rebuilds(
        entries in proptest::collection::vec(arb_entry(), 1..20)
    ) {
        let leaves: Vec<_> = entries.iter().map(RouteEntry::leaf).collect();
        let first = ManifestTree::from_leaves(leaves.clone()).unwrap();
        let second = ManifestTree::from_leaves(leaves).unwrap();
        prop_assert_eq!(first.root(), second.root());
    }
}
