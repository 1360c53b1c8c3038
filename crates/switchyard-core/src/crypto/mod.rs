//! Cryptographic primitives for the routing and deployment core.
//!
//! This module provides the hashing building blocks the rest of the crate
//! is built on:
//!
//! - **Blake3 hashing**: content hashes, code fingerprints, and manifest
//!   leaf encoding, each under its own domain-separation tag
//! - **Deterministic address derivation**: pure functions mapping
//!   `(identity, salt, code hash)` and `(identity, content hash)` to
//!   deployment addresses
//! - **Constant-time comparison**: fingerprint checks that do not leak
//!   match position through timing
//!
//! # Domain Separation
//!
//! Every hash computed here is prefixed with a versioned domain tag, so a
//! content hash can never collide with a leaf hash or an address preimage
//! even when the underlying bytes are identical.

mod hash;

pub use hash::{
    CODE_FINGERPRINT_DOMAIN, CONTENT_ADDRESS_DOMAIN, DEPLOY_ADDRESS_DOMAIN, HASH_SIZE, Hash,
    MANIFEST_CHUNK_DOMAIN, MANIFEST_LEAF_DOMAIN, MANIFEST_NODE_DOMAIN, chunk_hash, code_hash,
    ct_hash_eq, derive_content_address, derive_deterministic_address, hash_content, leaf_hash,
    node_hash,
};
