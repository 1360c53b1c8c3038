//! Blake3 hashing, leaf encoding, and address derivation.

use subtle::ConstantTimeEq;

use crate::types::{Address, RouteKey};

/// Size of a Blake3 hash in bytes.
pub const HASH_SIZE: usize = 32;

/// Type alias for a 32-byte hash.
pub type Hash = [u8; HASH_SIZE];

/// Domain tag for chunk content hashes.
pub const MANIFEST_CHUNK_DOMAIN: &[u8] = b"switchyard.chunk.v1";

/// Domain tag for code fingerprints covering code plus constructor args.
pub const CODE_FINGERPRINT_DOMAIN: &[u8] = b"switchyard.code.v1";

/// Domain tag for manifest leaf encoding.
pub const MANIFEST_LEAF_DOMAIN: &[u8] = b"switchyard.leaf.v1";

/// Domain tag for interior manifest tree nodes.
pub const MANIFEST_NODE_DOMAIN: &[u8] = b"switchyard.node.v1";

/// Domain tag for content-derived addresses.
pub const CONTENT_ADDRESS_DOMAIN: &[u8] = b"switchyard.addr.content.v1";

/// Domain tag for salt-derived deployment addresses.
pub const DEPLOY_ADDRESS_DOMAIN: &[u8] = b"switchyard.addr.deploy.v1";

/// Hashes raw content without any domain tag.
///
/// This is the live-code fingerprint function: a route entry is valid only
/// while `hash_content(code at handler)` equals its recorded fingerprint.
#[must_use]
pub fn hash_content(content: &[u8]) -> Hash {
    *blake3::hash(content).as_bytes()
}

/// Computes the chunk hash for staged content.
///
/// Defined as `blake3(domain || blake3(content))`, so the chunk namespace
/// is disjoint from raw content hashes.
#[must_use]
pub fn chunk_hash(content: &[u8]) -> Hash {
    let inner = hash_content(content);
    let mut hasher = blake3::Hasher::new();
    hasher.update(MANIFEST_CHUNK_DOMAIN);
    hasher.update(&inner);
    *hasher.finalize().as_bytes()
}

/// Computes the code hash over code bytes and constructor arguments.
///
/// Both fields are length-prefixed so `(code, args)` pairs cannot alias
/// each other across the boundary.
#[must_use]
pub fn code_hash(code: &[u8], ctor_args: &[u8]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(CODE_FINGERPRINT_DOMAIN);
    hasher.update(&(code.len() as u64).to_le_bytes());
    hasher.update(code);
    hasher.update(&(ctor_args.len() as u64).to_le_bytes());
    hasher.update(ctor_args);
    *hasher.finalize().as_bytes()
}

/// Encodes a manifest leaf: `blake3(domain || route_key || handler || fingerprint)`.
#[must_use]
pub fn leaf_hash(route_key: &RouteKey, handler: &Address, fingerprint: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(MANIFEST_LEAF_DOMAIN);
    hasher.update(route_key.as_bytes());
    hasher.update(handler.as_bytes());
    hasher.update(fingerprint);
    *hasher.finalize().as_bytes()
}

/// Combines two manifest tree nodes in the given order.
///
/// Order matters: `node_hash(a, b) != node_hash(b, a)`. The verifier relies
/// on this to enforce per-level direction bits.
#[must_use]
pub fn node_hash(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(MANIFEST_NODE_DOMAIN);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// Derives the address for content staged under a registry identity.
///
/// Pure function of `(registry identity, chunk hash)`: independent
/// instances sharing an identity resolve identical content to identical
/// addresses without coordination.
#[must_use]
pub fn derive_content_address(registry: &Address, content_hash: &Hash) -> Address {
    let mut hasher = blake3::Hasher::new();
    hasher.update(CONTENT_ADDRESS_DOMAIN);
    hasher.update(registry.as_bytes());
    hasher.update(content_hash);
    Address::from_bytes(*hasher.finalize().as_bytes())
}

/// Derives a deterministic deployment address.
///
/// Pure function of `(deployer identity, salt, code hash)`: independent of
/// deployment order and prior instance state.
#[must_use]
pub fn derive_deterministic_address(deployer: &Address, salt: &Hash, code_hash: &Hash) -> Address {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DEPLOY_ADDRESS_DOMAIN);
    hasher.update(deployer.as_bytes());
    hasher.update(salt);
    hasher.update(code_hash);
    Address::from_bytes(*hasher.finalize().as_bytes())
}

/// Compares two hashes in constant time.
#[must_use]
pub fn ct_hash_eq(a: &Hash, b: &Hash) -> bool {
    bool::from(a[..].ct_eq(&b[..]))
}
