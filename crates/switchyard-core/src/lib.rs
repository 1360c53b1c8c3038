//! Manifest-driven routing with deterministic, content-addressed
//! deployment.
//!
//! This crate implements a two-part subsystem for staged handler
//! rollouts:
//!
//! - **[`routing`]**: a versioned routing table mapping fixed-width route
//!   keys to handler addresses under a commit → apply → activate protocol
//!   with a timelock, replay protection, code-fingerprint pinning, and an
//!   emergency freeze.
//! - **[`registry`]**: a content-addressed deployment registry producing
//!   deterministic, idempotent addresses from a salt and code hash, with
//!   size ceilings, tiered fees, and all-or-nothing batches.
//!
//! The routing table validates route entries with the ordered Merkle
//! verifier in [`merkle`] and checks handler code through the capability
//! seams in [`handler`]. Role grants and the explicit per-call context
//! live in [`access`]; state transitions emit hash-chained records via
//! [`events`]; persisted state is schema-versioned in [`snapshot`].
//!
//! # Execution Model
//!
//! Everything here is strictly serial and synchronous. Every mutating
//! operation validates its full input before its first write, so a failed
//! call leaves no partial state behind. There is no ambient clock or
//! caller: both arrive through [`access::CallContext`], which keeps the
//! state machines deterministic under test.
//!
//! # Example
//!
//! ```
//! use switchyard_core::access::{CallContext, Role};
//! use switchyard_core::crypto::{hash_content, leaf_hash};
//! use switchyard_core::handler::HandlerHost;
//! use switchyard_core::merkle::ManifestTree;
//! use switchyard_core::registry::DeploymentRegistry;
//! use switchyard_core::routing::{ProvenRoute, RouteEntry, RoutingTable};
//! use switchyard_core::types::{Address, RouteKey};
//!
//! let admin = Address::from_bytes([1; 32]);
//! let mut table = RoutingTable::new(admin, 1_000);
//! let mut host = HandlerHost::new();
//!
//! // Install a handler and describe its route.
//! let handler_addr = Address::from_bytes([9; 32]);
//! let code = b"demo handler".to_vec();
//! host.install(
//!     handler_addr,
//!     code.clone(),
//!     Box::new(|payload: &[u8]| Ok(payload.to_vec())),
//! )
//! .unwrap();
//! let entry = RouteEntry::new(
//!     RouteKey::from_bytes([0, 0, 0, 1]),
//!     handler_addr,
//!     hash_content(&code),
//! );
//!
//! // Build the manifest and drive commit -> apply -> activate.
//! let tree = ManifestTree::from_leaves(vec![entry.leaf()]).unwrap();
//! let admin_ctx = CallContext::new(admin, 0);
//! table.grant_role(&admin_ctx, Role::Commit, admin).unwrap();
//! table.grant_role(&admin_ctx, Role::Apply, admin).unwrap();
//!
//! table.commit(&admin_ctx, tree.root(), 1).unwrap();
//! let batch = vec![ProvenRoute::new(entry, tree.prove(0).unwrap())];
//! table.apply(&admin_ctx, &batch, &host).unwrap();
//! let later = CallContext::new(admin, 1_000);
//! table.activate(&later, &host).unwrap();
//!
//! let reply = table
//!     .dispatch(entry.route_key, b"ping", &host)
//!     .unwrap();
//! assert_eq!(reply, b"ping");
//! ```

#![forbid(unsafe_code)]

pub mod access;
pub mod crypto;
pub mod events;
pub mod handler;
pub mod merkle;
pub mod registry;
pub mod routing;
pub mod snapshot;
pub mod types;

pub use access::{AccessControl, AccessError, CallContext, Role};
pub use crypto::{HASH_SIZE, Hash};
pub use events::{Event, EventChainError, EventLog, EventRecord};
pub use handler::{CodeSource, Handler, HandlerError, HandlerHost, HostError, InvokeError, Invoker};
pub use merkle::{DirectedProof, ManifestTree, ProofError, Side, verify_leaf};
pub use registry::{
    DeployOutcome, DeployRequest, DeploymentRegistry, FeeSchedule, FeeTier, RegistryError,
    StageOutcome,
};
pub use routing::{
    Activation, ManifestState, ProvenRoute, RouteEntry, RoutingError, RoutingTable,
};
pub use snapshot::{InstanceSnapshot, SCHEMA_VERSION, SnapshotError};
pub use types::{Address, RouteKey, TypeParseError};
