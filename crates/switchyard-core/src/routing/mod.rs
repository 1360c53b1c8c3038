//! Versioned routing table with a time-locked upgrade protocol.
//!
//! The table owns the route map and walks a commit → apply → activate
//! protocol for every manifest rollout:
//!
//! 1. **Commit**: a `COMMIT`-role caller records the next epoch's Merkle
//!    root; the timelock starts.
//! 2. **Apply**: `APPLY`-role callers submit bounded batches of route
//!    entries, each carrying a directed Merkle proof against the pending
//!    root and a pinned code fingerprint verified against live code.
//! 3. **Activate**: once the timelock (plus grace window) elapses, anyone
//!    may activate. Every staged key's fingerprint is re-verified first,
//!    so code substituted after apply is caught before it can serve
//!    traffic. Activated roots are consumed and can never activate again.
//!
//! Dispatch resolves route keys against the live map and fails closed on
//! unknown keys; an emergency freeze stops dispatch without touching the
//! governance path.

mod error;
mod state;
mod table;

pub use error::RoutingError;
pub use state::{HandlerIndex, ManifestState, RouteEntry};
pub use table::{
    Activation, DEFAULT_MAX_BATCH_SIZE, MAX_BATCH_SIZE_LIMIT, MAX_DISPATCH_PAYLOAD,
    MAX_GRACE_WINDOW_NS, MAX_RETURN_SIZE, MAX_STAGED_ROUTES, MIN_BATCH_SIZE, ProvenRoute,
    RoutingTable,
};
