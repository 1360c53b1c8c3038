//! Routing-table error types.
//!
//! Every variant carries enough context (expected vs. actual values,
//! timestamps, limits) for off-instance tooling to diagnose a rejection
//! without follow-up queries. Any error leaves the table untouched.

use thiserror::Error;

use crate::access::AccessError;
use crate::handler::InvokeError;
use crate::merkle::ProofError;
use crate::types::{Address, RouteKey};

/// Errors that can occur in routing-table operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RoutingError {
    /// The caller lacks the role the operation requires.
    #[error(transparent)]
    Unauthorized(#[from] AccessError),

    /// The committed epoch is not the successor of the active epoch.
    #[error("epoch mismatch: expected {expected}, submitted {submitted}")]
    EpochMismatch {
        /// The only acceptable epoch (`active_epoch + 1`).
        expected: u64,
        /// The epoch the caller submitted.
        submitted: u64,
    },

    /// The root was already activated once and can never be reused.
    #[error("root already consumed: {root}")]
    RootAlreadyConsumed {
        /// The consumed root, hex encoded.
        root: String,
    },

    /// A different root is already pending for this epoch.
    #[error("pending root exists: {pending} already pending, {submitted} submitted")]
    PendingRootExists {
        /// The root currently pending, hex encoded.
        pending: String,
        /// The root the caller tried to commit, hex encoded.
        submitted: String,
    },

    /// The operation needs a pending root and none exists.
    #[error("no pending root")]
    NoPendingRoot,

    /// Activation attempted before the timelock elapsed.
    #[error("activation not ready: now {now_ns}, eligible at {eligible_at_ns}")]
    ActivationNotReady {
        /// The caller-supplied current time.
        now_ns: u64,
        /// First instant at which activation may succeed.
        eligible_at_ns: u64,
    },

    /// Dispatch is frozen.
    #[error("instance frozen: dispatch disabled")]
    Frozen,

    /// The route key does not resolve in the route map.
    #[error("unknown route: {route_key}")]
    UnknownRoute {
        /// The unresolved key.
        route_key: RouteKey,
    },

    /// The batch contains the same route key more than once.
    #[error("duplicate route key in batch: {route_key}")]
    DuplicateRouteKey {
        /// The repeated key.
        route_key: RouteKey,
    },

    /// The batch is empty.
    #[error("empty batch")]
    EmptyBatch,

    /// The batch exceeds the configured maximum.
    #[error("batch too large: {submitted} entries exceeds limit of {limit}")]
    BatchTooLarge {
        /// Entries in the submitted batch.
        submitted: usize,
        /// The configured maximum.
        limit: u32,
    },

    /// The staged-key set cannot absorb the batch.
    #[error("staged set full: {staged} staged plus {incoming} incoming exceeds limit of {limit}")]
    StagedSetFull {
        /// Keys already staged.
        staged: usize,
        /// New keys in the batch.
        incoming: usize,
        /// The staged-set ceiling.
        limit: usize,
    },

    /// A route entry's proof does not verify against the pending root.
    #[error("invalid proof for route {route_key}: {source}")]
    InvalidProof {
        /// The route entry the proof belongs to.
        route_key: RouteKey,
        /// The underlying verification failure.
        #[source]
        source: ProofError,
    },

    /// The live code at a handler does not match the declared fingerprint.
    #[error(
        "code fingerprint mismatch at {handler} for route {route_key}: expected {expected}, actual {actual}"
    )]
    FingerprintMismatch {
        /// The route whose pin failed.
        route_key: RouteKey,
        /// The handler address checked.
        handler: Address,
        /// The declared fingerprint, hex encoded.
        expected: String,
        /// The fingerprint of the live code, hex encoded.
        actual: String,
    },

    /// No code exists at the handler address.
    #[error("no code at handler {handler} for route {route_key}")]
    CodeMissing {
        /// The route whose handler is vacant.
        route_key: RouteKey,
        /// The vacant handler address.
        handler: Address,
    },

    /// The dispatch payload exceeds the accepted size.
    #[error("payload too large: {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge {
        /// Payload size in bytes.
        size: usize,
        /// The payload ceiling.
        limit: usize,
    },

    /// The handler's return value exceeds the accepted size.
    #[error("return too large: {size} bytes exceeds limit of {limit}")]
    ReturnTooLarge {
        /// Returned size in bytes.
        size: usize,
        /// The return ceiling.
        limit: usize,
    },

    /// Forwarding to the handler failed.
    #[error(transparent)]
    Invoke(#[from] InvokeError),
}
