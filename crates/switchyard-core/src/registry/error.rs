//! Deployment-registry error types.

use thiserror::Error;

use crate::access::AccessError;
use crate::types::Address;

/// Errors that can occur in registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// The caller lacks the role the operation requires.
    #[error(transparent)]
    Unauthorized(#[from] AccessError),

    /// Staged content exceeds the per-chunk ceiling.
    #[error("content too large: {size} bytes exceeds limit of {limit}")]
    ContentTooLarge {
        /// Content size in bytes.
        size: usize,
        /// The per-chunk ceiling.
        limit: usize,
    },

    /// Deployment code exceeds the hard maximum.
    ///
    /// Checked before anything else so oversized payloads are rejected
    /// without burning resources on hashing or fee math.
    #[error("code too large: {size} bytes exceeds limit of {limit}")]
    CodeTooLarge {
        /// Code size in bytes.
        size: usize,
        /// The code ceiling.
        limit: usize,
    },

    /// Constructor arguments exceed the accepted size.
    #[error("constructor args too large: {size} bytes exceeds limit of {limit}")]
    CtorArgsTooLarge {
        /// Argument size in bytes.
        size: usize,
        /// The argument ceiling.
        limit: usize,
    },

    /// The batch is empty.
    #[error("empty batch")]
    EmptyBatch,

    /// The batch exceeds the registry's cap.
    #[error("batch too large: {submitted} items exceeds limit of {limit}")]
    BatchTooLarge {
        /// Items in the submitted batch.
        submitted: usize,
        /// The batch ceiling.
        limit: usize,
    },

    /// The derived address is occupied by different content.
    #[error("address collision at {address}: expected code hash {expected}, found {found}")]
    AddressCollision {
        /// The contested address.
        address: Address,
        /// Hash of the content being deployed, hex encoded.
        expected: String,
        /// Hash of the content already there, hex encoded.
        found: String,
    },

    /// The provided fee does not cover the operation.
    #[error("insufficient fee: required {required}, provided {provided}")]
    FeeInsufficient {
        /// Fee units the operation costs.
        required: u64,
        /// Fee units the caller provided.
        provided: u64,
    },

    /// No fees have accumulated to withdraw.
    #[error("nothing to withdraw")]
    NothingToWithdraw,
}
