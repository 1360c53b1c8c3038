//! Hash-chained event log for external observers and indexers.
//!
//! Every state transition appends an [`EventRecord`] whose hash covers the
//! previous record's hash, so an indexer that replays the log can detect
//! any gap or tampering with [`EventLog::verify_chain`]. The log is an
//! in-memory observer surface: it is not part of the persisted snapshot.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{Hash, hash_content};
use crate::types::{Address, RouteKey};

/// Observable events emitted by the routing table and the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub enum Event {
    /// A pending manifest root was recorded.
    RootCommitted {
        /// The committed root.
        root: Hash,
        /// The epoch the root targets.
        epoch: u64,
        /// When the timelock started.
        pending_since_ns: u64,
    },

    /// An existing pending root was explicitly replaced.
    PendingOverwritten {
        /// The root that was displaced.
        previous_root: Hash,
        /// The replacement root.
        root: Hash,
        /// The epoch both roots target.
        epoch: u64,
    },

    /// A batch of proven routes was applied against the pending root.
    RoutesApplied {
        /// The target epoch.
        epoch: u64,
        /// Number of entries in the batch.
        count: u32,
    },

    /// The pending root was promoted to active.
    RootActivated {
        /// The promoted root.
        root: Hash,
        /// The new active epoch.
        epoch: u64,
        /// When activation happened.
        activated_at_ns: u64,
    },

    /// A route key now resolves to a handler.
    RouteBound {
        /// The bound key.
        route_key: RouteKey,
        /// The handler it resolves to.
        handler: Address,
    },

    /// A route key no longer resolves to its previous handler.
    RouteUnbound {
        /// The unbound key.
        route_key: RouteKey,
        /// The handler it used to resolve to.
        handler: Address,
    },

    /// Dispatch was frozen.
    Frozen {
        /// The emergency actor that froze dispatch.
        by: Address,
    },

    /// Dispatch was unfrozen.
    Unfrozen {
        /// The emergency actor that lifted the freeze.
        by: Address,
    },

    /// A tunable parameter changed.
    ConfigChanged {
        /// The parameter name.
        parameter: String,
        /// Value before the change.
        previous: u64,
        /// Value after the change (post-clamping).
        current: u64,
    },

    /// Content was staged in the registry.
    ChunkStaged {
        /// The chunk content hash.
        content_hash: Hash,
        /// The derived address.
        address: Address,
        /// Content size in bytes.
        size: u64,
    },

    /// A code unit was deployed deterministically.
    ContractDeployed {
        /// The derived address.
        address: Address,
        /// Hash over code and constructor args.
        code_hash: Hash,
        /// The deployment salt.
        salt: Hash,
    },

    /// Collected fees were withdrawn.
    FeesWithdrawn {
        /// The recipient.
        to: Address,
        /// Amount withdrawn.
        amount: u64,
    },
}

impl Event {
    /// Returns the event type string for indexers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RootCommitted { .. } => "routing.root_committed",
            Self::PendingOverwritten { .. } => "routing.pending_overwritten",
            Self::RoutesApplied { .. } => "routing.routes_applied",
            Self::RootActivated { .. } => "routing.root_activated",
            Self::RouteBound { .. } => "routing.route_bound",
            Self::RouteUnbound { .. } => "routing.route_unbound",
            Self::Frozen { .. } => "routing.frozen",
            Self::Unfrozen { .. } => "routing.unfrozen",
            Self::ConfigChanged { .. } => "config.changed",
            Self::ChunkStaged { .. } => "registry.chunk_staged",
            Self::ContractDeployed { .. } => "registry.contract_deployed",
            Self::FeesWithdrawn { .. } => "registry.fees_withdrawn",
        }
    }

    /// Deterministic byte encoding used for chain hashing.
    ///
    /// Fields are written in declaration order; integers little-endian,
    /// strings length-prefixed. Infallible by construction.
    #[must_use]
    pub fn payload_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(96);
        out.extend_from_slice(self.kind().as_bytes());
        out.push(0);
        match self {
            Self::RootCommitted {
                root,
                epoch,
                pending_since_ns,
            } => {
                out.extend_from_slice(root);
                out.extend_from_slice(&epoch.to_le_bytes());
                out.extend_from_slice(&pending_since_ns.to_le_bytes());
            },
            Self::PendingOverwritten {
                previous_root,
                root,
                epoch,
            } => {
                out.extend_from_slice(previous_root);
                out.extend_from_slice(root);
                out.extend_from_slice(&epoch.to_le_bytes());
            },
            Self::RoutesApplied { epoch, count } => {
                out.extend_from_slice(&epoch.to_le_bytes());
                out.extend_from_slice(&count.to_le_bytes());
            },
            Self::RootActivated {
                root,
                epoch,
                activated_at_ns,
            } => {
                out.extend_from_slice(root);
                out.extend_from_slice(&epoch.to_le_bytes());
                out.extend_from_slice(&activated_at_ns.to_le_bytes());
            },
            Self::RouteBound { route_key, handler }
            | Self::RouteUnbound { route_key, handler } => {
                out.extend_from_slice(route_key.as_bytes());
                out.extend_from_slice(handler.as_bytes());
            },
            Self::Frozen { by } | Self::Unfrozen { by } => {
                out.extend_from_slice(by.as_bytes());
            },
            Self::ConfigChanged {
                parameter,
                previous,
                current,
            } => {
                out.extend_from_slice(&(parameter.len() as u64).to_le_bytes());
                out.extend_from_slice(parameter.as_bytes());
                out.extend_from_slice(&previous.to_le_bytes());
                out.extend_from_slice(&current.to_le_bytes());
            },
            Self::ChunkStaged {
                content_hash,
                address,
                size,
            } => {
                out.extend_from_slice(content_hash);
                out.extend_from_slice(address.as_bytes());
                out.extend_from_slice(&size.to_le_bytes());
            },
            Self::ContractDeployed {
                address,
                code_hash,
                salt,
            } => {
                out.extend_from_slice(address.as_bytes());
                out.extend_from_slice(code_hash);
                out.extend_from_slice(salt);
            },
            Self::FeesWithdrawn { to, amount } => {
                out.extend_from_slice(to.as_bytes());
                out.extend_from_slice(&amount.to_le_bytes());
            },
        }
        out
    }
}

/// Errors detected while verifying an event chain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EventChainError {
    /// A record's previous-hash does not match its predecessor.
    #[error("event chain broken at sequence {sequence}: expected {expected}, got {actual}")]
    ChainBroken {
        /// The sequence number of the broken record.
        sequence: u64,
        /// Expected previous hash, hex encoded.
        expected: String,
        /// Actual previous hash, hex encoded.
        actual: String,
    },

    /// A record's own hash does not cover its content.
    #[error("event hash mismatch at sequence {sequence}: expected {expected}, got {actual}")]
    HashMismatch {
        /// The sequence number of the bad record.
        sequence: u64,
        /// Recomputed hash, hex encoded.
        expected: String,
        /// Stored hash, hex encoded.
        actual: String,
    },

    /// Sequence numbers are not contiguous from zero.
    #[error("event sequence gap: expected {expected}, got {actual}")]
    SequenceGap {
        /// The expected sequence number.
        expected: u64,
        /// The stored sequence number.
        actual: u64,
    },
}

/// One appended event with its chain linkage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventRecord {
    /// Zero-based position in the log.
    pub sequence: u64,
    /// Timestamp supplied by the emitting operation's context.
    pub timestamp_ns: u64,
    /// Hash of the previous record (zero for the first).
    pub prev_hash: Hash,
    /// Hash over `prev_hash || payload_bytes(event)`.
    pub event_hash: Hash,
    /// The event itself.
    pub event: Event,
}

/// The zero hash preceding the first record.
pub const GENESIS_PREV_HASH: Hash = [0u8; 32];

fn chain_hash(prev: &Hash, payload: &[u8]) -> Hash {
    let mut buf = Vec::with_capacity(32 + payload.len());
    buf.extend_from_slice(prev);
    buf.extend_from_slice(payload);
    hash_content(&buf)
}

/// Append-only, hash-chained sequence of [`EventRecord`]s.
///
/// Drained records stay part of the chain: the log remembers its head hash
/// and next sequence number, so appends after a drain still link to the
/// last drained record.
#[derive(Debug, Clone)]
pub struct EventLog {
    records: Vec<EventRecord>,
    head: Hash,
    next_sequence: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            head: GENESIS_PREV_HASH,
            next_sequence: 0,
        }
    }
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event, returning its sequence number.
    pub fn append(&mut self, timestamp_ns: u64, event: Event) -> u64 {
        let sequence = self.next_sequence;
        let prev_hash = self.head;
        let event_hash = chain_hash(&prev_hash, &event.payload_bytes());
        self.records.push(EventRecord {
            sequence,
            timestamp_ns,
            prev_hash,
            event_hash,
            event,
        });
        self.head = event_hash;
        self.next_sequence += 1;
        sequence
    }

    /// All records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Hash of the newest chained record, or the genesis hash if nothing
    /// was ever appended.
    #[must_use]
    pub const fn head_hash(&self) -> Hash {
        self.head
    }

    /// Removes and returns all retained records, oldest first.
    ///
    /// The chain continues from the drained head: the next append links to
    /// the hash of the last drained record.
    pub fn drain(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.records)
    }

    /// Verifies hashes, linkage, and sequence continuity over the retained
    /// records.
    ///
    /// # Errors
    ///
    /// Returns the first [`EventChainError`] found.
    pub fn verify_chain(&self) -> Result<(), EventChainError> {
        let Some(first) = self.records.first() else {
            return Ok(());
        };
        let mut prev = first.prev_hash;
        let base = first.sequence;
        for (i, record) in self.records.iter().enumerate() {
            let expected_seq = base + i as u64;
            if record.sequence != expected_seq {
                return Err(EventChainError::SequenceGap {
                    expected: expected_seq,
                    actual: record.sequence,
                });
            }
            if record.prev_hash != prev {
                return Err(EventChainError::ChainBroken {
                    sequence: record.sequence,
                    expected: hex::encode(prev),
                    actual: hex::encode(record.prev_hash),
                });
            }
            let recomputed = chain_hash(&record.prev_hash, &record.event.payload_bytes());
            if recomputed != record.event_hash {
                return Err(EventChainError::HashMismatch {
                    sequence: record.sequence,
                    expected: hex::encode(recomputed),
                    actual: hex::encode(record.event_hash),
                });
            }
            prev = record.event_hash;
        }
        Ok(())
    }
}
