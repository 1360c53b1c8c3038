//! The manifest-driven routing table.
//!
//! # State Machine
//!
//! ```text
//! Idle --commit--> Committed --apply*--> Staged --activate--> Idle'
//! ```
//!
//! A commit records a pending root and starts the timelock. Apply batches
//! verify route entries against the pending root and write them into the
//! live route map, staging each touched key. Activation waits out the
//! timelock, re-verifies every staged key's code fingerprint, promotes the
//! pending root to active, and marks it consumed forever. `frozen` is an
//! orthogonal flag that blocks only dispatch; governance operations keep
//! working while frozen.
//!
//! # Atomicity
//!
//! Every mutating operation validates its entire input before the first
//! write. A failed operation leaves the table byte-for-byte unchanged.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::access::{AccessControl, CallContext, Role};
use crate::crypto::{Hash, ct_hash_eq, hash_content};
use crate::events::{Event, EventLog, EventRecord};
use crate::handler::{CodeSource, Invoker};
use crate::merkle::{DirectedProof, verify_leaf};
use crate::types::{Address, RouteKey};

use super::error::RoutingError;
use super::state::{HandlerIndex, ManifestState, RouteEntry};

/// Smallest configurable batch size.
pub const MIN_BATCH_SIZE: u32 = 1;

/// Largest configurable batch size.
pub const MAX_BATCH_SIZE_LIMIT: u32 = 256;

/// Batch size before anyone tunes it.
pub const DEFAULT_MAX_BATCH_SIZE: u32 = 64;

/// Ceiling on route keys staged for one activation.
pub const MAX_STAGED_ROUTES: usize = 1_024;

/// Largest accepted grace window (30 days).
pub const MAX_GRACE_WINDOW_NS: u64 = 2_592_000_000_000_000;

/// Largest dispatch payload accepted.
pub const MAX_DISPATCH_PAYLOAD: usize = 65_536;

/// Largest handler return value forwarded back to the caller.
pub const MAX_RETURN_SIZE: usize = 65_536;

/// A route entry together with its membership proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenRoute {
    /// The entry to apply.
    pub entry: RouteEntry,
    /// Proof that the entry's leaf belongs to the pending root.
    pub proof: DirectedProof,
}

impl ProvenRoute {
    /// Pairs an entry with its proof.
    #[must_use]
    pub const fn new(entry: RouteEntry, proof: DirectedProof) -> Self {
        Self { entry, proof }
    }
}

/// The outcome of a successful activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    /// The root that became active.
    pub root: Hash,
    /// The new active epoch.
    pub epoch: u64,
}

/// Versioned route map with a commit/apply/activate upgrade protocol.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    state: ManifestState,
    routes: BTreeMap<RouteKey, RouteEntry>,
    index: HandlerIndex,
    staged: BTreeSet<RouteKey>,
    consumed: BTreeSet<Hash>,
    access: AccessControl,
    max_batch_size: u32,
    log: EventLog,
}

impl RoutingTable {
    /// Creates a table with the given admin and activation delay.
    #[must_use]
    pub fn new(admin: Address, activation_delay_ns: u64) -> Self {
        Self {
            state: ManifestState::new(activation_delay_ns),
            routes: BTreeMap::new(),
            index: HandlerIndex::new(),
            staged: BTreeSet::new(),
            consumed: BTreeSet::new(),
            access: AccessControl::new(admin),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            log: EventLog::new(),
        }
    }

    // -- governance ---------------------------------------------------------

    /// Records a pending root for the next epoch and starts the timelock.
    ///
    /// Re-committing the identical root refreshes the timelock. A different
    /// root for the same epoch is rejected; displacing it requires
    /// [`RoutingTable::overwrite_pending`].
    ///
    /// # Errors
    ///
    /// Requires the `COMMIT` role. Fails on a non-successor epoch, an
    /// already-consumed root, or a conflicting pending root.
    pub fn commit(
        &mut self,
        ctx: &CallContext,
        root: Hash,
        epoch: u64,
    ) -> Result<(), RoutingError> {
        self.access.require(&ctx.caller, Role::Commit)?;
        self.check_commit_target(&root, epoch)?;
        if let Some(pending) = self.state.pending_root {
            if pending != root {
                return Err(RoutingError::PendingRootExists {
                    pending: hex::encode(pending),
                    submitted: hex::encode(root),
                });
            }
        }
        self.record_pending(ctx, root, epoch);
        Ok(())
    }

    /// Replaces an existing pending root for the same epoch.
    ///
    /// # Errors
    ///
    /// Requires the `COMMIT` role and an existing pending root; the same
    /// epoch and consumed-root checks as [`RoutingTable::commit`] apply.
    pub fn overwrite_pending(
        &mut self,
        ctx: &CallContext,
        root: Hash,
        epoch: u64,
    ) -> Result<(), RoutingError> {
        self.access.require(&ctx.caller, Role::Commit)?;
        let previous_root = self.state.pending_root.ok_or(RoutingError::NoPendingRoot)?;
        self.check_commit_target(&root, epoch)?;

        self.log.append(
            ctx.now_ns,
            Event::PendingOverwritten {
                previous_root,
                root,
                epoch,
            },
        );
        self.record_pending(ctx, root, epoch);
        Ok(())
    }

    /// Verifies and applies a batch of proven routes against the pending
    /// root, staging each touched key for activation-time re-verification.
    ///
    /// Returns the number of entries applied. The batch is all-or-nothing:
    /// any invalid entry rejects the whole batch with the route map
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Requires the `APPLY` role and a pending root. Fails on an empty or
    /// oversized batch, duplicate keys, staged-set overflow, an invalid
    /// proof, or a code-fingerprint mismatch.
    pub fn apply(
        &mut self,
        ctx: &CallContext,
        batch: &[ProvenRoute],
        code: &dyn CodeSource,
    ) -> Result<usize, RoutingError> {
        self.access.require(&ctx.caller, Role::Apply)?;
        let pending_root = self.state.pending_root.ok_or(RoutingError::NoPendingRoot)?;
        let epoch = self.state.pending_epoch.ok_or(RoutingError::NoPendingRoot)?;

        if batch.is_empty() {
            return Err(RoutingError::EmptyBatch);
        }
        if batch.len() > self.max_batch_size as usize {
            return Err(RoutingError::BatchTooLarge {
                submitted: batch.len(),
                limit: self.max_batch_size,
            });
        }

        let mut seen = BTreeSet::new();
        for proven in batch {
            if !seen.insert(proven.entry.route_key) {
                return Err(RoutingError::DuplicateRouteKey {
                    route_key: proven.entry.route_key,
                });
            }
        }

        let incoming = batch
            .iter()
            .filter(|proven| !self.staged.contains(&proven.entry.route_key))
            .count();
        if self.staged.len() + incoming > MAX_STAGED_ROUTES {
            return Err(RoutingError::StagedSetFull {
                staged: self.staged.len(),
                incoming,
                limit: MAX_STAGED_ROUTES,
            });
        }

        for proven in batch {
            verify_leaf(&pending_root, &proven.entry.leaf(), &proven.proof).map_err(|source| {
                RoutingError::InvalidProof {
                    route_key: proven.entry.route_key,
                    source,
                }
            })?;
            check_fingerprint(code, &proven.entry)?;
        }

        // Validation complete; the writes below cannot fail.
        for proven in batch {
            let entry = proven.entry;
            let previous = self.index.bind(entry.route_key, entry.handler);
            if let Some(previous_handler) = previous {
                self.log.append(
                    ctx.now_ns,
                    Event::RouteUnbound {
                        route_key: entry.route_key,
                        handler: previous_handler,
                    },
                );
            }
            let displaced = self.routes.insert(entry.route_key, entry);
            let rebound = match displaced {
                Some(old) => old.handler != entry.handler,
                None => true,
            };
            if rebound {
                self.log.append(
                    ctx.now_ns,
                    Event::RouteBound {
                        route_key: entry.route_key,
                        handler: entry.handler,
                    },
                );
            }
            self.staged.insert(entry.route_key);
        }

        self.log.append(
            ctx.now_ns,
            Event::RoutesApplied {
                epoch,
                count: batch.len() as u32,
            },
        );
        debug!(epoch, count = batch.len(), "route batch applied");
        Ok(batch.len())
    }

    /// Promotes the pending root to active once the timelock has elapsed.
    ///
    /// Callable by anyone: the timelock plus the staged-set fingerprint
    /// re-verification are the security boundary, and requiring a role
    /// here would let an operator outage wedge a fully vetted rollout.
    ///
    /// # Errors
    ///
    /// Fails before `pending_since + activation_delay + grace_window`,
    /// without a pending root, or when any staged key's live code has
    /// drifted from its pinned fingerprint.
    pub fn activate(
        &mut self,
        ctx: &CallContext,
        code: &dyn CodeSource,
    ) -> Result<Activation, RoutingError> {
        let root = self.state.pending_root.ok_or(RoutingError::NoPendingRoot)?;
        let epoch = self.state.pending_epoch.ok_or(RoutingError::NoPendingRoot)?;
        let eligible_at_ns = self
            .state
            .eligible_at_ns()
            .ok_or(RoutingError::NoPendingRoot)?;

        if ctx.now_ns < eligible_at_ns {
            return Err(RoutingError::ActivationNotReady {
                now_ns: ctx.now_ns,
                eligible_at_ns,
            });
        }
        if self.consumed.contains(&root) {
            return Err(RoutingError::RootAlreadyConsumed {
                root: hex::encode(root),
            });
        }

        // Catch code substitution that happened between apply and now.
        for key in &self.staged {
            let entry = self
                .routes
                .get(key)
                .ok_or(RoutingError::UnknownRoute { route_key: *key })?;
            check_fingerprint(code, entry)?;
        }

        self.state.active_root = Some(root);
        self.state.active_epoch = epoch;
        self.state.pending_root = None;
        self.state.pending_epoch = None;
        self.state.pending_since_ns = None;
        self.consumed.insert(root);
        self.staged.clear();

        self.log.append(
            ctx.now_ns,
            Event::RootActivated {
                root,
                epoch,
                activated_at_ns: ctx.now_ns,
            },
        );
        debug!(epoch, root = %hex::encode(root), "manifest root activated");
        Ok(Activation { root, epoch })
    }

    /// Freezes dispatch. Idempotent; returns whether the flag changed.
    ///
    /// # Errors
    ///
    /// Requires the `EMERGENCY` role.
    pub fn freeze(&mut self, ctx: &CallContext) -> Result<bool, RoutingError> {
        self.access.require(&ctx.caller, Role::Emergency)?;
        if self.state.frozen {
            return Ok(false);
        }
        self.state.frozen = true;
        self.log.append(ctx.now_ns, Event::Frozen { by: ctx.caller });
        warn!(by = %ctx.caller, "dispatch frozen");
        Ok(true)
    }

    /// Unfreezes dispatch. Idempotent; returns whether the flag changed.
    ///
    /// # Errors
    ///
    /// Requires the `EMERGENCY` role.
    pub fn unfreeze(&mut self, ctx: &CallContext) -> Result<bool, RoutingError> {
        self.access.require(&ctx.caller, Role::Emergency)?;
        if !self.state.frozen {
            return Ok(false);
        }
        self.state.frozen = false;
        self.log.append(ctx.now_ns, Event::Unfrozen { by: ctx.caller });
        Ok(true)
    }

    /// Sets the grace window, clamped to `[0, MAX_GRACE_WINDOW_NS]`.
    ///
    /// Returns the effective value.
    ///
    /// # Errors
    ///
    /// Requires the `ADMIN` role.
    pub fn set_grace_window(
        &mut self,
        ctx: &CallContext,
        window_ns: u64,
    ) -> Result<u64, RoutingError> {
        self.access.require(&ctx.caller, Role::Admin)?;
        let clamped = window_ns.min(MAX_GRACE_WINDOW_NS);
        if clamped != window_ns {
            warn!(requested = window_ns, clamped, "grace window clamped");
        }
        let previous = self.state.grace_window_ns;
        self.state.grace_window_ns = clamped;
        self.log.append(
            ctx.now_ns,
            Event::ConfigChanged {
                parameter: "grace_window_ns".to_string(),
                previous,
                current: clamped,
            },
        );
        Ok(clamped)
    }

    /// Sets the batch limit, clamped to
    /// `[MIN_BATCH_SIZE, MAX_BATCH_SIZE_LIMIT]`.
    ///
    /// Returns the effective value.
    ///
    /// # Errors
    ///
    /// Requires the `ADMIN` role.
    pub fn set_max_batch_size(
        &mut self,
        ctx: &CallContext,
        size: u32,
    ) -> Result<u32, RoutingError> {
        self.access.require(&ctx.caller, Role::Admin)?;
        let clamped = size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE_LIMIT);
        if clamped != size {
            warn!(requested = size, clamped, "batch size clamped");
        }
        let previous = u64::from(self.max_batch_size);
        self.max_batch_size = clamped;
        self.log.append(
            ctx.now_ns,
            Event::ConfigChanged {
                parameter: "max_batch_size".to_string(),
                previous,
                current: u64::from(clamped),
            },
        );
        Ok(clamped)
    }

    /// Grants `role` to `member`. Caller must hold `ADMIN`.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`AccessError`](crate::access::AccessError).
    pub fn grant_role(
        &mut self,
        ctx: &CallContext,
        role: Role,
        member: Address,
    ) -> Result<bool, RoutingError> {
        Ok(self.access.grant(ctx, role, member)?)
    }

    /// Revokes `role` from `member`. Caller must hold `ADMIN`.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`AccessError`](crate::access::AccessError).
    pub fn revoke_role(
        &mut self,
        ctx: &CallContext,
        role: Role,
        member: &Address,
    ) -> Result<bool, RoutingError> {
        Ok(self.access.revoke(ctx, role, member)?)
    }

    // -- dispatch -----------------------------------------------------------

    /// Looks up `route_key` and forwards `payload` to its handler.
    ///
    /// Unknown keys fail closed. The handler's return value is passed back
    /// unmodified, subject to [`MAX_RETURN_SIZE`].
    ///
    /// # Errors
    ///
    /// Fails when frozen, on unknown keys, oversized payloads or returns,
    /// and on handler failure.
    pub fn dispatch(
        &self,
        route_key: RouteKey,
        payload: &[u8],
        invoker: &dyn Invoker,
    ) -> Result<Vec<u8>, RoutingError> {
        if self.state.frozen {
            return Err(RoutingError::Frozen);
        }
        if payload.len() > MAX_DISPATCH_PAYLOAD {
            return Err(RoutingError::PayloadTooLarge {
                size: payload.len(),
                limit: MAX_DISPATCH_PAYLOAD,
            });
        }
        let entry = self
            .routes
            .get(&route_key)
            .ok_or(RoutingError::UnknownRoute { route_key })?;
        let output = invoker.invoke(&entry.handler, payload)?;
        if output.len() > MAX_RETURN_SIZE {
            return Err(RoutingError::ReturnTooLarge {
                size: output.len(),
                limit: MAX_RETURN_SIZE,
            });
        }
        Ok(output)
    }

    // -- discovery views ----------------------------------------------------

    /// Current manifest bookkeeping.
    #[must_use]
    pub const fn manifest_state(&self) -> &ManifestState {
        &self.state
    }

    /// Resolves a route key to its entry.
    #[must_use]
    pub fn resolve(&self, route_key: &RouteKey) -> Option<&RouteEntry> {
        self.routes.get(route_key)
    }

    /// All handlers with at least one bound route.
    #[must_use]
    pub fn handlers(&self) -> Vec<Address> {
        self.index.handlers()
    }

    /// Route keys bound to `handler`.
    #[must_use]
    pub fn routes_for_handler(&self, handler: &Address) -> Vec<RouteKey> {
        self.index.routes_for(handler)
    }

    /// Number of bound routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Keys staged for re-verification at the next activation.
    #[must_use]
    pub fn staged_route_keys(&self) -> Vec<RouteKey> {
        self.staged.iter().copied().collect()
    }

    /// Whether dispatch is frozen.
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.state.frozen
    }

    /// The effective batch limit.
    #[must_use]
    pub const fn max_batch_size(&self) -> u32 {
        self.max_batch_size
    }

    /// Read access to role grants.
    #[must_use]
    pub const fn access(&self) -> &AccessControl {
        &self.access
    }

    /// Emitted events, oldest first.
    #[must_use]
    pub fn events(&self) -> &[EventRecord] {
        self.log.records()
    }

    /// Removes and returns all retained events.
    pub fn drain_events(&mut self) -> Vec<EventRecord> {
        self.log.drain()
    }

    /// The event log itself, for chain verification.
    #[must_use]
    pub const fn event_log(&self) -> &EventLog {
        &self.log
    }

    // -- internal -----------------------------------------------------------

    fn check_commit_target(&self, root: &Hash, epoch: u64) -> Result<(), RoutingError> {
        if self.consumed.contains(root) {
            return Err(RoutingError::RootAlreadyConsumed {
                root: hex::encode(root),
            });
        }
        let expected = self.state.active_epoch + 1;
        if epoch != expected {
            return Err(RoutingError::EpochMismatch {
                expected,
                submitted: epoch,
            });
        }
        Ok(())
    }

    fn record_pending(&mut self, ctx: &CallContext, root: Hash, epoch: u64) {
        self.state.pending_root = Some(root);
        self.state.pending_epoch = Some(epoch);
        self.state.pending_since_ns = Some(ctx.now_ns);
        self.log.append(
            ctx.now_ns,
            Event::RootCommitted {
                root,
                epoch,
                pending_since_ns: ctx.now_ns,
            },
        );
        debug!(epoch, root = %hex::encode(root), "manifest root committed");
    }

    pub(crate) fn restore_parts(
        state: ManifestState,
        routes: Vec<RouteEntry>,
        staged: Vec<RouteKey>,
        consumed: Vec<Hash>,
        access: AccessControl,
        max_batch_size: u32,
    ) -> Self {
        let mut index = HandlerIndex::new();
        let mut route_map = BTreeMap::new();
        for entry in routes {
            index.bind(entry.route_key, entry.handler);
            route_map.insert(entry.route_key, entry);
        }
        Self {
            state,
            routes: route_map,
            index,
            staged: staged.into_iter().collect(),
            consumed: consumed.into_iter().collect(),
            access,
            max_batch_size,
            log: EventLog::new(),
        }
    }

    pub(crate) fn snapshot_parts(
        &self,
    ) -> (
        &ManifestState,
        Vec<RouteEntry>,
        Vec<RouteKey>,
        Vec<Hash>,
        &AccessControl,
        u32,
    ) {
        (
            &self.state,
            self.routes.values().copied().collect(),
            self.staged.iter().copied().collect(),
            self.consumed.iter().copied().collect(),
            &self.access,
            self.max_batch_size,
        )
    }
}

fn check_fingerprint(code: &dyn CodeSource, entry: &RouteEntry) -> Result<(), RoutingError> {
    let live = code
        .code_at(&entry.handler)
        .ok_or(RoutingError::CodeMissing {
            route_key: entry.route_key,
            handler: entry.handler,
        })?;
    let actual = hash_content(live);
    if !ct_hash_eq(&entry.code_fingerprint, &actual) {
        return Err(RoutingError::FingerprintMismatch {
            route_key: entry.route_key,
            handler: entry.handler,
            expected: hex::encode(entry.code_fingerprint),
            actual: hex::encode(actual),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerHost;
    use crate::merkle::ManifestTree;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 32])
    }

    fn route_key(n: u16) -> RouteKey {
        let bytes = n.to_be_bytes();
        RouteKey::from_bytes([0, 0, bytes[0], bytes[1]])
    }

    fn table_with_roles(admin: Address) -> RoutingTable {
        let mut table = RoutingTable::new(admin, 1_000);
        let ctx = CallContext::new(admin, 0);
        table.grant_role(&ctx, Role::Commit, admin).unwrap();
        table.grant_role(&ctx, Role::Apply, admin).unwrap();
        table
    }

    #[test]
    fn empty_batch_is_rejected() {
        let admin = addr(1);
        let mut table = table_with_roles(admin);
        let ctx = CallContext::new(admin, 10);
        table.commit(&ctx, [7u8; 32], 1).unwrap();

        let host = HandlerHost::new();
        let err = table.apply(&ctx, &[], &host).unwrap_err();
        assert_eq!(err, RoutingError::EmptyBatch);
    }

    #[test]
    fn oversized_payload_is_rejected_before_lookup() {
        let table = RoutingTable::new(addr(1), 1_000);
        let host = HandlerHost::new();
        let payload = vec![0u8; MAX_DISPATCH_PAYLOAD + 1];

        let err = table
            .dispatch(route_key(1), &payload, &host)
            .unwrap_err();
        assert_eq!(
            err,
            RoutingError::PayloadTooLarge {
                size: MAX_DISPATCH_PAYLOAD + 1,
                limit: MAX_DISPATCH_PAYLOAD,
            }
        );
    }

    #[test]
    fn staged_set_ceiling_rejects_the_overflowing_batch() {
        let admin = addr(1);
        let mut table = table_with_roles(admin);
        let ctx = CallContext::new(admin, 10);
        table.set_max_batch_size(&ctx, MAX_BATCH_SIZE_LIMIT).unwrap();

        // One handler shared by every route keeps the fixture small.
        let handler = addr(9);
        let mut host = HandlerHost::new();
        let code = b"shared handler".to_vec();
        host.replace(
            handler,
            code.clone(),
            Box::new(|payload: &[u8]| Ok(payload.to_vec())),
        );
        let fingerprint = hash_content(&code);

        let total = MAX_STAGED_ROUTES + 1;
        let entries: Vec<RouteEntry> = (0..total)
            .map(|i| RouteEntry::new(route_key(i as u16), handler, fingerprint))
            .collect();
        let tree =
            ManifestTree::from_leaves(entries.iter().map(RouteEntry::leaf).collect()).unwrap();
        table.commit(&ctx, tree.root(), 1).unwrap();

        // Fill the staged set exactly to the ceiling.
        let batch_size = MAX_BATCH_SIZE_LIMIT as usize;
        for start in (0..MAX_STAGED_ROUTES).step_by(batch_size) {
            let end = (start + batch_size).min(MAX_STAGED_ROUTES);
            let batch: Vec<ProvenRoute> = (start..end)
                .map(|i| ProvenRoute::new(entries[i], tree.prove(i).unwrap()))
                .collect();
            table.apply(&ctx, &batch, &host).unwrap();
        }
        assert_eq!(table.staged_route_keys().len(), MAX_STAGED_ROUTES);

        // One more fresh key cannot be staged.
        let overflow = vec![ProvenRoute::new(
            entries[MAX_STAGED_ROUTES],
            tree.prove(MAX_STAGED_ROUTES).unwrap(),
        )];
        let err = table.apply(&ctx, &overflow, &host).unwrap_err();
        assert_eq!(
            err,
            RoutingError::StagedSetFull {
                staged: MAX_STAGED_ROUTES,
                incoming: 1,
                limit: MAX_STAGED_ROUTES,
            }
        );

        // Re-applying an already-staged key is still accepted.
        let restage = vec![ProvenRoute::new(entries[0], tree.prove(0).unwrap())];
        table.apply(&ctx, &restage, &host).unwrap();
    }

    #[test]
    fn activate_without_a_pending_root_is_rejected() {
        let mut table = RoutingTable::new(addr(1), 1_000);
        let host = HandlerHost::new();
        let ctx = CallContext::new(addr(1), 10);
        let err = table.activate(&ctx, &host).unwrap_err();
        assert_eq!(err, RoutingError::NoPendingRoot);
    }
}
