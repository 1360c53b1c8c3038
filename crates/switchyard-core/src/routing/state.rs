//! Manifest state and the route/handler indices.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::{Hash, leaf_hash};
use crate::types::{Address, RouteKey};

/// One route binding: key, handler, and the pinned code fingerprint.
///
/// The binding is only valid while the live code at `handler` hashes to
/// `code_fingerprint`; the table re-checks the pin at apply time and again
/// at activate time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteEntry {
    /// The fixed-width route key.
    pub route_key: RouteKey,
    /// The handler answering this key.
    pub handler: Address,
    /// Expected hash of the live code at `handler`.
    pub code_fingerprint: Hash,
}

impl RouteEntry {
    /// Creates a route entry.
    #[must_use]
    pub const fn new(route_key: RouteKey, handler: Address, code_fingerprint: Hash) -> Self {
        Self {
            route_key,
            handler,
            code_fingerprint,
        }
    }

    /// The manifest leaf this entry hashes to.
    #[must_use]
    pub fn leaf(&self) -> Hash {
        leaf_hash(&self.route_key, &self.handler, &self.code_fingerprint)
    }
}

/// Versioned manifest bookkeeping for one routing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestState {
    /// The root currently active, if any epoch has ever activated.
    pub active_root: Option<Hash>,
    /// Version counter of the active route map.
    pub active_epoch: u64,
    /// The committed-but-not-yet-active root.
    pub pending_root: Option<Hash>,
    /// Epoch the pending root targets (always `active_epoch + 1`).
    pub pending_epoch: Option<u64>,
    /// When the pending root was committed.
    pub pending_since_ns: Option<u64>,
    /// Mandatory delay between commit and activation.
    pub activation_delay_ns: u64,
    /// Additional tolerance added on top of the delay.
    pub grace_window_ns: u64,
    /// Whether dispatch is frozen. Governance stays available.
    pub frozen: bool,
}

impl ManifestState {
    /// Creates the initial state with the given activation delay.
    #[must_use]
    pub const fn new(activation_delay_ns: u64) -> Self {
        Self {
            active_root: None,
            active_epoch: 0,
            pending_root: None,
            pending_epoch: None,
            pending_since_ns: None,
            activation_delay_ns,
            grace_window_ns: 0,
            frozen: false,
        }
    }

    /// First instant at which the pending root may activate, if one exists.
    #[must_use]
    pub fn eligible_at_ns(&self) -> Option<u64> {
        self.pending_since_ns.map(|since| {
            since
                .saturating_add(self.activation_delay_ns)
                .saturating_add(self.grace_window_ns)
        })
    }

    /// Returns whether a pending root exists.
    #[must_use]
    pub const fn has_pending(&self) -> bool {
        self.pending_root.is_some()
    }
}

/// Bidirectional handler/route-key index.
///
/// Kept in lock-step with the route map inside a single mutation boundary.
/// Removal uses swap-and-pop so updates stay O(1) and never leave dangling
/// entries.
#[derive(Debug, Clone, Default)]
pub struct HandlerIndex {
    routes_by_handler: BTreeMap<Address, Vec<RouteKey>>,
    slot: BTreeMap<RouteKey, (Address, usize)>,
}

impl HandlerIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `key` to `handler`, returning the previous handler if the key
    /// was bound elsewhere.
    pub fn bind(&mut self, key: RouteKey, handler: Address) -> Option<Address> {
        if let Some((current, _)) = self.slot.get(&key) {
            if *current == handler {
                return None;
            }
        }
        let previous = self.unbind(&key);

        let routes = self.routes_by_handler.entry(handler).or_default();
        routes.push(key);
        self.slot.insert(key, (handler, routes.len() - 1));
        previous
    }

    /// Unbinds `key`, returning the handler it pointed at.
    pub fn unbind(&mut self, key: &RouteKey) -> Option<Address> {
        let (handler, position) = self.slot.remove(key)?;
        let routes = self.routes_by_handler.get_mut(&handler)?;
        routes.swap_remove(position);
        // The swapped-in key (if any) changed position; fix its slot.
        if let Some(moved) = routes.get(position).copied() {
            self.slot.insert(moved, (handler, position));
        }
        if routes.is_empty() {
            self.routes_by_handler.remove(&handler);
        }
        Some(handler)
    }

    /// All handlers with at least one bound route, sorted.
    #[must_use]
    pub fn handlers(&self) -> Vec<Address> {
        self.routes_by_handler.keys().copied().collect()
    }

    /// Route keys bound to `handler`.
    #[must_use]
    pub fn routes_for(&self, handler: &Address) -> Vec<RouteKey> {
        self.routes_by_handler
            .get(handler)
            .cloned()
            .unwrap_or_default()
    }

    /// The handler `key` is bound to, if any.
    #[must_use]
    pub fn handler_for(&self, key: &RouteKey) -> Option<Address> {
        self.slot.get(key).map(|(handler, _)| *handler)
    }

    /// Number of bound keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slot.len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> RouteKey {
        RouteKey::from_bytes([n, 0, 0, 0])
    }

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 32])
    }

    #[test]
    fn bind_and_lookup() {
        let mut index = HandlerIndex::new();
        assert_eq!(index.bind(key(1), addr(1)), None);
        assert_eq!(index.bind(key(2), addr(1)), None);

        assert_eq!(index.handler_for(&key(1)), Some(addr(1)));
        assert_eq!(index.routes_for(&addr(1)), vec![key(1), key(2)]);
        assert_eq!(index.handlers(), vec![addr(1)]);
    }

    #[test]
    fn rebind_reports_previous_handler() {
        let mut index = HandlerIndex::new();
        index.bind(key(1), addr(1));
        assert_eq!(index.bind(key(1), addr(2)), Some(addr(1)));
        assert_eq!(index.handler_for(&key(1)), Some(addr(2)));
        assert!(index.routes_for(&addr(1)).is_empty());
    }

    #[test]
    fn rebind_to_same_handler_is_noop() {
        let mut index = HandlerIndex::new();
        index.bind(key(1), addr(1));
        assert_eq!(index.bind(key(1), addr(1)), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn swap_and_pop_fixes_moved_slot() {
        let mut index = HandlerIndex::new();
        index.bind(key(1), addr(1));
        index.bind(key(2), addr(1));
        index.bind(key(3), addr(1));

        // Removing the first key swaps the last into its position.
        assert_eq!(index.unbind(&key(1)), Some(addr(1)));
        assert_eq!(index.handler_for(&key(3)), Some(addr(1)));

        // The moved key must still unbind cleanly.
        assert_eq!(index.unbind(&key(3)), Some(addr(1)));
        assert_eq!(index.routes_for(&addr(1)), vec![key(2)]);
    }

    #[test]
    fn unbinding_last_route_drops_handler() {
        let mut index = HandlerIndex::new();
        index.bind(key(1), addr(1));
        index.unbind(&key(1));
        assert!(index.handlers().is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn manifest_eligibility_saturates() {
        let mut state = ManifestState::new(u64::MAX);
        state.pending_since_ns = Some(10);
        state.grace_window_ns = 5;
        assert_eq!(state.eligible_at_ns(), Some(u64::MAX));
    }
}
