//! Versioned persistence for instance state.
//!
//! Instead of a frozen storage layout that only works by offset
//! convention, persisted state carries an explicit `schema_version` and
//! evolves through guarded migration functions. Unknown versions are
//! rejected with enough context to pick the right tooling; known old
//! versions are migrated field-by-field before decoding.
//!
//! The event log is deliberately not part of the snapshot: it is an
//! observer surface, and indexers that care about history retain it
//! themselves.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::access::AccessControl;
use crate::crypto::Hash;
use crate::registry::{ChunkRecord, CodeUnit, DeploymentRegistry, FeeSchedule};
use crate::routing::{ManifestState, RouteEntry, RoutingTable};
use crate::types::{Address, RouteKey};

/// Current snapshot schema version.
///
/// Version 1 predates the grace window and the configurable fee schedule;
/// [`migrate_v1`] fills both with their historical defaults.
pub const SCHEMA_VERSION: u32 = 2;

/// Errors from snapshot encoding, decoding, and migration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SnapshotError {
    /// JSON (de)serialization failed.
    #[error("snapshot codec failure: {0}")]
    Codec(#[from] serde_json::Error),

    /// The snapshot's schema version is not supported.
    #[error("unsupported schema version {found}: this build supports up to {supported}")]
    UnsupportedSchema {
        /// Version found in the document.
        found: u32,
        /// Newest version this build reads.
        supported: u32,
    },

    /// The document is missing a required field.
    #[error("snapshot missing field: {field}")]
    MissingField {
        /// Dotted path of the missing field.
        field: &'static str,
    },
}

/// Persisted routing-table state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingSnapshot {
    /// Manifest bookkeeping.
    pub manifest: ManifestState,
    /// All bound routes.
    pub routes: Vec<RouteEntry>,
    /// Keys staged for the next activation.
    pub staged: Vec<RouteKey>,
    /// Roots that have been activated and are consumed forever.
    pub consumed_roots: Vec<Hash>,
    /// The configured batch limit.
    pub max_batch_size: u32,
    /// Role grants.
    pub access: AccessControl,
}

/// Persisted registry state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySnapshot {
    /// The registry identity used in address derivation.
    pub identity: Address,
    /// All staged chunk records.
    pub chunks: Vec<ChunkRecord>,
    /// All deployed code units keyed by address.
    pub code_units: Vec<(Address, CodeUnit)>,
    /// The active fee schedule.
    pub fee_schedule: FeeSchedule,
    /// Fees collected and not yet withdrawn.
    pub collected_fees: u64,
    /// Role grants.
    pub access: AccessControl,
}

/// One instance's complete persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceSnapshot {
    /// Schema version of this document.
    pub schema_version: u32,
    /// Routing-table state.
    pub routing: RoutingSnapshot,
    /// Registry state.
    pub registry: RegistrySnapshot,
}

/// Captures the current state of a table and registry.
#[must_use]
pub fn capture(table: &RoutingTable, registry: &DeploymentRegistry) -> InstanceSnapshot {
    let (manifest, routes, staged, consumed_roots, table_access, max_batch_size) =
        table.snapshot_parts();
    let (identity, chunks, code_units, fee_schedule, collected_fees, registry_access) =
        registry.snapshot_parts();
    InstanceSnapshot {
        schema_version: SCHEMA_VERSION,
        routing: RoutingSnapshot {
            manifest: manifest.clone(),
            routes,
            staged,
            consumed_roots,
            max_batch_size,
            access: table_access.clone(),
        },
        registry: RegistrySnapshot {
            identity,
            chunks,
            code_units,
            fee_schedule: fee_schedule.clone(),
            collected_fees,
            access: registry_access.clone(),
        },
    }
}

/// Rebuilds a routing table and registry from a snapshot.
///
/// Derived structures (the handler index, lookup maps) are reconstructed;
/// both components start with empty event logs.
#[must_use]
pub fn restore(snapshot: InstanceSnapshot) -> (RoutingTable, DeploymentRegistry) {
    let routing = snapshot.routing;
    let table = RoutingTable::restore_parts(
        routing.manifest,
        routing.routes,
        routing.staged,
        routing.consumed_roots,
        routing.access,
        routing.max_batch_size,
    );
    let registry = snapshot.registry;
    let registry = DeploymentRegistry::restore_parts(
        registry.identity,
        registry.chunks,
        registry.code_units,
        registry.fee_schedule,
        registry.collected_fees,
        registry.access,
    );
    (table, registry)
}

/// Encodes a snapshot as JSON.
///
/// # Errors
///
/// Returns [`SnapshotError::Codec`] on serialization failure.
pub fn encode(snapshot: &InstanceSnapshot) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

/// Decodes a snapshot, migrating old schema versions as needed.
///
/// # Errors
///
/// Returns [`SnapshotError::UnsupportedSchema`] for versions this build
/// does not know, or [`SnapshotError`] variants for malformed documents.
pub fn decode(json: &str) -> Result<InstanceSnapshot, SnapshotError> {
    let mut document: Value = serde_json::from_str(json)?;
    let version = document
        .get("schema_version")
        .and_then(Value::as_u64)
        .ok_or(SnapshotError::MissingField {
            field: "schema_version",
        })?;

    match u32::try_from(version).unwrap_or(u32::MAX) {
        1 => {
            migrate_v1(&mut document)?;
            Ok(serde_json::from_value(document)?)
        },
        SCHEMA_VERSION => Ok(serde_json::from_value(document)?),
        found => Err(SnapshotError::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        }),
    }
}

/// Migrates a version-1 document in place.
///
/// Version 1 had no `grace_window_ns` on the manifest (the grace window
/// shipped later, defaulting to zero) and no persisted `fee_schedule`
/// (fees were fixed at the defaults).
fn migrate_v1(document: &mut Value) -> Result<(), SnapshotError> {
    let manifest = document
        .get_mut("routing")
        .and_then(|routing| routing.get_mut("manifest"))
        .and_then(Value::as_object_mut)
        .ok_or(SnapshotError::MissingField {
            field: "routing.manifest",
        })?;
    manifest
        .entry("grace_window_ns")
        .or_insert_with(|| Value::from(0u64));

    let registry = document
        .get_mut("registry")
        .and_then(Value::as_object_mut)
        .ok_or(SnapshotError::MissingField { field: "registry" })?;
    if !registry.contains_key("fee_schedule") {
        let default_schedule = serde_json::to_value(FeeSchedule::default())?;
        registry.insert("fee_schedule".to_string(), default_schedule);
    }

    document["schema_version"] = Value::from(SCHEMA_VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::CallContext;
    use crate::crypto::hash_content;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 32])
    }

    fn populated_instance() -> (RoutingTable, DeploymentRegistry) {
        let admin = addr(1);
        let table = RoutingTable::new(admin, 1_000);
        let mut registry = DeploymentRegistry::new(addr(2), admin);
        let ctx = CallContext::new(addr(3), 50).with_fee(100);
        registry.stage(&ctx, b"chunk-content").unwrap();
        registry
            .deploy_deterministic(&ctx, hash_content(b"salt"), b"handler code", b"")
            .unwrap();
        (table, registry)
    }

    #[test]
    fn capture_restore_roundtrip() {
        let (table, registry) = populated_instance();
        let snapshot = capture(&table, &registry);
        let json = encode(&snapshot).unwrap();
        let decoded = decode(&json).unwrap();
        assert_eq!(decoded, snapshot);

        let (restored_table, restored_registry) = restore(decoded);
        assert_eq!(
            restored_table.manifest_state(),
            table.manifest_state()
        );
        assert_eq!(restored_registry.collected_fees(), registry.collected_fees());
        let (address, content_hash) = registry.predict(b"chunk-content");
        assert!(restored_registry.exists(&content_hash));
        assert!(restored_registry.is_deployed(&address));
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let (table, registry) = populated_instance();
        let mut snapshot = capture(&table, &registry);
        snapshot.schema_version = 99;
        let json = encode(&snapshot).unwrap();

        let err = decode(&json).unwrap_err();
        match err {
            SnapshotError::UnsupportedSchema { found, supported } => {
                assert_eq!(found, 99);
                assert_eq!(supported, SCHEMA_VERSION);
            },
            other => panic!("expected UnsupportedSchema, got {other:?}"),
        }
    }

    #[test]
    fn v1_document_is_migrated() {
        let (table, registry) = populated_instance();
        let snapshot = capture(&table, &registry);
        let mut document: Value = serde_json::from_str(&encode(&snapshot).unwrap()).unwrap();

        // Shape the document the way version 1 wrote it.
        document["schema_version"] = Value::from(1u32);
        document["routing"]["manifest"]
            .as_object_mut()
            .unwrap()
            .remove("grace_window_ns");
        document["registry"]
            .as_object_mut()
            .unwrap()
            .remove("fee_schedule");
        let json = document.to_string();

        let decoded = decode(&json).unwrap();
        assert_eq!(decoded.schema_version, SCHEMA_VERSION);
        assert_eq!(decoded.routing.manifest.grace_window_ns, 0);
        assert_eq!(decoded.registry.fee_schedule, FeeSchedule::default());
    }

    #[test]
    fn missing_schema_version_is_reported() {
        let err = decode("{}").unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::MissingField {
                field: "schema_version"
            }
        ));
    }
}
