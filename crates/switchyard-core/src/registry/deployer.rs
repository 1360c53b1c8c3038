//! The content-addressed deployment registry.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::access::{AccessControl, CallContext, Role};
use crate::crypto::{
    Hash, chunk_hash, code_hash, ct_hash_eq, derive_content_address,
    derive_deterministic_address,
};
use crate::events::{Event, EventLog, EventRecord};
use crate::handler::CodeSource;
use crate::types::Address;

use super::error::RegistryError;
use super::fees::FeeSchedule;

/// Hard ceiling on deployable code size.
///
/// Rejected before hashing or fee computation so a deployment bomb costs
/// its sender nothing but the call itself.
pub const MAX_CODE_SIZE: usize = 24_576;

/// Ceiling on constructor argument size.
pub const MAX_CTOR_ARGS_SIZE: usize = 4_096;

/// Ceiling on staged chunk content size.
pub const MAX_CONTENT_SIZE: usize = 24_576;

/// Largest accepted staging batch.
pub const MAX_STAGE_BATCH: usize = 64;

/// Largest accepted deployment batch.
pub const MAX_DEPLOY_BATCH: usize = 32;

/// Record of one staged chunk. Created once per unique content, never
/// deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkRecord {
    /// Domain-separated hash of the chunk content.
    pub content_hash: Hash,
    /// The derived content address.
    pub address: Address,
    /// Content size in bytes.
    pub size: u64,
    /// When the chunk was first staged.
    pub created_at_ns: u64,
}

/// An immutable deployed code unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodeUnit {
    /// The stored bytes, hex encoded in snapshots.
    #[serde(with = "crate::types::hex_bytes")]
    pub code: Vec<u8>,
    /// The hash the unit's address was derived from.
    pub code_hash: Hash,
    /// Deployment salt, absent for staged chunks.
    pub salt: Option<Hash>,
    /// When the unit was deployed.
    pub deployed_at_ns: u64,
}

/// Result of staging one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOutcome {
    /// The chunk's address.
    pub address: Address,
    /// The chunk's content hash.
    pub content_hash: Hash,
    /// Whether this call performed the deployment.
    pub created: bool,
    /// Fee units collected.
    pub fee_charged: u64,
    /// Fee units returned to the caller.
    pub refund: u64,
}

/// Per-item result inside a staging batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagedChunk {
    /// The chunk's address.
    pub address: Address,
    /// The chunk's content hash.
    pub content_hash: Hash,
    /// Whether this batch performed the deployment.
    pub created: bool,
    /// Fee units this item contributed.
    pub fee_charged: u64,
}

/// Result of an all-or-nothing staging batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageBatchOutcome {
    /// Per-item outcomes in submission order.
    pub staged: Vec<StagedChunk>,
    /// Total fee units collected.
    pub fee_charged: u64,
    /// Unused fee units returned to the caller.
    pub refund: u64,
}

/// One deployment request inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    /// The deployment salt.
    pub salt: Hash,
    /// The code to deploy.
    pub code: Vec<u8>,
    /// Constructor arguments folded into the code hash.
    pub ctor_args: Vec<u8>,
}

/// Result of one deterministic deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployOutcome {
    /// The derived address.
    pub address: Address,
    /// Hash over code and constructor args.
    pub code_hash: Hash,
    /// Whether this call performed the deployment.
    pub created: bool,
    /// Fee units collected.
    pub fee_charged: u64,
    /// Fee units returned to the caller.
    pub refund: u64,
}

/// Per-item result inside a deployment batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployedUnit {
    /// The derived address.
    pub address: Address,
    /// Hash over code and constructor args.
    pub code_hash: Hash,
    /// Whether this batch performed the deployment.
    pub created: bool,
    /// Fee units this item contributed.
    pub fee_charged: u64,
}

/// Result of an all-or-nothing deployment batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployBatchOutcome {
    /// Per-item outcomes in submission order.
    pub deployed: Vec<DeployedUnit>,
    /// Total fee units collected.
    pub fee_charged: u64,
    /// Unused fee units returned to the caller.
    pub refund: u64,
}

/// Content-addressed staging and deterministic deployment.
///
/// Addresses are pure functions of the registry identity and the content
/// or `(salt, code hash)` pair, so independently operated instances that
/// share an identity converge on identical addresses without
/// coordination. Staging and deployment are idempotent: repeating a call
/// with identical inputs returns the existing address, charges nothing,
/// and refunds the full fee.
///
/// Staging and deployment are permissionless fee-paying operations; fee
/// withdrawal and schedule changes require the `ADMIN` role.
#[derive(Debug, Clone)]
pub struct DeploymentRegistry {
    identity: Address,
    chunks: BTreeMap<Hash, ChunkRecord>,
    code: BTreeMap<Address, CodeUnit>,
    fees: FeeSchedule,
    collected: u64,
    access: AccessControl,
    log: EventLog,
}

impl DeploymentRegistry {
    /// Creates a registry with the given identity and admin.
    #[must_use]
    pub fn new(identity: Address, admin: Address) -> Self {
        Self {
            identity,
            chunks: BTreeMap::new(),
            code: BTreeMap::new(),
            fees: FeeSchedule::default(),
            collected: 0,
            access: AccessControl::new(admin),
            log: EventLog::new(),
        }
    }

    /// Replaces the default fee schedule at construction time.
    #[must_use]
    pub fn with_fee_schedule(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    // -- staging ------------------------------------------------------------

    /// Stages `content` as an immutable chunk, returning its address.
    ///
    /// Restaging identical content is a no-op that returns the existing
    /// address and refunds the full fee.
    ///
    /// # Errors
    ///
    /// Fails on oversized content, an address collision, or an
    /// insufficient fee.
    pub fn stage(
        &mut self,
        ctx: &CallContext,
        content: &[u8],
    ) -> Result<StageOutcome, RegistryError> {
        if content.len() > MAX_CONTENT_SIZE {
            return Err(RegistryError::ContentTooLarge {
                size: content.len(),
                limit: MAX_CONTENT_SIZE,
            });
        }

        let content_hash = chunk_hash(content);
        if let Some(record) = self.chunks.get(&content_hash) {
            return Ok(StageOutcome {
                address: record.address,
                content_hash,
                created: false,
                fee_charged: 0,
                refund: ctx.fee,
            });
        }

        let address = derive_content_address(&self.identity, &content_hash);
        self.check_vacant(&address, &content_hash)?;

        let required = self.fees.fee_for(content.len());
        if ctx.fee < required {
            return Err(RegistryError::FeeInsufficient {
                required,
                provided: ctx.fee,
            });
        }

        self.record_chunk(ctx, content, content_hash, address);
        self.collected += required;
        Ok(StageOutcome {
            address,
            content_hash,
            created: true,
            fee_charged: required,
            refund: ctx.fee - required,
        })
    }

    /// Stages a batch of chunks, all-or-nothing.
    ///
    /// Duplicate content inside the batch is staged once; later
    /// occurrences report `created: false`. Unused fee is refunded.
    ///
    /// # Errors
    ///
    /// Any invalid item rejects the whole batch with no state change.
    pub fn stage_batch(
        &mut self,
        ctx: &CallContext,
        contents: &[Vec<u8>],
    ) -> Result<StageBatchOutcome, RegistryError> {
        if contents.is_empty() {
            return Err(RegistryError::EmptyBatch);
        }
        if contents.len() > MAX_STAGE_BATCH {
            return Err(RegistryError::BatchTooLarge {
                submitted: contents.len(),
                limit: MAX_STAGE_BATCH,
            });
        }

        // Validation pass: no writes until every item is vetted.
        let mut planned: Vec<(Hash, Address, bool, u64)> = Vec::with_capacity(contents.len());
        let mut seen_in_batch = BTreeSet::new();
        let mut total_fee = 0u64;
        for content in contents {
            if content.len() > MAX_CONTENT_SIZE {
                return Err(RegistryError::ContentTooLarge {
                    size: content.len(),
                    limit: MAX_CONTENT_SIZE,
                });
            }
            let content_hash = chunk_hash(content);
            let address = derive_content_address(&self.identity, &content_hash);
            let fresh =
                !self.chunks.contains_key(&content_hash) && seen_in_batch.insert(content_hash);
            let fee = if fresh {
                self.check_vacant(&address, &content_hash)?;
                self.fees.fee_for(content.len())
            } else {
                0
            };
            total_fee += fee;
            planned.push((content_hash, address, fresh, fee));
        }
        if ctx.fee < total_fee {
            return Err(RegistryError::FeeInsufficient {
                required: total_fee,
                provided: ctx.fee,
            });
        }

        let mut staged = Vec::with_capacity(contents.len());
        for (content, (content_hash, address, fresh, fee)) in contents.iter().zip(planned) {
            if fresh {
                self.record_chunk(ctx, content, content_hash, address);
            }
            staged.push(StagedChunk {
                address,
                content_hash,
                created: fresh,
                fee_charged: fee,
            });
        }
        self.collected += total_fee;
        Ok(StageBatchOutcome {
            staged,
            fee_charged: total_fee,
            refund: ctx.fee - total_fee,
        })
    }

    // -- deterministic deployment -------------------------------------------

    /// Deploys `code` at the address derived from the salt and code hash.
    ///
    /// Idempotent: if the address already holds matching content the call
    /// returns it without re-running any initialization and refunds the
    /// full fee.
    ///
    /// # Errors
    ///
    /// Fails on oversized code or args, a mismatched occupant at the
    /// derived address, or an insufficient fee.
    pub fn deploy_deterministic(
        &mut self,
        ctx: &CallContext,
        salt: Hash,
        code: &[u8],
        ctor_args: &[u8],
    ) -> Result<DeployOutcome, RegistryError> {
        check_deploy_sizes(code, ctor_args)?;

        let unit_hash = code_hash(code, ctor_args);
        let address = derive_deterministic_address(&self.identity, &salt, &unit_hash);
        if let Some(existing) = self.code.get(&address) {
            if ct_hash_eq(&existing.code_hash, &unit_hash) {
                return Ok(DeployOutcome {
                    address,
                    code_hash: unit_hash,
                    created: false,
                    fee_charged: 0,
                    refund: ctx.fee,
                });
            }
            return Err(RegistryError::AddressCollision {
                address,
                expected: hex::encode(unit_hash),
                found: hex::encode(existing.code_hash),
            });
        }

        let required = self.fees.fee_for(code.len());
        if ctx.fee < required {
            return Err(RegistryError::FeeInsufficient {
                required,
                provided: ctx.fee,
            });
        }

        self.record_deploy(ctx, salt, code, unit_hash, address);
        self.collected += required;
        Ok(DeployOutcome {
            address,
            code_hash: unit_hash,
            created: true,
            fee_charged: required,
            refund: ctx.fee - required,
        })
    }

    /// Deploys a batch deterministically, all-or-nothing.
    ///
    /// Identical requests inside the batch deploy once; later occurrences
    /// report `created: false`. Unused fee is refunded.
    ///
    /// # Errors
    ///
    /// Any invalid item rejects the whole batch with no state change.
    pub fn deploy_deterministic_batch(
        &mut self,
        ctx: &CallContext,
        requests: &[DeployRequest],
    ) -> Result<DeployBatchOutcome, RegistryError> {
        if requests.is_empty() {
            return Err(RegistryError::EmptyBatch);
        }
        if requests.len() > MAX_DEPLOY_BATCH {
            return Err(RegistryError::BatchTooLarge {
                submitted: requests.len(),
                limit: MAX_DEPLOY_BATCH,
            });
        }

        let mut planned: Vec<(Hash, Address, bool, u64)> = Vec::with_capacity(requests.len());
        let mut seen_in_batch: BTreeMap<Address, Hash> = BTreeMap::new();
        let mut total_fee = 0u64;
        for request in requests {
            check_deploy_sizes(&request.code, &request.ctor_args)?;
            let unit_hash = code_hash(&request.code, &request.ctor_args);
            let address = derive_deterministic_address(&self.identity, &request.salt, &unit_hash);

            let occupant = self
                .code
                .get(&address)
                .map(|unit| unit.code_hash)
                .or_else(|| seen_in_batch.get(&address).copied());
            let fresh = match occupant {
                Some(found) if ct_hash_eq(&found, &unit_hash) => false,
                Some(found) => {
                    return Err(RegistryError::AddressCollision {
                        address,
                        expected: hex::encode(unit_hash),
                        found: hex::encode(found),
                    });
                },
                None => {
                    seen_in_batch.insert(address, unit_hash);
                    true
                },
            };
            let fee = if fresh {
                self.fees.fee_for(request.code.len())
            } else {
                0
            };
            total_fee += fee;
            planned.push((unit_hash, address, fresh, fee));
        }
        if ctx.fee < total_fee {
            return Err(RegistryError::FeeInsufficient {
                required: total_fee,
                provided: ctx.fee,
            });
        }

        let mut deployed = Vec::with_capacity(requests.len());
        for (request, (unit_hash, address, fresh, fee)) in requests.iter().zip(planned) {
            if fresh {
                self.record_deploy(ctx, request.salt, &request.code, unit_hash, address);
            }
            deployed.push(DeployedUnit {
                address,
                code_hash: unit_hash,
                created: fresh,
                fee_charged: fee,
            });
        }
        self.collected += total_fee;
        Ok(DeployBatchOutcome {
            deployed,
            fee_charged: total_fee,
            refund: ctx.fee - total_fee,
        })
    }

    // -- prediction and queries ---------------------------------------------

    /// Computes the address `content` would stage to, without staging.
    #[must_use]
    pub fn predict(&self, content: &[u8]) -> (Address, Hash) {
        let content_hash = chunk_hash(content);
        (
            derive_content_address(&self.identity, &content_hash),
            content_hash,
        )
    }

    /// Computes the address a `(salt, code hash)` pair deploys to, without
    /// deploying.
    #[must_use]
    pub fn predict_address(&self, salt: &Hash, unit_hash: &Hash) -> Address {
        derive_deterministic_address(&self.identity, salt, unit_hash)
    }

    /// Whether a chunk with this content hash exists.
    #[must_use]
    pub fn exists(&self, content_hash: &Hash) -> bool {
        self.chunks.contains_key(content_hash)
    }

    /// Whether anything is deployed at `address`.
    #[must_use]
    pub fn is_deployed(&self, address: &Address) -> bool {
        self.code.contains_key(address)
    }

    /// The chunk record for a content hash.
    #[must_use]
    pub fn chunk(&self, content_hash: &Hash) -> Option<&ChunkRecord> {
        self.chunks.get(content_hash)
    }

    /// The registry's identity used in address derivation.
    #[must_use]
    pub const fn identity(&self) -> Address {
        self.identity
    }

    /// The active fee schedule.
    #[must_use]
    pub const fn fee_schedule(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Fee units collected and not yet withdrawn.
    #[must_use]
    pub const fn collected_fees(&self) -> u64 {
        self.collected
    }

    // -- administration -----------------------------------------------------

    /// Withdraws all collected fees to the caller.
    ///
    /// State is zeroed before the amount is handed back, so a re-entrant
    /// caller cannot observe a balance it can withdraw twice.
    ///
    /// # Errors
    ///
    /// Requires the `ADMIN` role; fails when nothing has accumulated.
    pub fn withdraw_fees(&mut self, ctx: &CallContext) -> Result<u64, RegistryError> {
        self.access.require(&ctx.caller, Role::Admin)?;
        if self.collected == 0 {
            return Err(RegistryError::NothingToWithdraw);
        }
        let amount = self.collected;
        self.collected = 0;
        self.log.append(
            ctx.now_ns,
            Event::FeesWithdrawn {
                to: ctx.caller,
                amount,
            },
        );
        debug!(amount, to = %ctx.caller, "fees withdrawn");
        Ok(amount)
    }

    /// Replaces the fee schedule.
    ///
    /// # Errors
    ///
    /// Requires the `ADMIN` role.
    pub fn set_fee_schedule(
        &mut self,
        ctx: &CallContext,
        fees: FeeSchedule,
    ) -> Result<(), RegistryError> {
        self.access.require(&ctx.caller, Role::Admin)?;
        let previous = self.fees.tiers().len() as u64;
        let current = fees.tiers().len() as u64;
        self.fees = fees;
        self.log.append(
            ctx.now_ns,
            Event::ConfigChanged {
                parameter: "fee_schedule_tiers".to_string(),
                previous,
                current,
            },
        );
        Ok(())
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
    ) -> Result<bool, RegistryError> {
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
    ) -> Result<bool, RegistryError> {
        Ok(self.access.revoke(ctx, role, member)?)
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

    fn check_vacant(&self, address: &Address, unit_hash: &Hash) -> Result<(), RegistryError> {
        if let Some(existing) = self.code.get(address) {
            if !ct_hash_eq(&existing.code_hash, unit_hash) {
                return Err(RegistryError::AddressCollision {
                    address: *address,
                    expected: hex::encode(unit_hash),
                    found: hex::encode(existing.code_hash),
                });
            }
        }
        Ok(())
    }

    fn record_chunk(
        &mut self,
        ctx: &CallContext,
        content: &[u8],
        content_hash: Hash,
        address: Address,
    ) {
        self.chunks.insert(
            content_hash,
            ChunkRecord {
                content_hash,
                address,
                size: content.len() as u64,
                created_at_ns: ctx.now_ns,
            },
        );
        self.code.insert(
            address,
            CodeUnit {
                code: content.to_vec(),
                code_hash: content_hash,
                salt: None,
                deployed_at_ns: ctx.now_ns,
            },
        );
        self.log.append(
            ctx.now_ns,
            Event::ChunkStaged {
                content_hash,
                address,
                size: content.len() as u64,
            },
        );
    }

    fn record_deploy(
        &mut self,
        ctx: &CallContext,
        salt: Hash,
        code: &[u8],
        unit_hash: Hash,
        address: Address,
    ) {
        self.code.insert(
            address,
            CodeUnit {
                code: code.to_vec(),
                code_hash: unit_hash,
                salt: Some(salt),
                deployed_at_ns: ctx.now_ns,
            },
        );
        self.log.append(
            ctx.now_ns,
            Event::ContractDeployed {
                address,
                code_hash: unit_hash,
                salt,
            },
        );
    }

    pub(crate) fn restore_parts(
        identity: Address,
        chunks: Vec<ChunkRecord>,
        code_units: Vec<(Address, CodeUnit)>,
        fees: FeeSchedule,
        collected: u64,
        access: AccessControl,
    ) -> Self {
        Self {
            identity,
            chunks: chunks
                .into_iter()
                .map(|record| (record.content_hash, record))
                .collect(),
            code: code_units.into_iter().collect(),
            fees,
            collected,
            access,
            log: EventLog::new(),
        }
    }

    pub(crate) fn snapshot_parts(
        &self,
    ) -> (
        Address,
        Vec<ChunkRecord>,
        Vec<(Address, CodeUnit)>,
        &FeeSchedule,
        u64,
        &AccessControl,
    ) {
        (
            self.identity,
            self.chunks.values().copied().collect(),
            self.code
                .iter()
                .map(|(address, unit)| (*address, unit.clone()))
                .collect(),
            &self.fees,
            self.collected,
            &self.access,
        )
    }
}

impl CodeSource for DeploymentRegistry {
    fn code_at(&self, address: &Address) -> Option<&[u8]> {
        self.code.get(address).map(|unit| unit.code.as_slice())
    }
}

fn check_deploy_sizes(code: &[u8], ctor_args: &[u8]) -> Result<(), RegistryError> {
    if code.len() > MAX_CODE_SIZE {
        return Err(RegistryError::CodeTooLarge {
            size: code.len(),
            limit: MAX_CODE_SIZE,
        });
    }
    if ctor_args.len() > MAX_CTOR_ARGS_SIZE {
        return Err(RegistryError::CtorArgsTooLarge {
            size: ctor_args.len(),
            limit: MAX_CTOR_ARGS_SIZE,
        });
    }
    Ok(())
}
