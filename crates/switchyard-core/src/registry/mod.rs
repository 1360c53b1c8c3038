//! Content-addressed staging and deterministic deployment.
//!
//! The registry produces the addresses the routing table references. Two
//! paths exist:
//!
//! - **Staging**: arbitrary content becomes an immutable chunk at an
//!   address derived from its hash. Identical content always lands at the
//!   same address; restaging is a free no-op.
//! - **Deterministic deployment**: code deploys at an address derived
//!   purely from `(registry identity, salt, code hash)`, independent of
//!   deployment order or prior state. Two instances sharing an identity
//!   converge on the same addresses from the same inputs with no
//!   coordination; planners verify this ahead of submission with the
//!   `predict` queries.
//!
//! Mutating calls collect a size-tiered fee; overestimates are refunded.
//! Batch variants are capped and all-or-nothing.

mod deployer;
mod error;
mod fees;

pub use deployer::{
    ChunkRecord, CodeUnit, DeployBatchOutcome, DeployOutcome, DeployRequest, DeployedUnit,
    DeploymentRegistry, MAX_CODE_SIZE, MAX_CONTENT_SIZE, MAX_CTOR_ARGS_SIZE, MAX_DEPLOY_BATCH,
    MAX_STAGE_BATCH, StageBatchOutcome, StageOutcome, StagedChunk,
};
pub use error::RegistryError;
pub use fees::{FeeSchedule, FeeScheduleError, FeeTier};
