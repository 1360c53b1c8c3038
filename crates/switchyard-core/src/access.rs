//! Role assignment and explicit caller context.
//!
//! Every mutating entry point takes a [`CallContext`] carrying the caller
//! identity, the current timestamp, and any fee provided with the call.
//! Nothing in this crate reads an ambient clock or an ambient caller; the
//! surrounding runtime decides both and passes them in, which keeps the
//! state machines deterministic and testable.
//!
//! # Roles
//!
//! - `Commit`: may record or overwrite a pending manifest root
//! - `Apply`: may apply proven route batches against the pending root
//! - `Emergency`: may freeze and unfreeze dispatch
//! - `Admin`: may tune configuration, manage grants, and withdraw fees

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Address;

/// Named roles gating the mutating entry points.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[non_exhaustive]
pub enum Role {
    /// May commit or overwrite pending manifest roots.
    Commit,
    /// May apply proven route batches.
    Apply,
    /// May freeze and unfreeze dispatch.
    Emergency,
    /// May manage grants, configuration, and fee withdrawal.
    Admin,
}

impl Role {
    /// Returns all roles.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Commit, Self::Apply, Self::Emergency, Self::Admin]
    }

    /// Returns the string representation of this role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "COMMIT",
            Self::Apply => "APPLY",
            Self::Emergency => "EMERGENCY",
            Self::Admin => "ADMIN",
        }
    }

    /// Parses a role from its string representation.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::UnknownRole`] for unrecognized input.
    pub fn parse(s: &str) -> Result<Self, AccessError> {
        match s.to_uppercase().as_str() {
            "COMMIT" => Ok(Self::Commit),
            "APPLY" => Ok(Self::Apply),
            "EMERGENCY" => Ok(Self::Emergency),
            "ADMIN" => Ok(Self::Admin),
            _ => Err(AccessError::UnknownRole {
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during access checks and grant management.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AccessError {
    /// The caller does not hold the required role.
    #[error("caller {actor} does not hold required role {role}")]
    MissingRole {
        /// The caller that was rejected.
        actor: Address,
        /// The role the operation requires.
        role: Role,
    },

    /// Revoking this grant would leave the instance without an admin.
    #[error("cannot revoke last admin {actor}")]
    LastAdmin {
        /// The admin that would have been removed.
        actor: Address,
    },

    /// A role string did not parse.
    #[error("unknown role: {value}")]
    UnknownRole {
        /// The unrecognized input.
        value: String,
    },
}

/// Explicit per-call context replacing ambient caller, clock, and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// The identity invoking the operation.
    pub caller: Address,
    /// Current time in Unix nanoseconds, supplied by the runtime.
    pub now_ns: u64,
    /// Fee units provided with the call.
    pub fee: u64,
}

impl CallContext {
    /// Creates a context with no fee attached.
    #[must_use]
    pub const fn new(caller: Address, now_ns: u64) -> Self {
        Self {
            caller,
            now_ns,
            fee: 0,
        }
    }

    /// Attaches fee units to the context.
    #[must_use]
    pub const fn with_fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }
}

/// Role-to-member grants for one component instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessControl {
    grants: BTreeMap<Role, BTreeSet<Address>>,
}

impl AccessControl {
    /// Creates an access control seeded with one admin.
    #[must_use]
    pub fn new(admin: Address) -> Self {
        let mut grants = BTreeMap::new();
        grants.insert(Role::Admin, BTreeSet::from([admin]));
        Self { grants }
    }

    /// Returns whether `actor` holds `role`.
    #[must_use]
    pub fn has_role(&self, actor: &Address, role: Role) -> bool {
        self.grants
            .get(&role)
            .is_some_and(|members| members.contains(actor))
    }

    /// Requires that `actor` holds `role`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::MissingRole`] if it does not.
    pub fn require(&self, actor: &Address, role: Role) -> Result<(), AccessError> {
        if self.has_role(actor, role) {
            Ok(())
        } else {
            Err(AccessError::MissingRole {
                actor: *actor,
                role,
            })
        }
    }

    /// Grants `role` to `member`. Requires the caller to be an admin.
    ///
    /// Returns `true` if the grant is new.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::MissingRole`] if the caller is not an admin.
    pub fn grant(
        &mut self,
        ctx: &CallContext,
        role: Role,
        member: Address,
    ) -> Result<bool, AccessError> {
        self.require(&ctx.caller, Role::Admin)?;
        Ok(self.grants.entry(role).or_default().insert(member))
    }

    /// Revokes `role` from `member`. Requires the caller to be an admin.
    ///
    /// Returns `true` if the grant existed.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::MissingRole`] if the caller is not an admin,
    /// or [`AccessError::LastAdmin`] if the revocation would remove the
    /// final admin.
    pub fn revoke(
        &mut self,
        ctx: &CallContext,
        role: Role,
        member: &Address,
    ) -> Result<bool, AccessError> {
        self.require(&ctx.caller, Role::Admin)?;
        if role == Role::Admin {
            let admins = self.grants.get(&Role::Admin);
            let is_last = admins
                .map(|members| members.len() == 1 && members.contains(member))
                .unwrap_or_default();
            if is_last {
                return Err(AccessError::LastAdmin { actor: *member });
            }
        }
        Ok(self
            .grants
            .get_mut(&role)
            .is_some_and(|members| members.remove(member)))
    }

    /// Lists members holding `role`, sorted.
    #[must_use]
    pub fn members(&self, role: Role) -> Vec<Address> {
        self.grants
            .get(&role)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }
}
