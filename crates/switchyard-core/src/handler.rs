//! Capability seams between the routing table and executable handlers.
//!
//! The routing table never owns handler logic. It talks to the outside
//! world through two narrow traits: [`CodeSource`] answers "what bytes
//! live at this address" for fingerprint checks, and [`Invoker`] forwards
//! a dispatch payload to whatever executes at an address. [`HandlerHost`]
//! is the in-memory implementation of both, pairing each address with its
//! code bytes and a boxed [`Handler`].
//!
//! Splitting the seams this way lets tests swap either side independently:
//! a mutable mock `CodeSource` is how code-substitution drift is simulated
//! without touching the registry.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::types::Address;

/// Errors produced by handler business logic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HandlerError {
    /// The handler rejected or failed to process the payload.
    #[error("handler failed: {reason}")]
    Failed {
        /// Handler-supplied failure description.
        reason: String,
    },
}

impl HandlerError {
    /// Creates a failure with the given reason.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Errors surfaced when forwarding a payload to an address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvokeError {
    /// Nothing executable is installed at the address.
    #[error("no handler installed at {address}")]
    NoHandler {
        /// The address dispatch resolved to.
        address: Address,
    },

    /// The handler ran and failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Errors from [`HandlerHost`] installation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HostError {
    /// The address already has an installed handler.
    #[error("handler already installed at {address}")]
    AlreadyInstalled {
        /// The occupied address.
        address: Address,
    },
}

/// A unit of executable handler logic.
pub trait Handler: Send + Sync {
    /// Processes a dispatch payload and returns the raw result.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if the payload cannot be processed.
    fn invoke(&self, payload: &[u8]) -> Result<Vec<u8>, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>, HandlerError> + Send + Sync,
{
    fn invoke(&self, payload: &[u8]) -> Result<Vec<u8>, HandlerError> {
        self(payload)
    }
}

/// Read access to the live code bytes at an address.
pub trait CodeSource {
    /// Returns the code at `address`, or `None` if nothing is deployed.
    fn code_at(&self, address: &Address) -> Option<&[u8]>;
}

/// Synchronous forwarding of a payload to the handler at an address.
pub trait Invoker {
    /// Invokes the handler installed at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::NoHandler`] if the address is vacant, or the
    /// handler's own failure.
    fn invoke(&self, address: &Address, payload: &[u8]) -> Result<Vec<u8>, InvokeError>;
}

struct HostedUnit {
    code: Vec<u8>,
    handler: Box<dyn Handler>,
}

/// In-memory address-to-handler map implementing both capability seams.
#[derive(Default)]
pub struct HandlerHost {
    units: BTreeMap<Address, HostedUnit>,
}

impl HandlerHost {
    /// Creates an empty host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a handler with its code bytes at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::AlreadyInstalled`] if the address is occupied;
    /// use [`HandlerHost::replace`] to swap code deliberately.
    pub fn install(
        &mut self,
        address: Address,
        code: Vec<u8>,
        handler: Box<dyn Handler>,
    ) -> Result<(), HostError> {
        if self.units.contains_key(&address) {
            return Err(HostError::AlreadyInstalled { address });
        }
        self.units.insert(address, HostedUnit { code, handler });
        Ok(())
    }

    /// Replaces whatever is at `address`, occupied or not.
    ///
    /// This is the code-substitution path: the routing table's fingerprint
    /// re-verification exists to catch exactly this happening between
    /// apply and activate.
    pub fn replace(&mut self, address: Address, code: Vec<u8>, handler: Box<dyn Handler>) {
        self.units.insert(address, HostedUnit { code, handler });
    }

    /// Removes the handler at `address`, returning whether one existed.
    pub fn remove(&mut self, address: &Address) -> bool {
        self.units.remove(address).is_some()
    }

    /// Returns whether anything is installed at `address`.
    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.units.contains_key(address)
    }

    /// Number of installed handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` if no handlers are installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl CodeSource for HandlerHost {
    fn code_at(&self, address: &Address) -> Option<&[u8]> {
        self.units.get(address).map(|unit| unit.code.as_slice())
    }
}

impl Invoker for HandlerHost {
    fn invoke(&self, address: &Address, payload: &[u8]) -> Result<Vec<u8>, InvokeError> {
        let unit = self
            .units
            .get(address)
            .ok_or(InvokeError::NoHandler { address: *address })?;
        Ok(unit.handler.invoke(payload)?)
    }
}
