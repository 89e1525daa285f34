//! # Vault Errors
//!
//! One enum for everything a vault can reject, plus [`ErrorKind`], the
//! stable seven-way classification callers branch on. Variants carry the
//! values that made the operation fail; the kind says what sort of failure
//! it was.
//!
//! Every error aborts the whole operation. The vault restores its state and
//! unwinds any transfers it already made before returning one of these.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use keel_protocol::{Address, ArithmeticError, BatchError, ExternalError, TokenId, VaultVersion};

use crate::access::Role;

/// Stable classification of a [`VaultError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Caller lacks the required role.
    Authorization,
    /// Operation invalid in the vault's current lifecycle state.
    State,
    /// Malformed or inadmissible input.
    Validation,
    /// Overflow, or a narrowing conversion out of range.
    Arithmetic,
    /// A collaborator call failed or reported failure.
    ExternalCall,
    /// Liquidation attempted against a healthy vault.
    Health,
    /// Request would breach the required collateral coverage.
    Collateral,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Authorization => "authorization",
            ErrorKind::State => "state",
            ErrorKind::Validation => "validation",
            ErrorKind::Arithmetic => "arithmetic",
            ErrorKind::ExternalCall => "external-call",
            ErrorKind::Health => "health",
            ErrorKind::Collateral => "collateral",
        };
        f.write_str(name)
    }
}

/// The collaborator a failed external call was made to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collaborator {
    Ledger,
    Registry,
    MarginProtocol,
    Liquidator,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collaborator::Ledger => "asset ledger",
            Collaborator::Registry => "registry",
            Collaborator::MarginProtocol => "margin protocol",
            Collaborator::Liquidator => "liquidator",
        };
        f.write_str(name)
    }
}

/// Errors returned by vault operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    // -- authorization --------------------------------------------------
    /// The caller does not hold `role`.
    #[error("{caller} is not authorized as {role}")]
    Unauthorized { caller: Address, role: Role },

    // -- state ----------------------------------------------------------
    #[error("vault is already initialized")]
    AlreadyInitialized,

    #[error("vault is not initialized")]
    NotInitialized,

    #[error("a margin account is already open with {0}")]
    MarginAccountOpen(Address),

    #[error("no margin account is open")]
    NoMarginAccount,

    #[error("no liquidator has been designated for this vault")]
    NoLiquidator,

    /// Base currency changes require zero used margin.
    #[error("cannot change base currency while used margin is {used_margin}")]
    MarginOutstanding { used_margin: u128 },

    #[error("version {requested} does not supersede current version {current}")]
    VersionNotNewer {
        current: VaultVersion,
        requested: VaultVersion,
    },

    /// A mutating entry point was re-entered from inside an external call.
    #[error("reentrant call into a mutating vault operation")]
    Reentrancy,

    // -- validation -----------------------------------------------------
    #[error("malformed batch: {0}")]
    Batch(#[from] BatchError),

    #[error("batch contains assets the registry does not whitelist")]
    NotWhitelisted,

    #[error("{0} is not a recognised base currency")]
    NotBaseCurrency(Address),

    #[error("vault does not hold token {token_id} of {asset}")]
    AssetNotHeld { asset: Address, token_id: TokenId },

    // -- arithmetic -----------------------------------------------------
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    // -- external -------------------------------------------------------
    #[error("{collaborator} call failed: {source}")]
    External {
        collaborator: Collaborator,
        #[source]
        source: ExternalError,
    },

    #[error("margin protocol {0} refused to open an account")]
    HandshakeRefused(Address),

    #[error("liquidator {0} declined to start an auction")]
    AuctionRefused(Address),

    // -- health ---------------------------------------------------------
    #[error(
        "vault is healthy: total value {total_value} covers used margin {used_margin} \
         at threshold {liquidation_threshold}"
    )]
    Healthy {
        total_value: u128,
        used_margin: u128,
        liquidation_threshold: u16,
    },

    // -- collateral -----------------------------------------------------
    #[error("margin protocol still reports an open position of {0}")]
    OpenPosition(u128),

    #[error("collateral value {collateral_value} would not exceed used margin {used_margin}")]
    InsufficientCollateral {
        collateral_value: u128,
        used_margin: u128,
    },
}

impl VaultError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Unauthorized { .. } => ErrorKind::Authorization,

            VaultError::AlreadyInitialized
            | VaultError::NotInitialized
            | VaultError::MarginAccountOpen(_)
            | VaultError::NoMarginAccount
            | VaultError::NoLiquidator
            | VaultError::MarginOutstanding { .. }
            | VaultError::VersionNotNewer { .. }
            | VaultError::Reentrancy => ErrorKind::State,

            VaultError::Batch(_)
            | VaultError::NotWhitelisted
            | VaultError::NotBaseCurrency(_)
            | VaultError::AssetNotHeld { .. } => ErrorKind::Validation,

            VaultError::Arithmetic(_) => ErrorKind::Arithmetic,

            VaultError::External { .. }
            | VaultError::HandshakeRefused(_)
            | VaultError::AuctionRefused(_) => ErrorKind::ExternalCall,

            VaultError::Healthy { .. } => ErrorKind::Health,

            VaultError::OpenPosition(_) | VaultError::InsufficientCollateral { .. } => {
                ErrorKind::Collateral
            }
        }
    }
}

/// Tags a collaborator result with the collaborator it came from.
pub(crate) trait ExternalResultExt<T> {
    fn via(self, collaborator: Collaborator) -> Result<T, VaultError>;
}

impl<T> ExternalResultExt<T> for Result<T, ExternalError> {
    fn via(self, collaborator: Collaborator) -> Result<T, VaultError> {
        self.map_err(|source| VaultError::External {
            collaborator,
            source,
        })
    }
}
