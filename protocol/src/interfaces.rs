//! # Collaborator Interfaces
//!
//! The vault never prices assets, disburses credit, or runs auctions. It
//! talks to four collaborators through the narrow traits below:
//!
//! ```text
//! AssetLedger       custody transfers and live balances of the held assets
//! Registry          whitelisting, valuation, currency resolution
//! MarginProtocol    margin-account handshake and open-position queries
//! Liquidator        auction start on an unhealthy vault
//! ```
//!
//! Every call is synchronous and either completes or returns an
//! [`ExternalError`]. Implementations must be `Send + Sync`; vaults hold them
//! behind `Arc<dyn _>` and may be shared across threads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::math::ArithmeticError;
use crate::types::{Address, AssetSnapshot, CurrencyId, TokenId, VaultVersion};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A collaborator call that failed or reverted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalError {
    /// The collaborator rejected the call outright.
    #[error("call reverted: {0}")]
    Reverted(String),

    /// A fungible or multi-class transfer exceeded the sender's balance.
    #[error("insufficient balance of {asset} held by {holder}: has {available}, needs {required}")]
    InsufficientBalance {
        asset: Address,
        holder: Address,
        available: u128,
        required: u128,
    },

    /// A unique-NFT transfer from an account that does not own the token.
    #[error("{holder} does not own token {token_id} of {asset}")]
    NotOwner {
        asset: Address,
        holder: Address,
        token_id: TokenId,
    },

    /// The asset is not known to the collaborator.
    #[error("unknown asset {0}")]
    UnknownAsset(Address),

    /// The currency is not known to the collaborator.
    #[error("unknown currency {0}")]
    UnknownCurrency(Address),

    /// The collaborator's own arithmetic overflowed.
    #[error("collaborator arithmetic failed: {0}")]
    Arithmetic(#[from] ArithmeticError),
}

// ---------------------------------------------------------------------------
// AssetLedger
// ---------------------------------------------------------------------------

/// Custody and balances of the assets a vault can hold.
///
/// Transfers may run arbitrary asset code (transfer hooks), which is why the
/// vault orders its bookkeeping around them carefully.
pub trait AssetLedger: Send + Sync {
    fn transfer_fungible(
        &self,
        asset: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), ExternalError>;

    fn transfer_unique(
        &self,
        asset: Address,
        from: Address,
        to: Address,
        token_id: TokenId,
    ) -> Result<(), ExternalError>;

    fn transfer_multi(
        &self,
        asset: Address,
        from: Address,
        to: Address,
        token_id: TokenId,
        amount: u128,
    ) -> Result<(), ExternalError>;

    /// Live fungible balance of `holder`.
    fn fungible_balance(&self, asset: Address, holder: Address) -> Result<u128, ExternalError>;

    /// Live multi-class balance of `holder` for one token id.
    fn multi_balance(
        &self,
        asset: Address,
        holder: Address,
        token_id: TokenId,
    ) -> Result<u128, ExternalError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Haircut-adjusted collateral value plus the aggregate liquidation threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralValuation {
    /// Value after per-asset haircuts, in the base currency.
    pub collateral_value: u128,
    /// Aggregate threshold, 2-decimal fixed point, at most `10_000`.
    pub liquidation_threshold: u16,
}

/// Asset whitelisting and valuation.
pub trait Registry: Send + Sync {
    /// `true` only if every `(asset, token_id)` pair is admissible.
    fn batch_is_whitelisted(
        &self,
        assets: &[Address],
        token_ids: &[TokenId],
    ) -> Result<bool, ExternalError>;

    /// Unhaircut value of `snapshot` in `currency`.
    fn total_value(&self, snapshot: &AssetSnapshot, currency: Address)
        -> Result<u128, ExternalError>;

    /// Haircut value and aggregate liquidation threshold in `base_currency`.
    fn collateral_value_and_threshold(
        &self,
        snapshot: &AssetSnapshot,
        base_currency: Address,
    ) -> Result<CollateralValuation, ExternalError>;

    /// Internal identifier of a currency, as the liquidator expects it.
    fn currency_id_of(&self, currency: Address) -> Result<CurrencyId, ExternalError>;

    /// Whether `currency` may serve as a vault base currency.
    fn is_base_currency(&self, currency: Address) -> Result<bool, ExternalError>;
}

// ---------------------------------------------------------------------------
// MarginProtocol
// ---------------------------------------------------------------------------

/// Outcome of a margin-account handshake.
#[derive(Clone)]
pub struct MarginHandshake {
    /// `false` means the protocol refuses to open the account.
    pub accepted: bool,
    /// Base currency the protocol lends in.
    pub base_currency: Address,
    /// Liquidator the protocol designates for this vault.
    pub liquidator: Arc<dyn Liquidator>,
}

impl fmt::Debug for MarginHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarginHandshake")
            .field("accepted", &self.accepted)
            .field("base_currency", &self.base_currency)
            .field("liquidator", &self.liquidator.address())
            .finish()
    }
}

/// The lending facility drawing margin against a vault.
pub trait MarginProtocol: Send + Sync {
    /// Identity used for authorization checks.
    fn address(&self) -> Address;

    /// Handshake performed when a vault opens a margin account.
    fn open_margin_account(
        &self,
        vault: Address,
        vault_version: VaultVersion,
    ) -> Result<MarginHandshake, ExternalError>;

    /// Outstanding exposure of `vault`.
    fn open_position(&self, vault: Address) -> Result<u128, ExternalError>;
}

// ---------------------------------------------------------------------------
// Liquidator
// ---------------------------------------------------------------------------

/// Everything a liquidator needs to start an auction for one vault epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionRequest {
    pub vault: Address,
    /// Epoch ("life") the auction is bound to.
    pub life: u64,
    pub keeper: Address,
    pub owner: Address,
    pub used_margin: u64,
    pub liquidation_threshold: u16,
    pub currency_id: CurrencyId,
}

/// The auction house vaults hand off to when unhealthy.
pub trait Liquidator: Send + Sync {
    fn address(&self) -> Address;

    /// Starts an auction; `Ok(false)` means the liquidator declined.
    fn start_auction(&self, request: &AuctionRequest) -> Result<bool, ExternalError>;
}
