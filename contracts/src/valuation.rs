//! # Valuation Client
//!
//! Thin adapter over the [`Registry`]. The vault applies no discount and does
//! no pricing of its own: whatever the registry answers for a snapshot is the
//! value. The only thing added here is tagging failures with the
//! collaborator they came from.

use keel_protocol::{Address, AssetSnapshot, CollateralValuation, CurrencyId, Registry, TokenId};

use crate::error::{Collaborator, ExternalResultExt, VaultError};

/// Stateless view of a registry, borrowed for the duration of one operation.
#[derive(Clone, Copy)]
pub struct ValuationClient<'a> {
    registry: &'a dyn Registry,
}

impl<'a> ValuationClient<'a> {
    pub fn new(registry: &'a dyn Registry) -> Self {
        Self { registry }
    }

    /// Unhaircut value of `snapshot` in `currency`.
    pub fn total_value(
        &self,
        snapshot: &AssetSnapshot,
        currency: Address,
    ) -> Result<u128, VaultError> {
        self.registry
            .total_value(snapshot, currency)
            .via(Collaborator::Registry)
    }

    /// Haircut collateral value and aggregate liquidation threshold in
    /// `base_currency`, taken verbatim from the registry.
    pub fn collateral_value_and_threshold(
        &self,
        snapshot: &AssetSnapshot,
        base_currency: Address,
    ) -> Result<CollateralValuation, VaultError> {
        self.registry
            .collateral_value_and_threshold(snapshot, base_currency)
            .via(Collaborator::Registry)
    }

    pub fn currency_id_of(&self, currency: Address) -> Result<CurrencyId, VaultError> {
        self.registry
            .currency_id_of(currency)
            .via(Collaborator::Registry)
    }

    pub fn is_base_currency(&self, currency: Address) -> Result<bool, VaultError> {
        self.registry
            .is_base_currency(currency)
            .via(Collaborator::Registry)
    }

    /// `true` only if every asset in the batch may be deposited.
    pub fn is_whitelisted(
        &self,
        assets: &[Address],
        token_ids: &[TokenId],
    ) -> Result<bool, VaultError> {
        self.registry
            .batch_is_whitelisted(assets, token_ids)
            .via(Collaborator::Registry)
    }
}
