//! # In-Memory Price Registry
//!
//! A registry with static, settable prices. Each listed asset carries a
//! price in an internal numeraire plus two 2-decimal risk parameters:
//!
//! - `collateral_factor`: haircut applied for collateral value
//!   (`7_500` = 75.00% of spot counts as collateral);
//! - `liquidation_threshold`: per-asset threshold, aggregated as a
//!   value-weighted average and capped at `10_000`.
//!
//! Currencies are priced in the same numeraire through `unit_value`, so a
//! value converts to a currency by dividing by its unit value.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::MAX_LIQUIDATION_THRESHOLD;
use crate::interfaces::{CollateralValuation, ExternalError, Registry};
use crate::math;
use crate::types::{Address, AssetSnapshot, CurrencyId, TokenId};

/// Risk and price parameters of one listed asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRisk {
    /// Numeraire value of one smallest unit (or one token for NFTs).
    pub price: u128,
    /// 2-decimal fixed point, at most `10_000`.
    pub collateral_factor: u16,
    /// 2-decimal fixed point.
    pub liquidation_threshold: u16,
}

/// A currency the registry can value holdings in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyInfo {
    pub id: CurrencyId,
    /// Numeraire value of one smallest unit of the currency.
    pub unit_value: u128,
    /// Whether vaults may use it as base currency.
    pub base: bool,
}

#[derive(Default)]
struct Listings {
    assets: HashMap<Address, AssetRisk>,
    currencies: HashMap<Address, CurrencyInfo>,
}

/// Registry backed by in-memory price and currency tables.
#[derive(Default)]
pub struct PriceRegistry {
    listings: RwLock<Listings>,
}

impl PriceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lists (or relists) an asset. Listed assets are whitelisted.
    pub fn list_asset(&self, asset: Address, risk: AssetRisk) {
        self.listings.write().assets.insert(asset, risk);
    }

    /// Removes an asset from the whitelist and price table.
    pub fn delist_asset(&self, asset: Address) {
        self.listings.write().assets.remove(&asset);
    }

    /// Updates the price of a listed asset.
    pub fn set_price(&self, asset: Address, price: u128) -> Result<(), ExternalError> {
        let mut listings = self.listings.write();
        let risk = listings
            .assets
            .get_mut(&asset)
            .ok_or(ExternalError::UnknownAsset(asset))?;
        risk.price = price;
        Ok(())
    }

    pub fn add_currency(&self, currency: Address, info: CurrencyInfo) {
        self.listings.write().currencies.insert(currency, info);
    }

    fn currency(listings: &Listings, currency: Address) -> Result<CurrencyInfo, ExternalError> {
        listings
            .currencies
            .get(&currency)
            .copied()
            .ok_or(ExternalError::UnknownCurrency(currency))
    }

    fn risk(listings: &Listings, asset: Address) -> Result<AssetRisk, ExternalError> {
        listings
            .assets
            .get(&asset)
            .copied()
            .ok_or(ExternalError::UnknownAsset(asset))
    }
}

impl Registry for PriceRegistry {
    fn batch_is_whitelisted(
        &self,
        assets: &[Address],
        _token_ids: &[TokenId],
    ) -> Result<bool, ExternalError> {
        let listings = self.listings.read();
        Ok(assets.iter().all(|a| listings.assets.contains_key(a)))
    }

    fn total_value(
        &self,
        snapshot: &AssetSnapshot,
        currency: Address,
    ) -> Result<u128, ExternalError> {
        let listings = self.listings.read();
        let unit = Self::currency(&listings, currency)?.unit_value;

        let mut total = 0u128;
        for (asset, _, amount) in snapshot.iter() {
            let risk = Self::risk(&listings, asset)?;
            total = math::add(total, math::mul(amount, risk.price)?)?;
        }
        Ok(math::div(total, unit)?)
    }

    fn collateral_value_and_threshold(
        &self,
        snapshot: &AssetSnapshot,
        base_currency: Address,
    ) -> Result<CollateralValuation, ExternalError> {
        let listings = self.listings.read();
        let unit = Self::currency(&listings, base_currency)?.unit_value;

        let mut spot = 0u128;
        let mut collateral = 0u128;
        let mut weighted_threshold = 0u128;
        for (asset, _, amount) in snapshot.iter() {
            let risk = Self::risk(&listings, asset)?;
            let value = math::mul(amount, risk.price)?;
            spot = math::add(spot, value)?;
            collateral = math::add(collateral, math::apply_ratio(value, risk.collateral_factor)?)?;
            weighted_threshold = math::add(
                weighted_threshold,
                math::mul(value, u128::from(risk.liquidation_threshold))?,
            )?;
        }

        let liquidation_threshold = if spot == 0 {
            0
        } else {
            let avg = weighted_threshold / spot;
            avg.min(u128::from(MAX_LIQUIDATION_THRESHOLD)) as u16
        };

        Ok(CollateralValuation {
            collateral_value: math::div(collateral, unit)?,
            liquidation_threshold,
        })
    }

    fn currency_id_of(&self, currency: Address) -> Result<CurrencyId, ExternalError> {
        let listings = self.listings.read();
        Ok(Self::currency(&listings, currency)?.id)
    }

    fn is_base_currency(&self, currency: Address) -> Result<bool, ExternalError> {
        Ok(self
            .listings
            .read()
            .currencies
            .get(&currency)
            .map(|c| c.base)
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn registry() -> PriceRegistry {
        let r = PriceRegistry::new();
        r.add_currency(
            addr(100),
            CurrencyInfo { id: 0, unit_value: 1, base: true },
        );
        r.add_currency(
            addr(101),
            CurrencyInfo { id: 1, unit_value: 4, base: false },
        );
        r.list_asset(
            addr(1),
            AssetRisk { price: 2, collateral_factor: 7_500, liquidation_threshold: 8_000 },
        );
        r.list_asset(
            addr(2),
            AssetRisk { price: 10, collateral_factor: 5_000, liquidation_threshold: 6_000 },
        );
        r
    }

    fn snapshot() -> AssetSnapshot {
        let mut s = AssetSnapshot::default();
        s.push(addr(1), 0, 100); // spot 200
        s.push(addr(2), 3, 20); // spot 200
        s
    }

    #[test]
    fn total_value_converts_currency() {
        let r = registry();
        assert_eq!(r.total_value(&snapshot(), addr(100)).unwrap(), 400);
        assert_eq!(r.total_value(&snapshot(), addr(101)).unwrap(), 100);
    }

    #[test]
    fn collateral_applies_haircuts_and_weights_threshold() {
        let r = registry();
        let v = r.collateral_value_and_threshold(&snapshot(), addr(100)).unwrap();
        assert_eq!(v.collateral_value, 150 + 100);
        assert_eq!(v.liquidation_threshold, 7_000);
    }

    #[test]
    fn empty_snapshot_has_zero_threshold() {
        let r = registry();
        let v = r
            .collateral_value_and_threshold(&AssetSnapshot::default(), addr(100))
            .unwrap();
        assert_eq!(v, CollateralValuation { collateral_value: 0, liquidation_threshold: 0 });
    }

    #[test]
    fn whitelist_requires_every_asset() {
        let r = registry();
        assert!(r.batch_is_whitelisted(&[addr(1), addr(2)], &[0, 0]).unwrap());
        assert!(!r.batch_is_whitelisted(&[addr(1), addr(3)], &[0, 0]).unwrap());
    }

    #[test]
    fn unknown_currency_rejected() {
        let r = registry();
        assert_eq!(
            r.currency_id_of(addr(102)),
            Err(ExternalError::UnknownCurrency(addr(102)))
        );
        assert!(!r.is_base_currency(addr(101)).unwrap());
    }
}
