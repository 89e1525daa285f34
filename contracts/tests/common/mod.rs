//! Shared fixture: a vault wired to in-memory collaborators.

#![allow(dead_code)]

use std::sync::Arc;

use keel_contracts::Vault;
use keel_protocol::config::{CURRENT_VAULT_VERSION, FULL_COLLATERAL_FACTOR};
use keel_protocol::memory::{
    AssetRisk, CurrencyInfo, InMemoryLedger, InMemoryMarginProtocol, PriceRegistry,
    RecordingLiquidator,
};
use keel_protocol::Address;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64(n)
}

pub const VAULT: u64 = 1;
pub const OWNER: u64 = 2;
pub const FACTORY: u64 = 3;
pub const KEEPER: u64 = 4;
pub const PROTOCOL: u64 = 40;
pub const LIQUIDATOR: u64 = 50;

pub const USD: u64 = 100;
pub const EUR: u64 = 101;

/// Fungible, price 1, full collateral factor, threshold 40.00.
pub const TOKEN: u64 = 10;
/// Unique NFT collection, price 500.
pub const PUNK: u64 = 11;
/// Multi-class NFT collection, price 10.
pub const GEM: u64 = 12;
/// Never listed.
pub const JUNK: u64 = 13;

pub struct Desk {
    pub ledger: Arc<InMemoryLedger>,
    pub registry: Arc<PriceRegistry>,
    pub liquidator: Arc<RecordingLiquidator>,
    pub protocol: Arc<InMemoryMarginProtocol>,
    pub vault: Arc<Vault>,
}

impl Desk {
    /// An initialized vault with base currency USD and a funded owner.
    pub fn new() -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let registry = Arc::new(PriceRegistry::new());
        registry.add_currency(addr(USD), CurrencyInfo { id: 0, unit_value: 1, base: true });
        registry.add_currency(addr(EUR), CurrencyInfo { id: 1, unit_value: 1, base: true });
        registry.list_asset(
            addr(TOKEN),
            AssetRisk {
                price: 1,
                collateral_factor: FULL_COLLATERAL_FACTOR,
                liquidation_threshold: 4_000,
            },
        );
        registry.list_asset(
            addr(PUNK),
            AssetRisk { price: 500, collateral_factor: 5_000, liquidation_threshold: 8_000 },
        );
        registry.list_asset(
            addr(GEM),
            AssetRisk {
                price: 10,
                collateral_factor: FULL_COLLATERAL_FACTOR,
                liquidation_threshold: 8_000,
            },
        );

        ledger.mint_fungible(addr(TOKEN), addr(OWNER), 10_000).unwrap();
        ledger.mint_fungible(addr(JUNK), addr(OWNER), 10_000).unwrap();
        ledger.mint_unique(addr(PUNK), addr(OWNER), 1).unwrap();
        ledger.mint_unique(addr(PUNK), addr(OWNER), 2).unwrap();
        ledger.mint_multi(addr(GEM), addr(OWNER), 7, 50).unwrap();

        let liquidator = Arc::new(RecordingLiquidator::new(addr(LIQUIDATOR)));
        let protocol = Arc::new(InMemoryMarginProtocol::new(
            addr(PROTOCOL),
            addr(USD),
            liquidator.clone(),
        ));

        let vault = Arc::new(Vault::new(addr(VAULT), ledger.clone(), registry.clone()));
        vault
            .initialize(addr(FACTORY), addr(OWNER), addr(USD), CURRENT_VAULT_VERSION)
            .unwrap();

        Self {
            ledger,
            registry,
            liquidator,
            protocol,
            vault,
        }
    }

    pub fn open_margin(&self) {
        self.vault
            .open_margin_account(addr(OWNER), self.protocol.clone())
            .unwrap();
    }

    pub fn set_used_margin(&self, amount: u128) {
        self.protocol.set_open_position(addr(VAULT), amount);
    }
}
