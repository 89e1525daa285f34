//! # In-Memory Margin Protocol
//!
//! A lending desk that opens margin accounts for any vault version it
//! supports and reports whatever open position it has been told about.
//! Credit disbursement is not modelled: callers record exposure directly
//! with [`set_open_position`](InMemoryMarginProtocol::set_open_position).

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::interfaces::{ExternalError, Liquidator, MarginHandshake, MarginProtocol};
use crate::types::{Address, VaultVersion};

struct DeskState {
    accepting: bool,
    min_vault_version: VaultVersion,
    positions: HashMap<Address, u128>,
}

/// A margin protocol whose open positions are set by hand.
pub struct InMemoryMarginProtocol {
    address: Address,
    base_currency: Address,
    liquidator: Arc<dyn Liquidator>,
    state: RwLock<DeskState>,
}

impl InMemoryMarginProtocol {
    pub fn new(address: Address, base_currency: Address, liquidator: Arc<dyn Liquidator>) -> Self {
        Self {
            address,
            base_currency,
            liquidator,
            state: RwLock::new(DeskState {
                accepting: true,
                min_vault_version: 0,
                positions: HashMap::new(),
            }),
        }
    }

    /// Records the outstanding exposure of `vault`.
    pub fn set_open_position(&self, vault: Address, amount: u128) {
        self.state.write().positions.insert(vault, amount);
    }

    /// When `false`, every handshake is refused.
    pub fn set_accepting(&self, accepting: bool) {
        self.state.write().accepting = accepting;
    }

    /// Refuses handshakes from vaults older than `version`.
    pub fn set_min_vault_version(&self, version: VaultVersion) {
        self.state.write().min_vault_version = version;
    }

    pub fn base_currency(&self) -> Address {
        self.base_currency
    }
}

impl MarginProtocol for InMemoryMarginProtocol {
    fn address(&self) -> Address {
        self.address
    }

    fn open_margin_account(
        &self,
        vault: Address,
        vault_version: VaultVersion,
    ) -> Result<MarginHandshake, ExternalError> {
        let mut state = self.state.write();
        let accepted = state.accepting && vault_version >= state.min_vault_version;
        if accepted {
            state.positions.entry(vault).or_insert(0);
        }
        Ok(MarginHandshake {
            accepted,
            base_currency: self.base_currency,
            liquidator: Arc::clone(&self.liquidator),
        })
    }

    fn open_position(&self, vault: Address) -> Result<u128, ExternalError> {
        Ok(self.state.read().positions.get(&vault).copied().unwrap_or(0))
    }
}
