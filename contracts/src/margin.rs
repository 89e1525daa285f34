//! # Margin Account
//!
//! The vault side of a lending relationship. A vault is bound to at most one
//! [`MarginProtocol`] at a time; the protocol owns the debt bookkeeping and
//! the vault only asks it how much is outstanding.
//!
//! ## State Machine
//!
//! ```text
//!    ┌──────────┐   open (handshake accepted)   ┌──────────┐
//!    │ Unbound  │ ─────────────────────────────► │  Bound   │
//!    └──────────┘ ◄───────────────────────────── └──────────┘
//!                  close (open position == 0)
//! ```
//!
//! The base currency may only move while used margin is exactly zero, so a
//! bound protocol never sees its exposure re-denominated under it.

use std::fmt;
use std::sync::Arc;

use keel_protocol::math::{self, ArithmeticError};
use keel_protocol::{Address, Liquidator, MarginProtocol};

use crate::error::{Collaborator, ExternalResultExt, VaultError};

/// Margin-related state of one vault.
#[derive(Clone)]
pub struct MarginAccount {
    base_currency: Address,
    protocol: Option<Arc<dyn MarginProtocol>>,
    /// Kept after close; the next open replaces it.
    liquidator: Option<Arc<dyn Liquidator>>,
    /// Threshold observed at the last admitted margin increase.
    liquidation_threshold: u16,
}

impl fmt::Debug for MarginAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarginAccount")
            .field("base_currency", &self.base_currency)
            .field("protocol", &self.protocol_address())
            .field("liquidator", &self.liquidator_address())
            .field("liquidation_threshold", &self.liquidation_threshold)
            .finish()
    }
}

impl MarginAccount {
    pub fn new(base_currency: Address) -> Self {
        Self {
            base_currency,
            protocol: None,
            liquidator: None,
            liquidation_threshold: 0,
        }
    }

    pub fn base_currency(&self) -> Address {
        self.base_currency
    }

    pub fn liquidation_threshold(&self) -> u16 {
        self.liquidation_threshold
    }

    pub fn is_open(&self) -> bool {
        self.protocol.is_some()
    }

    pub fn protocol(&self) -> Option<&Arc<dyn MarginProtocol>> {
        self.protocol.as_ref()
    }

    pub fn protocol_address(&self) -> Option<Address> {
        self.protocol.as_ref().map(|p| p.address())
    }

    pub fn liquidator(&self) -> Option<&Arc<dyn Liquidator>> {
        self.liquidator.as_ref()
    }

    pub fn liquidator_address(&self) -> Option<Address> {
        self.liquidator.as_ref().map(|l| l.address())
    }

    /// Binds a protocol and its designated liquidator.
    ///
    /// # Errors
    ///
    /// [`VaultError::MarginAccountOpen`] if a protocol is already bound.
    pub fn bind(
        &mut self,
        protocol: Arc<dyn MarginProtocol>,
        liquidator: Arc<dyn Liquidator>,
    ) -> Result<(), VaultError> {
        if let Some(existing) = &self.protocol {
            return Err(VaultError::MarginAccountOpen(existing.address()));
        }
        self.protocol = Some(protocol);
        self.liquidator = Some(liquidator);
        Ok(())
    }

    /// Unbinds the protocol and returns it.
    ///
    /// # Errors
    ///
    /// [`VaultError::NoMarginAccount`] if nothing is bound.
    pub fn unbind(&mut self) -> Result<Arc<dyn MarginProtocol>, VaultError> {
        self.protocol.take().ok_or(VaultError::NoMarginAccount)
    }

    /// Used margin as reported by the bound protocol.
    ///
    /// # Errors
    ///
    /// [`VaultError::NoMarginAccount`] if nothing is bound, or the protocol's
    /// own failure.
    pub fn used_margin(&self, vault: Address) -> Result<u128, VaultError> {
        let protocol = self.protocol.as_ref().ok_or(VaultError::NoMarginAccount)?;
        protocol
            .open_position(vault)
            .via(Collaborator::MarginProtocol)
    }

    /// Used margin, counting an unbound vault as owing nothing.
    pub fn outstanding_margin(&self, vault: Address) -> Result<u128, VaultError> {
        if self.protocol.is_none() {
            return Ok(0);
        }
        self.used_margin(vault)
    }

    /// Moves the base currency. `used_margin` must be exactly zero.
    ///
    /// Returns `true` if the currency actually changed.
    pub fn set_base_currency(
        &mut self,
        currency: Address,
        used_margin: u128,
    ) -> Result<bool, VaultError> {
        if used_margin != 0 {
            return Err(VaultError::MarginOutstanding { used_margin });
        }
        let changed = self.base_currency != currency;
        self.base_currency = currency;
        Ok(changed)
    }

    pub fn cache_threshold(&mut self, liquidation_threshold: u16) {
        self.liquidation_threshold = liquidation_threshold;
    }
}

/// Whether `collateral_value` covers `used_margin + amount`.
pub fn admits_increase(
    collateral_value: u128,
    used_margin: u128,
    amount: u128,
) -> Result<bool, ArithmeticError> {
    Ok(collateral_value >= math::add(used_margin, amount)?)
}

/// `max(0, collateral_value - used_margin)`.
pub fn free_margin(collateral_value: u128, used_margin: u128) -> u128 {
    math::clamp_sub(collateral_value, used_margin)
}
