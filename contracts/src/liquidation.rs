//! # Liquidation Trigger
//!
//! Decides whether a vault still covers its margin and, when it does not,
//! hands it to the liquidator.
//!
//! ## Health
//!
//! ```text
//! healthy  ⇔  total_value * 100  >=  used_margin * liquidation_threshold
//! ```
//!
//! `total_value` is the unhaircut value in the base currency and the
//! threshold is the one cached at the last admitted margin increase. Both
//! products are exact; an overflow is an error, not a verdict.
//!
//! ## Epochs
//!
//! Every successful trigger advances the vault's `life` by exactly one. The
//! auction is started with the life *before* the increment, so an auction
//! reference always names the liquidation instance that created it and a
//! later re-liquidation can never be confused with a stale one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use keel_protocol::math::{self, ArithmeticError};
use keel_protocol::{Address, AuctionRequest, CurrencyId, Liquidator};

use crate::error::{Collaborator, ExternalResultExt, VaultError};

/// Outcome of a health evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Liquidatable,
}

/// The figures a health verdict was reached from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub total_value: u128,
    pub used_margin: u128,
    pub liquidation_threshold: u16,
    pub status: HealthStatus,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Evaluates the health test.
pub fn evaluate(
    total_value: u128,
    used_margin: u128,
    liquidation_threshold: u16,
) -> Result<HealthReport, ArithmeticError> {
    let status = if math::is_healthy(total_value, used_margin, liquidation_threshold)? {
        HealthStatus::Healthy
    } else {
        HealthStatus::Liquidatable
    };
    Ok(HealthReport {
        total_value,
        used_margin,
        liquidation_threshold,
        status,
    })
}

/// One completed hand-off to a liquidator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationRecord {
    /// Life the auction was started for.
    pub life: u64,
    pub keeper: Address,
    pub owner: Address,
    pub liquidator: Address,
    pub used_margin: u64,
    pub liquidation_threshold: u16,
    pub currency_id: CurrencyId,
    pub triggered_at: DateTime<Utc>,
}

/// Identities an auction is started on behalf of.
#[derive(Clone, Copy, Debug)]
pub struct TriggerContext {
    pub vault: Address,
    pub owner: Address,
    pub keeper: Address,
    pub currency_id: CurrencyId,
}

/// Epoch counter and liquidation history of one vault.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationTrigger {
    life: u64,
    history: Vec<LiquidationRecord>,
}

impl LiquidationTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of liquidations this vault has gone through.
    pub fn life(&self) -> u64 {
        self.life
    }

    pub fn history(&self) -> &[LiquidationRecord] {
        &self.history
    }

    /// Starts an auction for an unhealthy vault and advances the epoch.
    ///
    /// Nothing in `self` changes unless the liquidator accepts.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Healthy`] if `report` says the vault is healthy.
    /// - [`VaultError::Arithmetic`] if used margin does not fit the auction's
    ///   integer width, or the epoch would overflow.
    /// - [`VaultError::External`] / [`VaultError::AuctionRefused`] if the
    ///   liquidator fails or declines.
    pub fn trigger(
        &mut self,
        ctx: TriggerContext,
        report: &HealthReport,
        liquidator: &dyn Liquidator,
    ) -> Result<LiquidationRecord, VaultError> {
        if report.is_healthy() {
            return Err(VaultError::Healthy {
                total_value: report.total_value,
                used_margin: report.used_margin,
                liquidation_threshold: report.liquidation_threshold,
            });
        }

        let used_margin = math::narrow_u64(report.used_margin)?;
        let next_life = self.life.checked_add(1).ok_or(ArithmeticError::Overflow {
            op: "+",
            lhs: u128::from(self.life),
            rhs: 1,
        })?;

        let request = AuctionRequest {
            vault: ctx.vault,
            life: self.life,
            keeper: ctx.keeper,
            owner: ctx.owner,
            used_margin,
            liquidation_threshold: report.liquidation_threshold,
            currency_id: ctx.currency_id,
        };

        let started = liquidator
            .start_auction(&request)
            .via(Collaborator::Liquidator)?;
        if !started {
            return Err(VaultError::AuctionRefused(liquidator.address()));
        }

        let record = LiquidationRecord {
            life: self.life,
            keeper: ctx.keeper,
            owner: ctx.owner,
            liquidator: liquidator.address(),
            used_margin,
            liquidation_threshold: report.liquidation_threshold,
            currency_id: ctx.currency_id,
            triggered_at: Utc::now(),
        };
        self.life = next_life;
        self.history.push(record.clone());

        info!(
            vault = %ctx.vault,
            life = record.life,
            keeper = %ctx.keeper,
            liquidator = %record.liquidator,
            used_margin = record.used_margin,
            "auction started"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use keel_protocol::memory::RecordingLiquidator;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn ctx() -> TriggerContext {
        TriggerContext {
            vault: addr(1),
            owner: addr(2),
            keeper: addr(3),
            currency_id: 0,
        }
    }

    #[test]
    fn evaluate_classifies_the_boundary() {
        assert_eq!(evaluate(100, 2, 4000).unwrap().status, HealthStatus::Healthy);
        assert_eq!(evaluate(100, 3, 4000).unwrap().status, HealthStatus::Liquidatable);
    }

    #[test]
    fn healthy_vault_is_not_liquidated() {
        let liquidator = RecordingLiquidator::new(addr(9));
        let mut trigger = LiquidationTrigger::new();
        let report = evaluate(100, 2, 4000).unwrap();
        let err = trigger.trigger(ctx(), &report, &liquidator).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Health);
        assert_eq!(trigger.life(), 0);
        assert!(liquidator.auctions().is_empty());
    }

    #[test]
    fn unhealthy_vault_advances_life_by_one() {
        let liquidator = RecordingLiquidator::new(addr(9));
        let mut trigger = LiquidationTrigger::new();
        let report = evaluate(100, 3, 4000).unwrap();

        let record = trigger.trigger(ctx(), &report, &liquidator).unwrap();
        assert_eq!(record.life, 0);
        assert_eq!(record.liquidator, addr(9));
        assert_eq!(trigger.life(), 1);

        let second = trigger.trigger(ctx(), &report, &liquidator).unwrap();
        assert_eq!(second.life, 1);
        assert_eq!(trigger.life(), 2);
        let lives: Vec<_> = liquidator.auctions().iter().map(|a| a.life).collect();
        assert_eq!(lives, vec![0, 1]);
    }

    #[test]
    fn declined_auction_changes_nothing() {
        let liquidator = RecordingLiquidator::new(addr(9));
        liquidator.set_accepting(false);
        let mut trigger = LiquidationTrigger::new();
        let report = evaluate(100, 3, 4000).unwrap();
        let err = trigger.trigger(ctx(), &report, &liquidator).unwrap_err();
        assert_eq!(err, VaultError::AuctionRefused(addr(9)));
        assert_eq!(trigger.life(), 0);
        assert!(trigger.history().is_empty());
    }

    #[test]
    fn oversized_margin_fails_instead_of_truncating() {
        let liquidator = RecordingLiquidator::new(addr(9));
        let mut trigger = LiquidationTrigger::new();
        let report = evaluate(0, u128::from(u64::MAX) + 1, 1).unwrap();
        let err = trigger.trigger(ctx(), &report, &liquidator).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Arithmetic);
        assert!(liquidator.auctions().is_empty());
    }
}
