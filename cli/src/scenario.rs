//! # Scenarios
//!
//! A scenario is a JSON document describing a little world (currencies,
//! listed assets, initial balances, margin protocols) and a list of steps
//! to replay against one vault in it. Steps are either vault entry points or
//! world events the vault has no say in (price moves, debt changes,
//! rebases, frozen assets).
//!
//! A rejected vault operation is an outcome, not a failure: it is logged
//! with its error kind and the run continues. A step that names something
//! the scenario never declared is a broken scenario and aborts the run.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use keel_contracts::{ErrorKind, Vault, VaultError, VaultSummary};
use keel_protocol::config::{CURRENT_VAULT_VERSION, MAX_LIQUIDATION_THRESHOLD};
use keel_protocol::memory::{
    AssetRisk, CurrencyInfo, InMemoryLedger, InMemoryMarginProtocol, PriceRegistry,
    RecordingLiquidator,
};
use keel_protocol::{Address, AssetBatch, AssetClass, CurrencyId, TokenId, VaultVersion};

use crate::metrics::VaultMetrics;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

fn current_version() -> VaultVersion {
    CURRENT_VAULT_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSpec {
    pub address: Address,
    pub owner: Address,
    pub factory: Address,
    pub base_currency: Address,
    #[serde(default = "current_version")]
    pub version: VaultVersion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencySpec {
    pub address: Address,
    pub id: CurrencyId,
    pub unit_value: u128,
    #[serde(default)]
    pub base: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSpec {
    pub address: Address,
    pub price: u128,
    pub collateral_factor: u16,
    pub liquidation_threshold: u16,
}

/// An initial holding. `amount` is ignored for unique NFTs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSpec {
    pub holder: Address,
    pub asset: Address,
    pub class: AssetClass,
    #[serde(default)]
    pub token_id: TokenId,
    #[serde(default)]
    pub amount: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolSpec {
    pub address: Address,
    pub base_currency: Address,
    pub liquidator: Address,
    #[serde(default)]
    pub min_vault_version: VaultVersion,
}

/// One scenario step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Deposit { caller: Address, batch: AssetBatch },
    Withdraw { caller: Address, batch: AssetBatch },
    OpenMarginAccount { caller: Address, protocol: Address },
    CloseMarginAccount { caller: Address },
    IncreaseMargin { caller: Address, currency: Address, amount: u128 },
    DecreaseMargin { caller: Address, currency: Address, amount: u128 },
    SetBaseCurrency { caller: Address, currency: Address },
    TransferOwnership { caller: Address, new_owner: Address },
    UpgradeVersion { caller: Address, version: VaultVersion },
    AttemptLiquidation { caller: Address, keeper: Address },
    /// The protocol's exposure to the vault changes.
    SetOpenPosition { protocol: Address, amount: u128 },
    SetPrice { asset: Address, price: u128 },
    /// The vault's balance of a fungible asset changes under it.
    Rebase { asset: Address, balance: u128 },
    Freeze { asset: Address },
    Thaw { asset: Address },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Deposit { .. } => "deposit",
            Step::Withdraw { .. } => "withdraw",
            Step::OpenMarginAccount { .. } => "open_margin_account",
            Step::CloseMarginAccount { .. } => "close_margin_account",
            Step::IncreaseMargin { .. } => "increase_margin",
            Step::DecreaseMargin { .. } => "decrease_margin",
            Step::SetBaseCurrency { .. } => "set_base_currency",
            Step::TransferOwnership { .. } => "transfer_ownership",
            Step::UpgradeVersion { .. } => "upgrade_version",
            Step::AttemptLiquidation { .. } => "attempt_liquidation",
            Step::SetOpenPosition { .. } => "set_open_position",
            Step::SetPrice { .. } => "set_price",
            Step::Rebase { .. } => "rebase",
            Step::Freeze { .. } => "freeze",
            Step::Thaw { .. } => "thaw",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    pub vault: VaultSpec,
    #[serde(default)]
    pub currencies: Vec<CurrencySpec>,
    #[serde(default)]
    pub assets: Vec<AssetSpec>,
    #[serde(default)]
    pub balances: Vec<BalanceSpec>,
    #[serde(default)]
    pub protocols: Vec<ProtocolSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Reads and parses a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("failed to parse scenario {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Checks everything that can be checked without running the steps.
    pub fn validate(&self) -> Result<()> {
        for currency in &self.currencies {
            ensure!(
                currency.unit_value != 0,
                "currency {} has a zero unit value",
                currency.address
            );
        }
        ensure!(
            self.currencies
                .iter()
                .any(|c| c.address == self.vault.base_currency && c.base),
            "vault base currency {} is not declared as a base currency",
            self.vault.base_currency
        );

        for asset in &self.assets {
            ensure!(
                asset.collateral_factor <= MAX_LIQUIDATION_THRESHOLD
                    && asset.liquidation_threshold <= MAX_LIQUIDATION_THRESHOLD,
                "asset {} has a ratio above {}",
                asset.address,
                MAX_LIQUIDATION_THRESHOLD
            );
        }

        for protocol in &self.protocols {
            ensure!(
                self.currencies.iter().any(|c| c.address == protocol.base_currency),
                "protocol {} lends in undeclared currency {}",
                protocol.address,
                protocol.base_currency
            );
        }

        for (index, step) in self.steps.iter().enumerate() {
            match step {
                Step::Deposit { batch, .. } | Step::Withdraw { batch, .. } => {
                    batch
                        .actions()
                        .with_context(|| format!("step {index} ({})", step.name()))?;
                }
                Step::OpenMarginAccount { protocol, .. } | Step::SetOpenPosition { protocol, .. } => {
                    ensure!(
                        self.protocols.iter().any(|p| p.address == *protocol),
                        "step {index} ({}) names undeclared protocol {protocol}",
                        step.name()
                    );
                }
                Step::SetPrice { asset, .. } => {
                    ensure!(
                        self.assets.iter().any(|a| a.address == *asset),
                        "step {index} (set_price) names unlisted asset {asset}"
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
    Committed {
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Rejected {
        kind: ErrorKind,
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub op: &'static str,
    #[serde(flatten)]
    pub result: StepResult,
}

impl StepOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self.result, StepResult::Committed { .. })
    }
}

/// Everything a run produced, printed as JSON on stdout.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scenario: String,
    pub steps: Vec<StepOutcome>,
    pub summary: VaultSummary,
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// What a committed step did, beyond succeeding.
enum Effect {
    Done,
    Admission(bool),
    Liquidated(Address),
}

impl Effect {
    fn detail(&self) -> Option<String> {
        match self {
            Effect::Done => None,
            Effect::Admission(admitted) => Some(format!("admitted={admitted}")),
            Effect::Liquidated(liquidator) => Some(format!("liquidator={liquidator}")),
        }
    }
}

/// A vault and the in-memory world it lives in.
pub struct Simulation {
    ledger: Arc<InMemoryLedger>,
    registry: Arc<PriceRegistry>,
    protocols: HashMap<Address, Arc<InMemoryMarginProtocol>>,
    vault: Vault,
}

impl Simulation {
    /// Builds the collaborators, mints initial balances and initializes the
    /// vault.
    pub fn build(scenario: &Scenario) -> Result<Self> {
        let ledger = Arc::new(InMemoryLedger::new());
        let registry = Arc::new(PriceRegistry::new());

        for currency in &scenario.currencies {
            registry.add_currency(
                currency.address,
                CurrencyInfo {
                    id: currency.id,
                    unit_value: currency.unit_value,
                    base: currency.base,
                },
            );
        }
        for asset in &scenario.assets {
            registry.list_asset(
                asset.address,
                AssetRisk {
                    price: asset.price,
                    collateral_factor: asset.collateral_factor,
                    liquidation_threshold: asset.liquidation_threshold,
                },
            );
        }

        for balance in &scenario.balances {
            let minted = match balance.class {
                AssetClass::Fungible => {
                    ledger.mint_fungible(balance.asset, balance.holder, balance.amount)
                }
                AssetClass::UniqueNft => {
                    ledger.mint_unique(balance.asset, balance.holder, balance.token_id)
                }
                AssetClass::MultiNft => ledger.mint_multi(
                    balance.asset,
                    balance.holder,
                    balance.token_id,
                    balance.amount,
                ),
            };
            minted.with_context(|| {
                format!("failed to mint {} of {} to {}", balance.class, balance.asset, balance.holder)
            })?;
        }

        let mut liquidators: HashMap<Address, Arc<RecordingLiquidator>> = HashMap::new();
        let mut protocols = HashMap::new();
        for listing in &scenario.protocols {
            let liquidator = liquidators
                .entry(listing.liquidator)
                .or_insert_with(|| Arc::new(RecordingLiquidator::new(listing.liquidator)))
                .clone();
            let protocol = Arc::new(InMemoryMarginProtocol::new(
                listing.address,
                listing.base_currency,
                liquidator,
            ));
            protocol.set_min_vault_version(listing.min_vault_version);
            protocols.insert(listing.address, protocol);
        }

        let vault = Vault::new(scenario.vault.address, ledger.clone(), registry.clone());
        vault
            .initialize(
                scenario.vault.factory,
                scenario.vault.owner,
                scenario.vault.base_currency,
                scenario.vault.version,
            )
            .context("failed to initialize vault")?;

        Ok(Self {
            ledger,
            registry,
            protocols,
            vault,
        })
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// Replays `steps` in order and reports every outcome.
    pub fn run(&self, name: &str, steps: &[Step], metrics: &VaultMetrics) -> Result<RunReport> {
        let mut outcomes = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            let op = step.name();
            let result = match self.execute(step)? {
                Ok(effect) => {
                    record(metrics, step, &effect);
                    let detail = effect.detail();
                    info!(step = index, op, detail = detail.as_deref().unwrap_or(""), "step committed");
                    StepResult::Committed { detail }
                }
                Err(e) => {
                    let kind = e.kind();
                    let label = kind.to_string();
                    metrics
                        .rejected_operations_total
                        .with_label_values(&[label.as_str()])
                        .inc();
                    warn!(step = index, op, %kind, error = %e, "step rejected");
                    StepResult::Rejected {
                        kind,
                        error: e.to_string(),
                    }
                }
            };
            self.observe(metrics);
            outcomes.push(StepOutcome { index, op, result });
        }

        Ok(RunReport {
            scenario: name.to_string(),
            steps: outcomes,
            summary: self.vault.summary(),
        })
    }

    /// Outer error: the scenario is broken. Inner error: the vault said no.
    fn execute(&self, step: &Step) -> Result<Result<Effect, VaultError>> {
        let vault = &self.vault;
        let done = |r: Result<(), VaultError>| r.map(|()| Effect::Done);

        Ok(match step {
            Step::Deposit { caller, batch } => done(vault.deposit(*caller, batch)),
            Step::Withdraw { caller, batch } => done(vault.withdraw(*caller, batch)),
            Step::OpenMarginAccount { caller, protocol } => {
                let protocol = self.protocol(*protocol)?;
                done(vault.open_margin_account(*caller, protocol))
            }
            Step::CloseMarginAccount { caller } => done(vault.close_margin_account(*caller)),
            Step::IncreaseMargin {
                caller,
                currency,
                amount,
            } => vault
                .increase_margin_position(*caller, *currency, *amount)
                .map(Effect::Admission),
            Step::DecreaseMargin {
                caller,
                currency,
                amount,
            } => vault
                .decrease_margin_position(*caller, *currency, *amount)
                .map(Effect::Admission),
            Step::SetBaseCurrency { caller, currency } => {
                done(vault.set_base_currency(*caller, *currency))
            }
            Step::TransferOwnership { caller, new_owner } => {
                done(vault.transfer_ownership(*caller, *new_owner))
            }
            Step::UpgradeVersion { caller, version } => {
                done(vault.upgrade_version(*caller, *version))
            }
            Step::AttemptLiquidation { caller, keeper } => vault
                .attempt_liquidation(*caller, *keeper)
                .map(Effect::Liquidated),
            Step::SetOpenPosition { protocol, amount } => {
                self.protocol(*protocol)?
                    .set_open_position(vault.address(), *amount);
                Ok(Effect::Done)
            }
            Step::SetPrice { asset, price } => {
                self.registry
                    .set_price(*asset, *price)
                    .with_context(|| format!("failed to reprice {asset}"))?;
                Ok(Effect::Done)
            }
            Step::Rebase { asset, balance } => {
                self.ledger.rebase(*asset, vault.address(), *balance);
                Ok(Effect::Done)
            }
            Step::Freeze { asset } => {
                self.ledger.freeze(*asset);
                Ok(Effect::Done)
            }
            Step::Thaw { asset } => {
                self.ledger.thaw(*asset);
                Ok(Effect::Done)
            }
        })
    }

    fn protocol(&self, address: Address) -> Result<Arc<InMemoryMarginProtocol>> {
        self.protocols
            .get(&address)
            .cloned()
            .with_context(|| format!("undeclared margin protocol {address}"))
    }

    fn observe(&self, metrics: &VaultMetrics) {
        if let Ok(value) = self.vault.collateral_value() {
            metrics.collateral_value.set(value as f64);
        }
        metrics
            .life
            .set(i64::try_from(self.vault.life()).unwrap_or(i64::MAX));
    }
}

fn record(metrics: &VaultMetrics, step: &Step, effect: &Effect) {
    match (step, effect) {
        (Step::Deposit { .. }, _) => metrics.deposits_total.inc(),
        (Step::Withdraw { .. }, _) => metrics.withdrawals_total.inc(),
        (Step::IncreaseMargin { .. }, Effect::Admission(true)) => {
            metrics.margin_admitted_total.inc()
        }
        (Step::IncreaseMargin { .. }, Effect::Admission(false)) => {
            metrics.margin_refused_total.inc()
        }
        (_, Effect::Liquidated(_)) => metrics.liquidations_total.inc(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LIQUIDATION: &str = include_str!("../scenarios/liquidation.json");

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn minimal(steps: serde_json::Value) -> Scenario {
        serde_json::from_value(json!({
            "vault": {
                "address": addr(1),
                "owner": addr(2),
                "factory": addr(3),
                "base_currency": addr(100),
            },
            "currencies": [{ "address": addr(100), "id": 0, "unit_value": 1, "base": true }],
            "assets": [{
                "address": addr(10),
                "price": 2,
                "collateral_factor": 5000,
                "liquidation_threshold": 8000,
            }],
            "balances": [{ "holder": addr(2), "asset": addr(10), "class": "fungible", "amount": 500 }],
            "steps": steps,
        }))
        .unwrap()
    }

    #[test]
    fn bundled_liquidation_scenario_runs() {
        let scenario = Scenario::from_json(LIQUIDATION).unwrap();
        scenario.validate().unwrap();

        let simulation = Simulation::build(&scenario).unwrap();
        let metrics = VaultMetrics::new().unwrap();
        let report = simulation
            .run(&scenario.name, &scenario.steps, &metrics)
            .unwrap();

        let rejected: Vec<_> = report
            .steps
            .iter()
            .filter(|s| !s.is_committed())
            .map(|s| s.index)
            .collect();
        assert_eq!(rejected, vec![4, 8]);
        assert_eq!(report.summary.life, 1);
        assert_eq!(report.summary.owner, Some(addr(50)));
        assert_eq!(metrics.liquidations_total.get(), 1);
        assert_eq!(metrics.margin_admitted_total.get(), 1);
        assert_eq!(
            metrics
                .rejected_operations_total
                .with_label_values(&["health"])
                .get(),
            1
        );
    }

    #[test]
    fn rejections_do_not_stop_the_run() {
        let scenario = minimal(json!([
            { "op": "withdraw", "caller": addr(2), "batch": {
                "assets": [addr(10)], "token_ids": [0], "amounts": [1], "classes": [0] } },
            { "op": "deposit", "caller": addr(2), "batch": {
                "assets": [addr(10)], "token_ids": [0], "amounts": [200], "classes": [0] } },
        ]));
        let simulation = Simulation::build(&scenario).unwrap();
        let report = simulation
            .run("", &scenario.steps, &VaultMetrics::new().unwrap())
            .unwrap();

        assert!(!report.steps[0].is_committed());
        assert!(report.steps[1].is_committed());
        assert_eq!(simulation.vault().collateral_value().unwrap(), 200);
    }

    #[test]
    fn rebase_is_visible_to_valuation() {
        let scenario = minimal(json!([
            { "op": "deposit", "caller": addr(2), "batch": {
                "assets": [addr(10)], "token_ids": [0], "amounts": [100], "classes": [0] } },
            { "op": "rebase", "asset": addr(10), "balance": 40 },
        ]));
        let simulation = Simulation::build(&scenario).unwrap();
        simulation
            .run("", &scenario.steps, &VaultMetrics::new().unwrap())
            .unwrap();
        assert_eq!(simulation.vault().vault_value(addr(100)).unwrap(), 80);
    }

    #[test]
    fn validate_catches_undeclared_names() {
        let scenario = minimal(json!([
            { "op": "open_margin_account", "caller": addr(2), "protocol": addr(40) },
        ]));
        assert!(scenario.validate().is_err());

        let mut scenario = minimal(json!([]));
        scenario.vault.base_currency = addr(101);
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn validate_catches_malformed_batches() {
        let scenario = minimal(json!([
            { "op": "deposit", "caller": addr(2), "batch": {
                "assets": [addr(10)], "token_ids": [], "amounts": [1], "classes": [0] } },
        ]));
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn broken_step_aborts_the_run() {
        let scenario = minimal(json!([
            { "op": "set_open_position", "protocol": addr(40), "amount": 1 },
        ]));
        let simulation = Simulation::build(&scenario).unwrap();
        assert!(simulation
            .run("", &scenario.steps, &VaultMetrics::new().unwrap())
            .is_err());
    }
}
