//! # Collateral Vault
//!
//! A [`Vault`] holds a bundle of assets for one owner, values it through the
//! registry, lets one margin protocol draw against it, and hands itself to a
//! liquidator when it no longer covers that margin.
//!
//! ## Atomicity
//!
//! Every mutating entry point runs inside [`Vault::transact`]:
//!
//! 1. take the single-writer gate;
//! 2. copy the committed state into a working draft;
//! 3. run the operation against the draft, recording every custody transfer
//!    in a [`TransferJournal`];
//! 4. on success, publish the draft as the new committed state; on any
//!    error, move the journaled assets back and discard the draft.
//!
//! Either all effects of an operation are visible afterwards or none are.
//!
//! ## Concurrency & Reentrancy
//!
//! Mutating operations on one vault are serialized: a second thread blocks
//! on the writer gate until the first finishes. The gate is reentrant-aware
//! rather than reentrant: if code running *inside* an operation (an asset
//! transfer hook, a liquidator) calls a mutating entry point on the same
//! thread, that call fails with [`VaultError::Reentrancy`] instead of
//! deadlocking or interleaving.
//!
//! Reads never wait for the writer gate. A read on the writing thread itself
//! (a transfer hook, a liquidator) sees the draft, including bookkeeping that
//! must precede an external call such as an NFT withdrawal. A read on any
//! other thread sees the last committed state, so it never observes work that
//! may still be rolled back and never waits on a writer blocked in an
//! external call.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use keel_protocol::config::{FUNGIBLE_TOKEN_ID, UNIQUE_NFT_AMOUNT};
use keel_protocol::math;
use keel_protocol::{
    Address, AssetBatch, AssetClass, AssetLedger, AssetSnapshot, MarginProtocol, Registry,
    VaultVersion,
};

use crate::access::{AccessGate, Role};
use crate::error::{Collaborator, ExternalResultExt, VaultError};
use crate::inventory::AssetInventory;
use crate::journal::{Transfer, TransferJournal};
use crate::liquidation::{self, HealthReport, LiquidationRecord, LiquidationTrigger, TriggerContext};
use crate::margin::{self, MarginAccount};
use crate::valuation::ValuationClient;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct VaultState {
    initialized: bool,
    version: VaultVersion,
    access: AccessGate,
    inventory: AssetInventory,
    margin: MarginAccount,
    liquidation: LiquidationTrigger,
}

impl Default for VaultState {
    fn default() -> Self {
        Self {
            initialized: false,
            version: 0,
            access: AccessGate::new(),
            inventory: AssetInventory::new(),
            margin: MarginAccount::new(Address::ZERO),
            liquidation: LiquidationTrigger::new(),
        }
    }
}

/// Serializable picture of a vault, for reports and inspection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSummary {
    pub address: Address,
    pub owner: Option<Address>,
    pub factory: Option<Address>,
    pub version: VaultVersion,
    pub base_currency: Address,
    pub margin_protocol: Option<Address>,
    pub liquidator: Option<Address>,
    pub liquidation_threshold: u16,
    pub life: u64,
    pub inventory: AssetInventory,
    pub liquidations: Vec<LiquidationRecord>,
}

/// Releases the writer gate and clears the in-operation flag.
struct WriterGuard<'a>(ReentrantMutexGuard<'a, Cell<bool>>);

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// A multi-asset collateral vault.
pub struct Vault {
    address: Address,
    ledger: Arc<dyn AssetLedger>,
    registry: Arc<dyn Registry>,
    /// Last committed state.
    state: RwLock<VaultState>,
    /// Working copy of the operation in flight, if any.
    draft: RwLock<Option<VaultState>>,
    /// Single-writer gate. The cell is `true` while an operation runs.
    writer: ReentrantMutex<Cell<bool>>,
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("address", &self.address)
            .field("state", &*self.state.read())
            .finish()
    }
}

impl Vault {
    /// Creates an uninitialized vault at `address`.
    ///
    /// Every entry point other than [`initialize`](Self::initialize) fails
    /// with [`VaultError::NotInitialized`] until it is initialized.
    pub fn new(address: Address, ledger: Arc<dyn AssetLedger>, registry: Arc<dyn Registry>) -> Self {
        Self {
            address,
            ledger,
            registry,
            state: RwLock::new(VaultState::default()),
            draft: RwLock::new(None),
            writer: ReentrantMutex::new(Cell::new(false)),
        }
    }

    // -----------------------------------------------------------------------
    // Transaction plumbing
    // -----------------------------------------------------------------------

    fn enter(&self) -> Result<WriterGuard<'_>, VaultError> {
        let guard = self.writer.lock();
        if guard.get() {
            return Err(VaultError::Reentrancy);
        }
        guard.set(true);
        Ok(WriterGuard(guard))
    }

    /// Runs `body` as one atomic vault operation.
    fn transact<T>(
        &self,
        op: &'static str,
        body: impl FnOnce(&mut TransferJournal) -> Result<T, VaultError>,
    ) -> Result<T, VaultError> {
        let _writer = self.enter()?;
        let working = self.state.read().clone();
        *self.draft.write() = Some(working);
        let mut journal = TransferJournal::new();

        match body(&mut journal) {
            Ok(value) => {
                let committed = self.draft.write().take();
                if let Some(committed) = committed {
                    *self.state.write() = committed;
                }
                Ok(value)
            }
            Err(e) => {
                let transfers = journal.len();
                let failed_compensations = journal.unwind(self.ledger.as_ref());
                self.draft.write().take();
                warn!(
                    vault = %self.address,
                    op,
                    kind = %e.kind(),
                    error = %e,
                    transfers,
                    failed_compensations,
                    "operation rolled back"
                );
                Err(e)
            }
        }
    }

    /// Runs `read` against the state visible to the calling thread.
    ///
    /// The gate only yields to a thread with no writer elsewhere or to the
    /// writer itself; the draft is visible to the latter only.
    fn view<R>(&self, read: impl FnOnce(&VaultState) -> R) -> R {
        if let Some(gate) = self.writer.try_lock() {
            if gate.get() {
                if let Some(draft) = self.draft.read().as_ref() {
                    return read(draft);
                }
            }
        }
        read(&self.state.read())
    }

    fn initialized<R>(&self, read: impl FnOnce(&VaultState) -> R) -> Result<R, VaultError> {
        self.view(|state| {
            if !state.initialized {
                return Err(VaultError::NotInitialized);
            }
            Ok(read(state))
        })
    }

    /// Applies `write` to the draft of the operation in flight.
    fn mutate<R>(&self, write: impl FnOnce(&mut VaultState) -> R) -> R {
        let mut draft = self.draft.write();
        let state = draft.get_or_insert_with(|| self.state.read().clone());
        write(state)
    }

    fn authorize(&self, role: Role, caller: Address) -> Result<(), VaultError> {
        self.initialized(|s| s.access.require(role, caller))?
    }

    fn valuation(&self) -> ValuationClient<'_> {
        ValuationClient::new(self.registry.as_ref())
    }

    fn margin_account(&self) -> Result<MarginAccount, VaultError> {
        self.initialized(|s| s.margin.clone())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// One-time setup. `factory` becomes the factory principal.
    ///
    /// # Errors
    ///
    /// - [`VaultError::AlreadyInitialized`] on a second call.
    /// - [`VaultError::NotBaseCurrency`] if the registry does not recognise
    ///   `base_currency`.
    pub fn initialize(
        &self,
        factory: Address,
        owner: Address,
        base_currency: Address,
        version: VaultVersion,
    ) -> Result<(), VaultError> {
        self.transact("initialize", |_| {
            if self.view(|s| s.initialized) {
                return Err(VaultError::AlreadyInitialized);
            }
            if !self.valuation().is_base_currency(base_currency)? {
                return Err(VaultError::NotBaseCurrency(base_currency));
            }
            self.mutate(|s| {
                s.initialized = true;
                s.version = version;
                s.access.grant(Role::Owner, owner);
                s.access.grant(Role::Factory, factory);
                s.margin = MarginAccount::new(base_currency);
            });
            info!(
                vault = %self.address,
                %owner,
                %factory,
                %base_currency,
                version,
                "vault initialized"
            );
            Ok(())
        })
    }

    /// Hands the owner role to `new_owner`. Factory only.
    pub fn transfer_ownership(&self, caller: Address, new_owner: Address) -> Result<(), VaultError> {
        self.transact("transfer_ownership", |_| {
            self.authorize(Role::Factory, caller)?;
            self.mutate(|s| s.access.replace(Role::Owner, new_owner));
            info!(vault = %self.address, %new_owner, "ownership transferred");
            Ok(())
        })
    }

    /// Raises the vault logic version. Factory only.
    ///
    /// # Errors
    ///
    /// [`VaultError::VersionNotNewer`] unless `new_version` exceeds the
    /// current one.
    pub fn upgrade_version(
        &self,
        caller: Address,
        new_version: VaultVersion,
    ) -> Result<(), VaultError> {
        self.transact("upgrade_version", |_| {
            self.authorize(Role::Factory, caller)?;
            let current = self.initialized(|s| s.version)?;
            if new_version <= current {
                return Err(VaultError::VersionNotNewer {
                    current,
                    requested: new_version,
                });
            }
            self.mutate(|s| s.version = new_version);
            info!(vault = %self.address, from = current, to = new_version, "vault upgraded");
            Ok(())
        })
    }

    /// Changes the base currency. Owner only.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotBaseCurrency`] if the registry rejects `currency`.
    /// - [`VaultError::MarginOutstanding`] while used margin is non-zero.
    pub fn set_base_currency(&self, caller: Address, currency: Address) -> Result<(), VaultError> {
        self.transact("set_base_currency", |_| {
            self.authorize(Role::Owner, caller)?;
            if !self.valuation().is_base_currency(currency)? {
                return Err(VaultError::NotBaseCurrency(currency));
            }
            self.change_base_currency(currency)
        })
    }

    fn change_base_currency(&self, currency: Address) -> Result<(), VaultError> {
        let used_margin = self.margin_account()?.outstanding_margin(self.address)?;
        let changed = self.mutate(|s| s.margin.set_base_currency(currency, used_margin))?;
        if changed {
            info!(vault = %self.address, base_currency = %currency, "base currency changed");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deposits & withdrawals
    // -----------------------------------------------------------------------

    /// Moves a batch of assets from the owner into the vault. Owner only.
    ///
    /// Each asset is transferred first and recorded after. The batch is
    /// all-or-nothing: a malformed entry, a non-whitelisted asset, or a
    /// failed transfer leaves both the vault and the ledger as they were.
    pub fn deposit(&self, caller: Address, batch: &AssetBatch) -> Result<(), VaultError> {
        self.transact("deposit", |journal| {
            self.authorize(Role::Owner, caller)?;
            let actions = batch.actions()?;
            if actions.is_empty() {
                return Ok(());
            }
            if !self
                .valuation()
                .is_whitelisted(&batch.assets, &batch.token_ids)?
            {
                return Err(VaultError::NotWhitelisted);
            }

            for action in &actions {
                let (token_id, amount) = match action.class {
                    AssetClass::Fungible => (FUNGIBLE_TOKEN_ID, action.amount),
                    AssetClass::UniqueNft => (action.token_id, UNIQUE_NFT_AMOUNT),
                    AssetClass::MultiNft => (action.token_id, action.amount),
                };
                journal.execute(
                    self.ledger.as_ref(),
                    Transfer {
                        asset: action.asset,
                        class: action.class,
                        from: caller,
                        to: self.address,
                        token_id,
                        amount,
                    },
                )?;
                self.mutate(|s| match action.class {
                    AssetClass::Fungible => {
                        s.inventory.insert_fungible(action.asset);
                    }
                    AssetClass::UniqueNft => {
                        s.inventory.insert_unique_nft(action.asset, token_id);
                    }
                    AssetClass::MultiNft => {
                        s.inventory.insert_multi_nft(action.asset, token_id);
                    }
                });
            }

            debug!(vault = %self.address, entries = actions.len(), "deposit committed");
            Ok(())
        })
    }

    /// Moves a batch of assets from the vault back to the owner. Owner only.
    ///
    /// Ordering per class:
    /// - fungible: transfer, then drop the record if nothing is left;
    /// - unique NFT: drop the record, then transfer;
    /// - multi-class NFT: drop the record if the withdrawal empties the
    ///   position, then transfer.
    ///
    /// After all transfers, a vault with used margin must still have
    /// collateral value strictly greater than that margin.
    pub fn withdraw(&self, caller: Address, batch: &AssetBatch) -> Result<(), VaultError> {
        self.transact("withdraw", |journal| {
            self.authorize(Role::Owner, caller)?;
            let actions = batch.actions()?;
            let ledger = self.ledger.as_ref();

            for action in &actions {
                match action.class {
                    AssetClass::Fungible => {
                        journal.execute(
                            ledger,
                            Transfer {
                                asset: action.asset,
                                class: AssetClass::Fungible,
                                from: self.address,
                                to: caller,
                                token_id: FUNGIBLE_TOKEN_ID,
                                amount: action.amount,
                            },
                        )?;
                        let residual = ledger
                            .fungible_balance(action.asset, self.address)
                            .via(Collaborator::Ledger)?;
                        if residual == 0 {
                            self.mutate(|s| s.inventory.remove_fungible(action.asset));
                        }
                    }
                    AssetClass::UniqueNft => {
                        let removed = self
                            .mutate(|s| s.inventory.remove_unique_nft(action.asset, action.token_id));
                        if !removed {
                            return Err(VaultError::AssetNotHeld {
                                asset: action.asset,
                                token_id: action.token_id,
                            });
                        }
                        journal.execute(
                            ledger,
                            Transfer {
                                asset: action.asset,
                                class: AssetClass::UniqueNft,
                                from: self.address,
                                to: caller,
                                token_id: action.token_id,
                                amount: UNIQUE_NFT_AMOUNT,
                            },
                        )?;
                    }
                    AssetClass::MultiNft => {
                        let held = ledger
                            .multi_balance(action.asset, self.address, action.token_id)
                            .via(Collaborator::Ledger)?;
                        if math::clamp_sub(held, action.amount) == 0 {
                            self.mutate(|s| s.inventory.remove_multi_nft(action.asset, action.token_id));
                        }
                        journal.execute(
                            ledger,
                            Transfer {
                                asset: action.asset,
                                class: AssetClass::MultiNft,
                                from: self.address,
                                to: caller,
                                token_id: action.token_id,
                                amount: action.amount,
                            },
                        )?;
                    }
                }
            }

            let used_margin = self.margin_account()?.outstanding_margin(self.address)?;
            if used_margin != 0 {
                let collateral_value = self.collateral_value()?;
                if collateral_value <= used_margin {
                    return Err(VaultError::InsufficientCollateral {
                        collateral_value,
                        used_margin,
                    });
                }
            }

            debug!(vault = %self.address, entries = actions.len(), "withdrawal committed");
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Margin account
    // -----------------------------------------------------------------------

    /// Binds `protocol` as this vault's margin protocol. Owner only.
    ///
    /// If the protocol lends in a different currency, the vault's base
    /// currency follows it. The protocol becomes an authorized margin caller.
    ///
    /// # Errors
    ///
    /// - [`VaultError::MarginAccountOpen`] if a protocol is already bound.
    /// - [`VaultError::HandshakeRefused`] if the protocol declines.
    /// - [`VaultError::NotBaseCurrency`] if the protocol lends in a currency
    ///   the registry does not accept as a base currency.
    pub fn open_margin_account(
        &self,
        caller: Address,
        protocol: Arc<dyn MarginProtocol>,
    ) -> Result<(), VaultError> {
        self.transact("open_margin_account", |_| {
            self.authorize(Role::Owner, caller)?;
            let (account, version) = self.initialized(|s| (s.margin.clone(), s.version))?;
            if let Some(existing) = account.protocol_address() {
                return Err(VaultError::MarginAccountOpen(existing));
            }

            let principal = protocol.address();
            let handshake = protocol
                .open_margin_account(self.address, version)
                .via(Collaborator::MarginProtocol)?;
            if !handshake.accepted {
                return Err(VaultError::HandshakeRefused(principal));
            }
            if handshake.base_currency != account.base_currency() {
                if !self.valuation().is_base_currency(handshake.base_currency)? {
                    return Err(VaultError::NotBaseCurrency(handshake.base_currency));
                }
                self.change_base_currency(handshake.base_currency)?;
            }

            let liquidator = handshake.liquidator.address();
            self.mutate(|s| {
                s.margin.bind(protocol, handshake.liquidator)?;
                s.access.grant(Role::MarginCaller, principal);
                Ok::<_, VaultError>(())
            })?;
            info!(
                vault = %self.address,
                protocol = %principal,
                %liquidator,
                base_currency = %handshake.base_currency,
                "margin account opened"
            );
            Ok(())
        })
    }

    /// Unbinds the margin protocol. Owner only.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NoMarginAccount`] if nothing is bound.
    /// - [`VaultError::OpenPosition`] unless the protocol reports exactly zero.
    pub fn close_margin_account(&self, caller: Address) -> Result<(), VaultError> {
        self.transact("close_margin_account", |_| {
            self.authorize(Role::Owner, caller)?;
            let protocol = self
                .margin_account()?
                .protocol()
                .cloned()
                .ok_or(VaultError::NoMarginAccount)?;

            let open = protocol
                .open_position(self.address)
                .via(Collaborator::MarginProtocol)?;
            if open != 0 {
                return Err(VaultError::OpenPosition(open));
            }

            let principal = protocol.address();
            self.mutate(|s| {
                s.margin.unbind()?;
                s.access.revoke(Role::MarginCaller, principal);
                Ok::<_, VaultError>(())
            })?;
            info!(vault = %self.address, protocol = %principal, "margin account closed");
            Ok(())
        })
    }

    /// Admission check for a margin increase. Authorized margin callers only.
    ///
    /// Returns `Ok(false)` if `currency` is not the base currency or the
    /// collateral value does not cover `used_margin + amount`. On admission
    /// the registry's liquidation threshold is cached for the health test.
    pub fn increase_margin_position(
        &self,
        caller: Address,
        currency: Address,
        amount: u128,
    ) -> Result<bool, VaultError> {
        self.transact("increase_margin_position", |_| {
            self.authorize(Role::MarginCaller, caller)?;
            let account = self.margin_account()?;
            if currency != account.base_currency() {
                debug!(vault = %self.address, %currency, "margin increase in foreign currency");
                return Ok(false);
            }

            let snapshot = self.snapshot()?;
            let valuation = self
                .valuation()
                .collateral_value_and_threshold(&snapshot, account.base_currency())?;
            let used_margin = account.used_margin(self.address)?;
            let admitted = margin::admits_increase(valuation.collateral_value, used_margin, amount)?;

            if admitted {
                self.mutate(|s| s.margin.cache_threshold(valuation.liquidation_threshold));
            }
            debug!(
                vault = %self.address,
                amount,
                used_margin,
                collateral_value = valuation.collateral_value,
                admitted,
                "margin increase evaluated"
            );
            Ok(admitted)
        })
    }

    /// Currency check for a margin decrease. Authorized margin callers only.
    ///
    /// Debt reduction is the protocol's business; the vault only confirms
    /// the currency matches and changes nothing.
    pub fn decrease_margin_position(
        &self,
        caller: Address,
        currency: Address,
        _amount: u128,
    ) -> Result<bool, VaultError> {
        self.transact("decrease_margin_position", |_| {
            self.authorize(Role::MarginCaller, caller)?;
            Ok(currency == self.margin_account()?.base_currency())
        })
    }

    // -----------------------------------------------------------------------
    // Liquidation
    // -----------------------------------------------------------------------

    /// Hands an unhealthy vault to its liquidator. Factory only.
    ///
    /// Returns the liquidator's address. Moving ownership to it is a
    /// separate [`transfer_ownership`](Self::transfer_ownership) call.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Healthy`] if the vault still covers its margin.
    /// - [`VaultError::NoLiquidator`] if no liquidator was ever designated.
    /// - [`VaultError::AuctionRefused`] / [`VaultError::External`] if the
    ///   liquidator fails; the epoch is not advanced.
    pub fn attempt_liquidation(&self, caller: Address, keeper: Address) -> Result<Address, VaultError> {
        self.transact("attempt_liquidation", |_| {
            self.authorize(Role::Factory, caller)?;
            let report = self.health()?;
            if report.is_healthy() {
                return Err(VaultError::Healthy {
                    total_value: report.total_value,
                    used_margin: report.used_margin,
                    liquidation_threshold: report.liquidation_threshold,
                });
            }

            let (owner, account, mut trigger) = self.initialized(|s| {
                (
                    s.access.sole(Role::Owner),
                    s.margin.clone(),
                    s.liquidation.clone(),
                )
            })?;
            let owner = owner.ok_or(VaultError::NotInitialized)?;
            let currency_id = self.valuation().currency_id_of(account.base_currency())?;
            let liquidator = account.liquidator().cloned().ok_or(VaultError::NoLiquidator)?;

            let record = trigger.trigger(
                TriggerContext {
                    vault: self.address,
                    owner,
                    keeper,
                    currency_id,
                },
                &report,
                liquidator.as_ref(),
            )?;
            self.mutate(|s| s.liquidation = trigger);
            Ok(record.liquidator)
        })
    }

    // -----------------------------------------------------------------------
    // Read surface
    // -----------------------------------------------------------------------

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn is_initialized(&self) -> bool {
        self.view(|s| s.initialized)
    }

    pub fn owner(&self) -> Option<Address> {
        self.view(|s| s.access.sole(Role::Owner))
    }

    pub fn factory(&self) -> Option<Address> {
        self.view(|s| s.access.sole(Role::Factory))
    }

    pub fn version(&self) -> VaultVersion {
        self.view(|s| s.version)
    }

    pub fn base_currency(&self) -> Address {
        self.view(|s| s.margin.base_currency())
    }

    /// Epoch counter: number of liquidations so far.
    pub fn life(&self) -> u64 {
        self.view(|s| s.liquidation.life())
    }

    /// Threshold cached at the last admitted margin increase.
    pub fn liquidation_threshold(&self) -> u16 {
        self.view(|s| s.margin.liquidation_threshold())
    }

    pub fn is_margin_account_open(&self) -> bool {
        self.view(|s| s.margin.is_open())
    }

    pub fn margin_protocol(&self) -> Option<Address> {
        self.view(|s| s.margin.protocol_address())
    }

    pub fn liquidator(&self) -> Option<Address> {
        self.view(|s| s.margin.liquidator_address())
    }

    /// Whether `principal` may call the margin entry points.
    pub fn is_margin_caller(&self, principal: Address) -> bool {
        self.view(|s| s.access.has(Role::MarginCaller, principal))
    }

    /// A copy of the current bookkeeping.
    pub fn inventory(&self) -> AssetInventory {
        self.view(|s| s.inventory.clone())
    }

    pub fn liquidation_history(&self) -> Vec<LiquidationRecord> {
        self.view(|s| s.liquidation.history().to_vec())
    }

    /// Holdings in valuation format with live balances.
    pub fn snapshot(&self) -> Result<AssetSnapshot, VaultError> {
        let inventory = self.initialized(|s| s.inventory.clone())?;
        inventory
            .snapshot(self.address, self.ledger.as_ref())
            .via(Collaborator::Ledger)
    }

    /// Unhaircut value of the holdings in `currency`.
    pub fn vault_value(&self, currency: Address) -> Result<u128, VaultError> {
        let snapshot = self.snapshot()?;
        self.valuation().total_value(&snapshot, currency)
    }

    /// Haircut value of the holdings in the base currency.
    pub fn collateral_value(&self) -> Result<u128, VaultError> {
        let base_currency = self.margin_account()?.base_currency();
        let snapshot = self.snapshot()?;
        Ok(self
            .valuation()
            .collateral_value_and_threshold(&snapshot, base_currency)?
            .collateral_value)
    }

    /// Outstanding margin reported by the bound protocol.
    ///
    /// # Errors
    ///
    /// [`VaultError::NoMarginAccount`] if no protocol is bound.
    pub fn used_margin(&self) -> Result<u128, VaultError> {
        self.margin_account()?.used_margin(self.address)
    }

    /// `max(0, collateral_value - used_margin)`.
    pub fn free_margin(&self) -> Result<u128, VaultError> {
        let collateral_value = self.collateral_value()?;
        let used_margin = self.used_margin()?;
        Ok(margin::free_margin(collateral_value, used_margin))
    }

    /// Evaluates the health test without side effects.
    pub fn health(&self) -> Result<HealthReport, VaultError> {
        let account = self.margin_account()?;
        let total_value = self.vault_value(account.base_currency())?;
        let used_margin = account.used_margin(self.address)?;
        Ok(liquidation::evaluate(
            total_value,
            used_margin,
            account.liquidation_threshold(),
        )?)
    }

    pub fn summary(&self) -> VaultSummary {
        self.view(|state| VaultSummary {
            address: self.address,
            owner: state.access.sole(Role::Owner),
            factory: state.access.sole(Role::Factory),
            version: state.version,
            base_currency: state.margin.base_currency(),
            margin_protocol: state.margin.protocol_address(),
            liquidator: state.margin.liquidator_address(),
            liquidation_threshold: state.margin.liquidation_threshold(),
            life: state.liquidation.life(),
            inventory: state.inventory.clone(),
            liquidations: state.liquidation.history().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use keel_protocol::config::{CURRENT_VAULT_VERSION, FULL_COLLATERAL_FACTOR};
    use keel_protocol::memory::{AssetRisk, CurrencyInfo, InMemoryLedger, PriceRegistry};

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    const VAULT: u64 = 1;
    const OWNER: u64 = 2;
    const FACTORY: u64 = 3;
    const USD: u64 = 100;
    const TOKEN: u64 = 10;

    fn vault() -> (Vault, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new());
        let registry = Arc::new(PriceRegistry::new());
        registry.add_currency(addr(USD), CurrencyInfo { id: 0, unit_value: 1, base: true });
        registry.list_asset(
            addr(TOKEN),
            AssetRisk {
                price: 1,
                collateral_factor: FULL_COLLATERAL_FACTOR,
                liquidation_threshold: 5_000,
            },
        );
        ledger.mint_fungible(addr(TOKEN), addr(OWNER), 1_000).unwrap();
        let vault = Vault::new(addr(VAULT), ledger.clone(), registry);
        (vault, ledger)
    }

    #[test]
    fn entry_points_require_initialization() {
        let (vault, _) = vault();
        let batch = AssetBatch::new().fungible(addr(TOKEN), 1);
        assert_eq!(
            vault.deposit(addr(OWNER), &batch).unwrap_err(),
            VaultError::NotInitialized
        );
        assert_eq!(vault.snapshot().unwrap_err(), VaultError::NotInitialized);
    }

    #[test]
    fn double_initialize_rejected() {
        let (vault, _) = vault();
        vault
            .initialize(addr(FACTORY), addr(OWNER), addr(USD), CURRENT_VAULT_VERSION)
            .unwrap();
        let err = vault
            .initialize(addr(FACTORY), addr(9), addr(USD), CURRENT_VAULT_VERSION)
            .unwrap_err();
        assert_eq!(err, VaultError::AlreadyInitialized);
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(vault.owner(), Some(addr(OWNER)));
    }

    #[test]
    fn initialize_requires_a_base_currency() {
        let (vault, _) = vault();
        let err = vault
            .initialize(addr(FACTORY), addr(OWNER), addr(101), CURRENT_VAULT_VERSION)
            .unwrap_err();
        assert_eq!(err, VaultError::NotBaseCurrency(addr(101)));
        assert!(!vault.is_initialized());
    }

    #[test]
    fn deposit_then_full_withdraw_restores_inventory() {
        let (vault, ledger) = vault();
        vault
            .initialize(addr(FACTORY), addr(OWNER), addr(USD), CURRENT_VAULT_VERSION)
            .unwrap();

        let batch = AssetBatch::new().fungible(addr(TOKEN), 400);
        vault.deposit(addr(OWNER), &batch).unwrap();
        vault.deposit(addr(OWNER), &batch).unwrap();
        assert_eq!(vault.inventory().fungible(), &[addr(TOKEN)]);
        assert_eq!(vault.vault_value(addr(USD)).unwrap(), 800);

        vault
            .withdraw(addr(OWNER), &AssetBatch::new().fungible(addr(TOKEN), 800))
            .unwrap();
        assert!(vault.inventory().is_empty());
        assert_eq!(ledger.fungible_balance(addr(TOKEN), addr(OWNER)).unwrap(), 1_000);
    }

    #[test]
    fn partial_withdraw_keeps_the_record() {
        let (vault, _) = vault();
        vault
            .initialize(addr(FACTORY), addr(OWNER), addr(USD), CURRENT_VAULT_VERSION)
            .unwrap();
        vault
            .deposit(addr(OWNER), &AssetBatch::new().fungible(addr(TOKEN), 400))
            .unwrap();
        vault
            .withdraw(addr(OWNER), &AssetBatch::new().fungible(addr(TOKEN), 100))
            .unwrap();
        assert_eq!(vault.inventory().fungible(), &[addr(TOKEN)]);
        assert_eq!(vault.snapshot().unwrap().amounts, vec![300]);
    }

    #[test]
    fn only_the_owner_deposits() {
        let (vault, _) = vault();
        vault
            .initialize(addr(FACTORY), addr(OWNER), addr(USD), CURRENT_VAULT_VERSION)
            .unwrap();
        let err = vault
            .deposit(addr(FACTORY), &AssetBatch::new().fungible(addr(TOKEN), 1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn upgrade_must_move_forward() {
        let (vault, _) = vault();
        vault
            .initialize(addr(FACTORY), addr(OWNER), addr(USD), 1)
            .unwrap();
        assert_eq!(
            vault.upgrade_version(addr(FACTORY), 1).unwrap_err(),
            VaultError::VersionNotNewer { current: 1, requested: 1 }
        );
        assert_eq!(
            vault.upgrade_version(addr(OWNER), 2).unwrap_err().kind(),
            ErrorKind::Authorization
        );
        vault.upgrade_version(addr(FACTORY), 2).unwrap();
        assert_eq!(vault.version(), 2);
    }

    #[test]
    fn summary_reflects_state() {
        let (vault, _) = vault();
        vault
            .initialize(addr(FACTORY), addr(OWNER), addr(USD), CURRENT_VAULT_VERSION)
            .unwrap();
        vault
            .deposit(addr(OWNER), &AssetBatch::new().fungible(addr(TOKEN), 5))
            .unwrap();
        let summary = vault.summary();
        assert_eq!(summary.owner, Some(addr(OWNER)));
        assert_eq!(summary.factory, Some(addr(FACTORY)));
        assert_eq!(summary.base_currency, addr(USD));
        assert_eq!(summary.life, 0);
        assert_eq!(summary.inventory.fungible(), &[addr(TOKEN)]);
        assert!(serde_json::to_string(&summary).is_ok());
    }
}
