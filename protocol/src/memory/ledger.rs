//! # In-Memory Asset Ledger
//!
//! Holds balances for all three asset classes in hash maps. Supports the
//! things real assets do to a vault and that tests need to provoke:
//!
//! - **transfer hooks** run before a transfer moves anything, the way a token
//!   callback would, so a hook can call back into the vault;
//! - **freezing** an asset makes every transfer of it revert;
//! - **rebasing** overwrites a fungible balance in place.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::trace;

use crate::interfaces::{AssetLedger, ExternalError};
use crate::math;
use crate::types::{Address, AssetClass, TokenId};

/// A transfer about to be executed, as seen by a hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferEvent {
    pub asset: Address,
    pub class: AssetClass,
    pub from: Address,
    pub to: Address,
    pub token_id: TokenId,
    pub amount: u128,
}

/// Callback invoked on every transfer of the asset it is registered for.
pub type TransferHook = Arc<dyn Fn(&TransferEvent) + Send + Sync>;

#[derive(Default)]
struct Books {
    /// (asset, holder) -> balance
    fungible: HashMap<(Address, Address), u128>,
    /// (asset, token id) -> owner
    unique: HashMap<(Address, TokenId), Address>,
    /// (asset, holder, token id) -> balance
    multi: HashMap<(Address, Address, TokenId), u128>,
    frozen: HashSet<Address>,
}

/// A thread-safe ledger of asset balances.
#[derive(Default)]
pub struct InMemoryLedger {
    books: RwLock<Books>,
    hooks: RwLock<HashMap<Address, TransferHook>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `amount` of a fungible asset to `holder`.
    pub fn mint_fungible(
        &self,
        asset: Address,
        holder: Address,
        amount: u128,
    ) -> Result<(), ExternalError> {
        let mut books = self.books.write();
        let balance = books.fungible.entry((asset, holder)).or_insert(0);
        *balance = math::add(*balance, amount)?;
        Ok(())
    }

    /// Creates a unique token owned by `holder`. Fails if the token exists.
    pub fn mint_unique(
        &self,
        asset: Address,
        holder: Address,
        token_id: TokenId,
    ) -> Result<(), ExternalError> {
        let mut books = self.books.write();
        if books.unique.contains_key(&(asset, token_id)) {
            return Err(ExternalError::Reverted(format!(
                "token {token_id} of {asset} already minted"
            )));
        }
        books.unique.insert((asset, token_id), holder);
        Ok(())
    }

    /// Credits `amount` of a multi-class token to `holder`.
    pub fn mint_multi(
        &self,
        asset: Address,
        holder: Address,
        token_id: TokenId,
        amount: u128,
    ) -> Result<(), ExternalError> {
        let mut books = self.books.write();
        let balance = books.multi.entry((asset, holder, token_id)).or_insert(0);
        *balance = math::add(*balance, amount)?;
        Ok(())
    }

    /// Overwrites a fungible balance, the way a rebasing token would.
    pub fn rebase(&self, asset: Address, holder: Address, new_balance: u128) {
        self.books.write().fungible.insert((asset, holder), new_balance);
    }

    /// Current owner of a unique token, if minted.
    pub fn owner_of(&self, asset: Address, token_id: TokenId) -> Option<Address> {
        self.books.read().unique.get(&(asset, token_id)).copied()
    }

    /// Makes every transfer of `asset` revert until [`thaw`](Self::thaw).
    pub fn freeze(&self, asset: Address) {
        self.books.write().frozen.insert(asset);
    }

    pub fn thaw(&self, asset: Address) {
        self.books.write().frozen.remove(&asset);
    }

    /// Registers a hook run at the start of every transfer of `asset`.
    pub fn set_transfer_hook(&self, asset: Address, hook: TransferHook) {
        self.hooks.write().insert(asset, hook);
    }

    pub fn clear_transfer_hook(&self, asset: Address) {
        self.hooks.write().remove(&asset);
    }

    /// Runs the hook (if any) with no ledger lock held, then checks the freeze.
    fn before_transfer(&self, event: TransferEvent) -> Result<(), ExternalError> {
        let hook = self.hooks.read().get(&event.asset).cloned();
        if let Some(hook) = hook {
            hook(&event);
        }
        if self.books.read().frozen.contains(&event.asset) {
            return Err(ExternalError::Reverted(format!(
                "asset {} is frozen",
                event.asset
            )));
        }
        trace!(
            asset = %event.asset,
            class = %event.class,
            from = %event.from,
            to = %event.to,
            token_id = event.token_id,
            amount = event.amount,
            "ledger transfer"
        );
        Ok(())
    }
}

/// Moves `amount` between two entries of a balance map.
fn move_balance<K: std::hash::Hash + Eq + Copy>(
    map: &mut HashMap<K, u128>,
    from: K,
    to: K,
    amount: u128,
    asset: Address,
    holder: Address,
) -> Result<(), ExternalError> {
    let available = map.get(&from).copied().unwrap_or(0);
    if available < amount {
        return Err(ExternalError::InsufficientBalance {
            asset,
            holder,
            available,
            required: amount,
        });
    }
    if from == to {
        return Ok(());
    }
    let credited = math::add(map.get(&to).copied().unwrap_or(0), amount)?;
    map.insert(from, available - amount);
    map.insert(to, credited);
    Ok(())
}

impl AssetLedger for InMemoryLedger {
    fn transfer_fungible(
        &self,
        asset: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), ExternalError> {
        self.before_transfer(TransferEvent {
            asset,
            class: AssetClass::Fungible,
            from,
            to,
            token_id: 0,
            amount,
        })?;
        let mut books = self.books.write();
        move_balance(
            &mut books.fungible,
            (asset, from),
            (asset, to),
            amount,
            asset,
            from,
        )
    }

    fn transfer_unique(
        &self,
        asset: Address,
        from: Address,
        to: Address,
        token_id: TokenId,
    ) -> Result<(), ExternalError> {
        self.before_transfer(TransferEvent {
            asset,
            class: AssetClass::UniqueNft,
            from,
            to,
            token_id,
            amount: 1,
        })?;
        let mut books = self.books.write();
        match books.unique.get_mut(&(asset, token_id)) {
            Some(owner) if *owner == from => {
                *owner = to;
                Ok(())
            }
            _ => Err(ExternalError::NotOwner {
                asset,
                holder: from,
                token_id,
            }),
        }
    }

    fn transfer_multi(
        &self,
        asset: Address,
        from: Address,
        to: Address,
        token_id: TokenId,
        amount: u128,
    ) -> Result<(), ExternalError> {
        self.before_transfer(TransferEvent {
            asset,
            class: AssetClass::MultiNft,
            from,
            to,
            token_id,
            amount,
        })?;
        let mut books = self.books.write();
        move_balance(
            &mut books.multi,
            (asset, from, token_id),
            (asset, to, token_id),
            amount,
            asset,
            from,
        )
    }

    fn fungible_balance(&self, asset: Address, holder: Address) -> Result<u128, ExternalError> {
        Ok(self
            .books
            .read()
            .fungible
            .get(&(asset, holder))
            .copied()
            .unwrap_or(0))
    }

    fn multi_balance(
        &self,
        asset: Address,
        holder: Address,
        token_id: TokenId,
    ) -> Result<u128, ExternalError> {
        Ok(self
            .books
            .read()
            .multi
            .get(&(asset, holder, token_id))
            .copied()
            .unwrap_or(0))
    }
}
