//! # Asset Inventory
//!
//! Bookkeeping of what a vault holds, in three collections:
//!
//! ```text
//! fungible    [asset, ...]                       unique ids, no amounts
//! unique      [asset, ...] ↔ [token_id, ...]     a pair at most once
//! multi       [asset, ...] ↔ [token_id, ...]     a pair at most once
//! ```
//!
//! Membership checks are linear scans over plain vectors. Removal is
//! swap-with-last then truncate, so it reorders the survivors; callers must
//! not rely on order.
//!
//! The inventory never stores amounts. [`AssetInventory::snapshot`] reads
//! live balances from the ledger on every call so rebasing assets are
//! valued at what the vault actually holds.

use serde::{Deserialize, Serialize};

use keel_protocol::config::{FUNGIBLE_TOKEN_ID, UNIQUE_NFT_AMOUNT};
use keel_protocol::{Address, AssetLedger, AssetSnapshot, ExternalError, TokenId};

// ---------------------------------------------------------------------------
// TokenRecords
// ---------------------------------------------------------------------------

/// Two index-aligned sequences of `(asset, token_id)` pairs.
///
/// Invariant: `assets.len() == token_ids.len()`, and index `i` of one always
/// belongs with index `i` of the other. Every mutation touches both.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecords {
    assets: Vec<Address>,
    token_ids: Vec<TokenId>,
}

impl TokenRecords {
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn assets(&self) -> &[Address] {
        &self.assets
    }

    pub fn token_ids(&self) -> &[TokenId] {
        &self.token_ids
    }

    /// Index of the pair, if recorded.
    pub fn position(&self, asset: Address, token_id: TokenId) -> Option<usize> {
        self.assets
            .iter()
            .zip(&self.token_ids)
            .position(|(a, id)| *a == asset && *id == token_id)
    }

    pub fn contains(&self, asset: Address, token_id: TokenId) -> bool {
        self.position(asset, token_id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Address, TokenId)> + '_ {
        self.assets.iter().copied().zip(self.token_ids.iter().copied())
    }

    fn push(&mut self, asset: Address, token_id: TokenId) {
        self.assets.push(asset);
        self.token_ids.push(token_id);
    }

    /// Swap-removes the pair at `index` from both sequences at once.
    fn swap_remove(&mut self, index: usize) {
        self.assets.swap_remove(index);
        self.token_ids.swap_remove(index);
    }

    /// Removes the pair if present. Returns whether it was.
    fn remove(&mut self, asset: Address, token_id: TokenId) -> bool {
        match self.position(asset, token_id) {
            Some(index) => {
                self.swap_remove(index);
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// AssetInventory
// ---------------------------------------------------------------------------

/// What a vault currently holds, per asset class.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInventory {
    fungible: Vec<Address>,
    unique: TokenRecords,
    multi: TokenRecords,
}

impl AssetInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fungible(&self) -> &[Address] {
        &self.fungible
    }

    pub fn unique_nfts(&self) -> &TokenRecords {
        &self.unique
    }

    pub fn multi_nfts(&self) -> &TokenRecords {
        &self.multi
    }

    /// Total number of records across the three classes.
    pub fn len(&self) -> usize {
        self.fungible.len() + self.unique.len() + self.multi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records a fungible asset. No-op if already recorded.
    ///
    /// Returns `true` if a record was added.
    pub fn insert_fungible(&mut self, asset: Address) -> bool {
        if self.fungible.contains(&asset) {
            return false;
        }
        self.fungible.push(asset);
        true
    }

    /// Records a unique NFT. Always appends: the same asset legitimately
    /// appears once per token held, and the ledger guarantees a token can
    /// only be deposited by its single owner.
    pub fn insert_unique_nft(&mut self, asset: Address, token_id: TokenId) {
        self.unique.push(asset, token_id);
    }

    /// Records a multi-class NFT position. No-op if the pair is already
    /// recorded; the amount lives on the ledger.
    ///
    /// Returns `true` if a record was added.
    pub fn insert_multi_nft(&mut self, asset: Address, token_id: TokenId) -> bool {
        if self.multi.contains(asset, token_id) {
            return false;
        }
        self.multi.push(asset, token_id);
        true
    }

    /// Forgets a fungible asset. Returns `true` if it was recorded.
    pub fn remove_fungible(&mut self, asset: Address) -> bool {
        match self.fungible.iter().position(|a| *a == asset) {
            Some(index) => {
                self.fungible.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Forgets a unique NFT. Returns `true` if it was recorded.
    pub fn remove_unique_nft(&mut self, asset: Address, token_id: TokenId) -> bool {
        self.unique.remove(asset, token_id)
    }

    /// Forgets a multi-class NFT position. Returns `true` if it was recorded.
    pub fn remove_multi_nft(&mut self, asset: Address, token_id: TokenId) -> bool {
        self.multi.remove(asset, token_id)
    }

    /// Builds the valuation view of the holdings of `vault`.
    ///
    /// Class order is fungible, unique, multi. Fungible and multi-class
    /// amounts are read from `ledger` now; unique NFTs count as one.
    pub fn snapshot(
        &self,
        vault: Address,
        ledger: &dyn AssetLedger,
    ) -> Result<AssetSnapshot, ExternalError> {
        let mut snapshot = AssetSnapshot::with_capacity(self.len());

        for asset in &self.fungible {
            let balance = ledger.fungible_balance(*asset, vault)?;
            snapshot.push(*asset, FUNGIBLE_TOKEN_ID, balance);
        }
        for (asset, token_id) in self.unique.iter() {
            snapshot.push(asset, token_id, UNIQUE_NFT_AMOUNT);
        }
        for (asset, token_id) in self.multi.iter() {
            let balance = ledger.multi_balance(asset, vault, token_id)?;
            snapshot.push(asset, token_id, balance);
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_protocol::memory::InMemoryLedger;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[test]
    fn fungible_insert_is_idempotent() {
        let mut inv = AssetInventory::new();
        assert!(inv.insert_fungible(addr(1)));
        assert!(!inv.insert_fungible(addr(1)));
        assert_eq!(inv.fungible(), &[addr(1)]);
    }

    #[test]
    fn unique_nfts_of_one_asset_coexist() {
        let mut inv = AssetInventory::new();
        inv.insert_unique_nft(addr(2), 1);
        inv.insert_unique_nft(addr(2), 2);
        assert_eq!(inv.unique_nfts().assets(), &[addr(2), addr(2)]);
        assert_eq!(inv.unique_nfts().token_ids(), &[1, 2]);
    }

    #[test]
    fn multi_pair_is_deduplicated() {
        let mut inv = AssetInventory::new();
        assert!(inv.insert_multi_nft(addr(3), 7));
        assert!(!inv.insert_multi_nft(addr(3), 7));
        assert!(inv.insert_multi_nft(addr(3), 8));
        assert_eq!(inv.multi_nfts().len(), 2);
    }

    #[test]
    fn swap_remove_keeps_pairs_aligned() {
        let mut inv = AssetInventory::new();
        inv.insert_unique_nft(addr(1), 10);
        inv.insert_unique_nft(addr(2), 20);
        inv.insert_unique_nft(addr(3), 30);

        assert!(inv.remove_unique_nft(addr(1), 10));
        // The last pair moved into the vacated slot, together.
        assert_eq!(inv.unique_nfts().assets(), &[addr(3), addr(2)]);
        assert_eq!(inv.unique_nfts().token_ids(), &[30, 20]);
    }

    #[test]
    fn removing_the_only_element_empties_the_class() {
        let mut inv = AssetInventory::new();
        inv.insert_fungible(addr(1));
        assert!(inv.remove_fungible(addr(1)));
        assert!(inv.fungible().is_empty());
        assert!(!inv.remove_fungible(addr(1)));
    }

    #[test]
    fn snapshot_reads_live_balances_in_class_order() {
        let vault = addr(99);
        let ledger = InMemoryLedger::new();
        ledger.mint_fungible(addr(1), vault, 500).unwrap();
        ledger.mint_multi(addr(3), vault, 4, 12).unwrap();

        let mut inv = AssetInventory::new();
        inv.insert_multi_nft(addr(3), 4);
        inv.insert_unique_nft(addr(2), 9);
        inv.insert_fungible(addr(1));

        let snap = inv.snapshot(vault, &ledger).unwrap();
        assert_eq!(snap.assets, vec![addr(1), addr(2), addr(3)]);
        assert_eq!(snap.token_ids, vec![0, 9, 4]);
        assert_eq!(snap.amounts, vec![500, 1, 12]);

        // No caching: a rebase shows up in the next snapshot.
        ledger.rebase(addr(1), vault, 650);
        assert_eq!(inv.snapshot(vault, &ledger).unwrap().amounts[0], 650);
    }

    #[derive(Clone, Debug)]
    enum Op {
        InsertFungible(u64),
        RemoveFungible(u64),
        InsertUnique(u64, u128),
        RemoveUnique(u64, u128),
        InsertMulti(u64, u128),
        RemoveMulti(u64, u128),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        // Small domains so inserts and removals collide often.
        let a = 0u64..4;
        let t = 0u128..4;
        prop_oneof![
            a.clone().prop_map(Op::InsertFungible),
            a.clone().prop_map(Op::RemoveFungible),
            (a.clone(), t.clone()).prop_map(|(a, t)| Op::InsertUnique(a, t)),
            (a.clone(), t.clone()).prop_map(|(a, t)| Op::RemoveUnique(a, t)),
            (a.clone(), t.clone()).prop_map(|(a, t)| Op::InsertMulti(a, t)),
            (a, t).prop_map(|(a, t)| Op::RemoveMulti(a, t)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn invariants_hold_under_arbitrary_ops(ops in prop::collection::vec(op_strategy(), 0..64)) {
            let mut inv = AssetInventory::new();
            let mut fungible = HashSet::new();
            let mut multi = HashSet::new();

            for op in ops {
                match op {
                    Op::InsertFungible(a) => {
                        prop_assert_eq!(inv.insert_fungible(addr(a)), fungible.insert(a));
                    }
                    Op::RemoveFungible(a) => {
                        prop_assert_eq!(inv.remove_fungible(addr(a)), fungible.remove(&a));
                    }
                    Op::InsertUnique(a, t) => {
                        // Mirror the ledger: a token can only arrive once.
                        if !inv.unique_nfts().contains(addr(a), t) {
                            inv.insert_unique_nft(addr(a), t);
                        }
                    }
                    Op::RemoveUnique(a, t) => {
                        inv.remove_unique_nft(addr(a), t);
                    }
                    Op::InsertMulti(a, t) => {
                        prop_assert_eq!(inv.insert_multi_nft(addr(a), t), multi.insert((a, t)));
                    }
                    Op::RemoveMulti(a, t) => {
                        prop_assert_eq!(inv.remove_multi_nft(addr(a), t), multi.remove(&(a, t)));
                    }
                }

                prop_assert_eq!(inv.unique_nfts().assets().len(), inv.unique_nfts().token_ids().len());
                prop_assert_eq!(inv.multi_nfts().assets().len(), inv.multi_nfts().token_ids().len());

                let distinct: HashSet<_> = inv.fungible().iter().collect();
                prop_assert_eq!(distinct.len(), inv.fungible().len());
                prop_assert_eq!(inv.fungible().len(), fungible.len());

                let pairs: HashSet<_> = inv.multi_nfts().iter().collect();
                prop_assert_eq!(pairs.len(), inv.multi_nfts().len());
                prop_assert_eq!(inv.multi_nfts().len(), multi.len());
            }
        }
    }
}
