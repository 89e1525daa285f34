//! Reentrancy and concurrency tests.
//!
//! Asset transfers run arbitrary hook code, so the vault must behave when
//! that code calls back into it: reads on the writing thread see the
//! bookkeeping of the step in flight, reads on other threads see only
//! committed state, and writes are refused.

mod common;

use parking_lot::Mutex;
use std::sync::Arc;

use common::*;
use keel_contracts::{AssetInventory, VaultError};
use keel_protocol::memory::TransferEvent;
use keel_protocol::{AssetBatch, AssetLedger};

#[test]
fn nft_withdrawal_publishes_removal_before_transfer() {
    let desk = Desk::new();
    desk.vault
        .deposit(
            addr(OWNER),
            &AssetBatch::new()
                .unique_nft(addr(PUNK), 1)
                .fungible(addr(TOKEN), 100),
        )
        .unwrap();

    let observed = Arc::new(Mutex::new(Vec::new()));
    let seen = observed.clone();
    let weak = Arc::downgrade(&desk.vault);
    desk.ledger.set_transfer_hook(
        addr(PUNK),
        Arc::new(move |event: &TransferEvent| {
            if let Some(vault) = weak.upgrade() {
                let still_recorded = vault
                    .inventory()
                    .unique_nfts()
                    .contains(event.asset, event.token_id);
                let reentry = vault
                    .deposit(addr(OWNER), &AssetBatch::new().fungible(addr(TOKEN), 1));
                seen.lock().push((still_recorded, reentry));
            }
        }),
    );

    desk.vault
        .withdraw(addr(OWNER), &AssetBatch::new().unique_nft(addr(PUNK), 1))
        .unwrap();

    let observed = observed.lock();
    assert_eq!(observed.len(), 1);
    assert!(!observed[0].0);
    assert_eq!(observed[0].1, Err(VaultError::Reentrancy));

    assert_eq!(desk.ledger.owner_of(addr(PUNK), 1), Some(addr(OWNER)));
    assert_eq!(
        desk.ledger.fungible_balance(addr(TOKEN), addr(VAULT)).unwrap(),
        100
    );
}

#[test]
fn other_threads_never_see_an_operation_that_rolls_back() {
    let desk = Desk::new();

    let observed = Arc::new(Mutex::new(Vec::new()));
    let seen = observed.clone();
    let weak = Arc::downgrade(&desk.vault);
    desk.ledger.set_transfer_hook(
        addr(PUNK),
        Arc::new(move |_: &TransferEvent| {
            if let Some(vault) = weak.upgrade() {
                let own_view = vault.inventory();
                let outside = {
                    let vault = vault.clone();
                    std::thread::spawn(move || (vault.inventory(), vault.vault_value(addr(USD))))
                        .join()
                        .unwrap()
                };
                seen.lock().push((own_view, outside));
            }
        }),
    );

    // PUNK #99 was never minted, so the batch fails after TOKEN moved in.
    let batch = AssetBatch::new()
        .fungible(addr(TOKEN), 100)
        .unique_nft(addr(PUNK), 99);
    assert!(desk.vault.deposit(addr(OWNER), &batch).is_err());

    {
        let observed = observed.lock();
        assert_eq!(observed.len(), 1);
        let (own_view, (outside_inventory, outside_value)) = &observed[0];
        assert_eq!(own_view.fungible(), &[addr(TOKEN)]);
        assert_eq!(outside_inventory, &AssetInventory::new());
        assert_eq!(outside_value, &Ok(0));
    }
    assert!(desk.vault.inventory().is_empty());
    assert_eq!(
        desk.ledger.fungible_balance(addr(TOKEN), addr(VAULT)).unwrap(),
        0
    );

    desk.ledger.clear_transfer_hook(addr(PUNK));
    desk.vault
        .deposit(addr(OWNER), &AssetBatch::new().unique_nft(addr(PUNK), 1))
        .unwrap();
    let vault = desk.vault.clone();
    let committed = std::thread::spawn(move || vault.vault_value(addr(USD)))
        .join()
        .unwrap();
    assert_eq!(committed, Ok(500));
    assert_eq!(observed.lock().len(), 1);
}

#[test]
fn gate_is_released_after_a_failed_operation() {
    let desk = Desk::new();
    desk.ledger.freeze(addr(TOKEN));
    assert!(desk
        .vault
        .deposit(addr(OWNER), &AssetBatch::new().fungible(addr(TOKEN), 1))
        .is_err());

    desk.ledger.thaw(addr(TOKEN));
    desk.vault
        .deposit(addr(OWNER), &AssetBatch::new().fungible(addr(TOKEN), 1))
        .unwrap();
}

#[test]
fn concurrent_deposits_are_serialized() {
    let desk = Desk::new();
    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..25 {
                    desk.vault
                        .deposit(addr(OWNER), &AssetBatch::new().fungible(addr(TOKEN), 10))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(
        desk.ledger.fungible_balance(addr(TOKEN), addr(VAULT)).unwrap(),
        2_000
    );
    assert_eq!(desk.vault.inventory().fungible(), &[addr(TOKEN)]);
}
