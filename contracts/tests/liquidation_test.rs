//! Integration tests for the health test and the liquidation hand-off.

mod common;

use common::*;
use keel_contracts::{ErrorKind, VaultError};
use keel_protocol::AssetBatch;

/// A vault holding 100 TOKEN with the 40.00 threshold cached and zero used
/// margin.
fn leveraged_desk() -> Desk {
    let desk = Desk::new();
    desk.vault
        .deposit(addr(OWNER), &AssetBatch::new().fungible(addr(TOKEN), 100))
        .unwrap();
    desk.open_margin();
    assert!(desk
        .vault
        .increase_margin_position(addr(PROTOCOL), addr(USD), 100)
        .unwrap());
    assert_eq!(desk.vault.liquidation_threshold(), 4_000);
    desk
}

#[test]
fn healthy_vault_cannot_be_liquidated() {
    let desk = leveraged_desk();
    desk.set_used_margin(2);

    assert!(desk.vault.health().unwrap().is_healthy());
    let err = desk
        .vault
        .attempt_liquidation(addr(FACTORY), addr(KEEPER))
        .unwrap_err();
    assert_eq!(
        err,
        VaultError::Healthy { total_value: 100, used_margin: 2, liquidation_threshold: 4_000 }
    );
    assert_eq!(err.kind(), ErrorKind::Health);
    assert_eq!(desk.vault.life(), 0);
    assert!(desk.liquidator.auctions().is_empty());
}

#[test]
fn unhealthy_vault_goes_to_auction() {
    let desk = leveraged_desk();
    desk.set_used_margin(3);
    assert!(!desk.vault.health().unwrap().is_healthy());

    let liquidator = desk
        .vault
        .attempt_liquidation(addr(FACTORY), addr(KEEPER))
        .unwrap();
    assert_eq!(liquidator, addr(LIQUIDATOR));
    assert_eq!(desk.vault.life(), 1);

    let auctions = desk.liquidator.auctions();
    assert_eq!(auctions.len(), 1);
    let auction = &auctions[0];
    assert_eq!(auction.vault, addr(VAULT));
    assert_eq!(auction.life, 0);
    assert_eq!(auction.keeper, addr(KEEPER));
    assert_eq!(auction.owner, addr(OWNER));
    assert_eq!(auction.used_margin, 3);
    assert_eq!(auction.liquidation_threshold, 4_000);
    assert_eq!(auction.currency_id, 0);

    let history = desk.vault.liquidation_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].liquidator, addr(LIQUIDATOR));

    // Ownership moves in a separate factory call.
    assert_eq!(desk.vault.owner(), Some(addr(OWNER)));
    desk.vault
        .transfer_ownership(addr(FACTORY), liquidator)
        .unwrap();
    assert_eq!(desk.vault.owner(), Some(addr(LIQUIDATOR)));
}

#[test]
fn each_liquidation_is_its_own_epoch() {
    let desk = leveraged_desk();
    desk.set_used_margin(3);

    desk.vault
        .attempt_liquidation(addr(FACTORY), addr(KEEPER))
        .unwrap();
    desk.vault
        .attempt_liquidation(addr(FACTORY), addr(KEEPER))
        .unwrap();

    assert_eq!(desk.vault.life(), 2);
    let lives: Vec<_> = desk.liquidator.auctions().iter().map(|a| a.life).collect();
    assert_eq!(lives, vec![0, 1]);
}

#[test]
fn declined_auction_leaves_the_epoch_alone() {
    let desk = leveraged_desk();
    desk.set_used_margin(3);
    desk.liquidator.set_accepting(false);

    let err = desk
        .vault
        .attempt_liquidation(addr(FACTORY), addr(KEEPER))
        .unwrap_err();
    assert_eq!(err, VaultError::AuctionRefused(addr(LIQUIDATOR)));
    assert_eq!(err.kind(), ErrorKind::ExternalCall);
    assert_eq!(desk.vault.life(), 0);
    assert!(desk.vault.liquidation_history().is_empty());
}

#[test]
fn oversized_margin_is_an_arithmetic_error() {
    let desk = leveraged_desk();
    desk.set_used_margin(u128::from(u64::MAX) + 1);

    let err = desk
        .vault
        .attempt_liquidation(addr(FACTORY), addr(KEEPER))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Arithmetic);
    assert_eq!(desk.vault.life(), 0);
    assert!(desk.liquidator.auctions().is_empty());
}

#[test]
fn uncached_threshold_never_liquidates() {
    let desk = Desk::new();
    desk.vault
        .deposit(addr(OWNER), &AssetBatch::new().fungible(addr(TOKEN), 100))
        .unwrap();
    desk.open_margin();
    desk.set_used_margin(1_000);

    assert_eq!(desk.vault.liquidation_threshold(), 0);
    let err = desk
        .vault
        .attempt_liquidation(addr(FACTORY), addr(KEEPER))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Health);
}

#[test]
fn liquidation_needs_a_margin_account() {
    let desk = Desk::new();
    let err = desk
        .vault
        .attempt_liquidation(addr(FACTORY), addr(KEEPER))
        .unwrap_err();
    assert_eq!(err, VaultError::NoMarginAccount);
}
