// Copyright (c) 2026 Keel Contributors. MIT License.
// See LICENSE for details.

//! # Keel Protocol: Shared Primitives
//!
//! Everything a Keel vault and its collaborators agree on, without the vault
//! itself:
//!
//! - **config**: Fixed-point scales, class tags, versioning constants.
//! - **types**: Addresses, asset classes, the batch call surface, snapshots.
//! - **math**: Checked fixed-point arithmetic and the health test.
//! - **interfaces**: Traits for the ledger, registry, margin protocol, and
//!   liquidator the vault delegates to.
//! - **memory**: In-memory implementations of those traits.
//!
//! ## Design Philosophy
//!
//! 1. Integers only. Ratios are scaled by 100; nothing is ever a float.
//! 2. Overflow is an error, detected before it happens.
//! 3. Collaborators are traits; the vault never knows who prices its assets.

pub mod config;
pub mod interfaces;
pub mod math;
pub mod memory;
pub mod types;

pub use interfaces::{
    AssetLedger, AuctionRequest, CollateralValuation, ExternalError, Liquidator, MarginHandshake,
    MarginProtocol, Registry,
};
pub use math::ArithmeticError;
pub use types::{
    Address, AssetAction, AssetBatch, AssetClass, AssetSnapshot, BatchError, CurrencyId, TokenId,
    VaultVersion,
};
