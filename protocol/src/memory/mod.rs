//! # In-Memory Collaborators
//!
//! Reference implementations of every collaborator trait in
//! [`crate::interfaces`], backed by hash maps behind `parking_lot` locks.
//! The simulator binary drives vaults with them, and so do the tests.
//!
//! ```text
//! ledger.rs       balances for all three asset classes, transfer hooks
//! registry.rs     static prices, haircuts, thresholds, currencies
//! margin.rs       margin protocol with hand-set open positions
//! liquidator.rs   liquidator that records auction requests
//! ```

pub mod ledger;
pub mod liquidator;
pub mod margin;
pub mod registry;

pub use ledger::{InMemoryLedger, TransferEvent, TransferHook};
pub use liquidator::RecordingLiquidator;
pub use margin::InMemoryMarginProtocol;
pub use registry::{AssetRisk, CurrencyInfo, PriceRegistry};
