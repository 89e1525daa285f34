//! # Keel Vault Contracts
//!
//! A multi-asset collateral vault. One owner deposits fungible tokens,
//! unique NFTs and multi-class NFTs; one margin protocol lends against the
//! bundle; a liquidator takes over when the bundle stops covering the debt.
//!
//! - **Inventory** ([`inventory`]) records what the vault holds per asset
//!   class. Amounts are never cached; they are read from the ledger.
//! - **Valuation** ([`valuation`]) asks the registry what the holdings are
//!   worth. The vault does no pricing itself.
//! - **Margin** ([`margin`]) binds the vault to a lending protocol and admits
//!   or rejects margin increases.
//! - **Liquidation** ([`liquidation`]) runs the health test and hands an
//!   unhealthy vault to its liquidator, advancing the vault's epoch.
//! - **Access** ([`access`]) maps every entry point to the role it needs.
//!
//! [`Vault`] ties these together and makes each operation atomic.
//!
//! ## Design Principles
//!
//! 1. Value arithmetic is checked. An overflow is an error, never a wrapped
//!    number or a silent verdict.
//! 2. Every operation is all-or-nothing, including asset transfers already
//!    made when a later step fails.
//! 3. No lock is held across a call into a collaborator.
//! 4. Every error carries a [`ErrorKind`] category.

pub mod access;
pub mod error;
pub mod inventory;
pub mod journal;
pub mod liquidation;
pub mod margin;
pub mod valuation;
pub mod vault;

pub use access::{AccessGate, Role};
pub use error::{Collaborator, ErrorKind, VaultError};
pub use inventory::{AssetInventory, TokenRecords};
pub use liquidation::{HealthReport, HealthStatus, LiquidationRecord, LiquidationTrigger};
pub use margin::MarginAccount;
pub use valuation::ValuationClient;
pub use vault::{Vault, VaultSummary};
