//! # Access Gate
//!
//! Role-based capability sets. Each mutating vault entry point names the
//! role it needs and asks the gate; there are no identity comparisons
//! scattered through the vault.
//!
//! | Role          | Held by                        | Guards                                  |
//! |---------------|--------------------------------|-----------------------------------------|
//! | `Owner`       | the vault owner (exactly one)  | deposit, withdraw, margin account, base currency |
//! | `Factory`     | the creating factory           | ownership transfer, upgrades, liquidation |
//! | `MarginCaller`| the bound margin protocol      | margin increase / decrease              |

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use keel_protocol::Address;

use crate::error::VaultError;

/// A capability a principal can hold on a vault.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Owner,
    Factory,
    MarginCaller,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Owner => write!(f, "owner"),
            Role::Factory => write!(f, "factory"),
            Role::MarginCaller => write!(f, "margin caller"),
        }
    }
}

/// The set of (role, principal) grants on one vault.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGate {
    grants: BTreeMap<Role, BTreeSet<Address>>,
}

impl AccessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `role` to `principal`. Returns `false` if it was already held.
    pub fn grant(&mut self, role: Role, principal: Address) -> bool {
        self.grants.entry(role).or_default().insert(principal)
    }

    /// Revokes `role` from `principal`. Returns `false` if it was not held.
    pub fn revoke(&mut self, role: Role, principal: Address) -> bool {
        let Some(holders) = self.grants.get_mut(&role) else {
            return false;
        };
        let removed = holders.remove(&principal);
        if holders.is_empty() {
            self.grants.remove(&role);
        }
        removed
    }

    /// Makes `principal` the only holder of `role`.
    pub fn replace(&mut self, role: Role, principal: Address) {
        self.grants.insert(role, BTreeSet::from([principal]));
    }

    pub fn has(&self, role: Role, principal: Address) -> bool {
        self.grants
            .get(&role)
            .is_some_and(|holders| holders.contains(&principal))
    }

    /// Fails with [`VaultError::Unauthorized`] unless `caller` holds `role`.
    pub fn require(&self, role: Role, caller: Address) -> Result<(), VaultError> {
        if self.has(role, caller) {
            Ok(())
        } else {
            Err(VaultError::Unauthorized { caller, role })
        }
    }

    /// The holder of a single-holder role (owner, factory).
    pub fn sole(&self, role: Role) -> Option<Address> {
        let holders = self.grants.get(&role)?;
        if holders.len() == 1 {
            holders.iter().next().copied()
        } else {
            None
        }
    }

    pub fn holders(&self, role: Role) -> impl Iterator<Item = Address> + '_ {
        self.grants.get(&role).into_iter().flatten().copied()
    }
}
