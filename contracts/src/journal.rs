//! # Transfer Journal
//!
//! Undo log for custody transfers made during one vault operation. A
//! failing operation restores the vault's own state from a snapshot, but
//! assets already moved on the ledger have to be moved back; the journal
//! remembers what moved and replays the inverse transfers newest-first.

use tracing::{debug, error};

use keel_protocol::{Address, AssetClass, AssetLedger, ExternalError, TokenId};

use crate::error::{Collaborator, ExternalResultExt, VaultError};

/// One custody movement on the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub asset: Address,
    pub class: AssetClass,
    pub from: Address,
    pub to: Address,
    pub token_id: TokenId,
    pub amount: u128,
}

impl Transfer {
    /// The same movement in the opposite direction.
    pub fn inverse(&self) -> Transfer {
        Transfer {
            from: self.to,
            to: self.from,
            ..*self
        }
    }

    fn execute(&self, ledger: &dyn AssetLedger) -> Result<(), ExternalError> {
        match self.class {
            AssetClass::Fungible => {
                ledger.transfer_fungible(self.asset, self.from, self.to, self.amount)
            }
            AssetClass::UniqueNft => {
                ledger.transfer_unique(self.asset, self.from, self.to, self.token_id)
            }
            AssetClass::MultiNft => ledger.transfer_multi(
                self.asset,
                self.from,
                self.to,
                self.token_id,
                self.amount,
            ),
        }
    }
}

/// Transfers completed so far in the current operation.
#[derive(Debug, Default)]
pub struct TransferJournal {
    completed: Vec<Transfer>,
}

impl TransferJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// Executes `transfer` and records it if it succeeded.
    pub fn execute(
        &mut self,
        ledger: &dyn AssetLedger,
        transfer: Transfer,
    ) -> Result<(), VaultError> {
        transfer.execute(ledger).via(Collaborator::Ledger)?;
        self.completed.push(transfer);
        Ok(())
    }

    /// Reverses every recorded transfer, newest first.
    ///
    /// Returns the number of compensations that failed. Failures are logged
    /// and do not stop the remaining compensations.
    pub fn unwind(self, ledger: &dyn AssetLedger) -> usize {
        let mut failures = 0;
        for transfer in self.completed.into_iter().rev() {
            let inverse = transfer.inverse();
            match inverse.execute(ledger) {
                Ok(()) => debug!(
                    asset = %inverse.asset,
                    class = %inverse.class,
                    token_id = inverse.token_id,
                    amount = inverse.amount,
                    "transfer compensated"
                ),
                Err(e) => {
                    failures += 1;
                    error!(
                        asset = %inverse.asset,
                        class = %inverse.class,
                        from = %inverse.from,
                        to = %inverse.to,
                        error = %e,
                        "failed to compensate transfer"
                    );
                }
            }
        }
        failures
    }
}
