//! # Recording Liquidator
//!
//! Accepts (or declines) auctions and keeps every request it was sent, in
//! order, so callers can inspect exactly what a vault handed off.

use parking_lot::RwLock;

use crate::interfaces::{AuctionRequest, ExternalError, Liquidator};
use crate::types::Address;

pub struct RecordingLiquidator {
    address: Address,
    accepting: RwLock<bool>,
    auctions: RwLock<Vec<AuctionRequest>>,
}

impl RecordingLiquidator {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            accepting: RwLock::new(true),
            auctions: RwLock::new(Vec::new()),
        }
    }

    /// When `false`, [`start_auction`](Liquidator::start_auction) reports failure.
    pub fn set_accepting(&self, accepting: bool) {
        *self.accepting.write() = accepting;
    }

    /// Every auction started so far.
    pub fn auctions(&self) -> Vec<AuctionRequest> {
        self.auctions.read().clone()
    }
}

impl Liquidator for RecordingLiquidator {
    fn address(&self) -> Address {
        self.address
    }

    fn start_auction(&self, request: &AuctionRequest) -> Result<bool, ExternalError> {
        if !*self.accepting.read() {
            return Ok(false);
        }
        self.auctions.write().push(*request);
        Ok(true)
    }
}
