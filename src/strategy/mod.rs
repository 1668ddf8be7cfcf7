//! Yield strategy adapters.
//!
//! The collateral engine parks deposits in an external yield strategy. The
//! strategy reports the yield a deposit generated and may release less than
//! requested on withdrawal.

pub mod simulated;

pub use simulated::*;

use crate::error::Result;
use crate::utils::crypto::Address;

/// External yield venue holding deposited collateral
pub trait YieldStrategy {
    /// Place `amount` of `asset`; returns the yield generated, in the same units
    fn deposit(&mut self, asset: &Address, amount: u128) -> Result<u128>;

    /// Release `amount` to `recipient`; returns the amount actually released
    fn withdraw(&mut self, amount: u128, recipient: &Address) -> Result<u128>;

    /// Current value held by the strategy
    fn position_value(&self) -> u128;

    /// Unwind everything; returns the value recovered
    fn close_position(&mut self) -> Result<u128>;
}
