//! Reserve assets held by the treasury.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::oracle::PriceOracle;
use crate::utils::crypto::Address;
use crate::utils::math::{ratio_bps, usd_value};

/// A supported reserve asset and its holdings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveAsset {
    /// Always true once registered
    pub supported: bool,
    /// Units held
    pub balance: u128,
    /// Desired share of total reserves in bps
    pub target_allocation_bps: u128,
    /// Share of total reserves at the last recomputation
    pub current_allocation_bps: u128,
    /// Time the target last changed
    pub last_rebalance_time: u64,
    /// Yield credited and not yet distributed
    pub accumulated_yield: u128,
    /// Drawn first during peg interventions
    pub is_stable: bool,
    /// Oracle feed pricing the asset
    pub price_feed: Address,
}

impl ReserveAsset {
    /// A newly registered asset with no holdings
    pub fn new(price_feed: Address, target_allocation_bps: u128, is_stable: bool, now: u64) -> Self {
        Self {
            supported: true,
            balance: 0,
            target_allocation_bps,
            current_allocation_bps: 0,
            last_rebalance_time: now,
            accumulated_yield: 0,
            is_stable,
            price_feed,
        }
    }

    /// USD value of `amount` units at a fresh quote; zero amounts need no quote
    pub fn value_of(
        &self,
        oracle: &dyn PriceOracle,
        amount: u128,
        now: u64,
        max_age: u64,
    ) -> Result<u128> {
        if amount == 0 {
            return Ok(0);
        }
        let quote = oracle.fresh_price(&self.price_feed, now, max_age)?;
        usd_value(amount, quote.price, quote.decimals)
    }

    /// USD value of the whole balance
    pub fn balance_value(&self, oracle: &dyn PriceOracle, now: u64, max_age: u64) -> Result<u128> {
        self.value_of(oracle, self.balance, now, max_age)
    }

    /// Recompute `current_allocation_bps` against `total_usd`
    pub fn update_allocation(&mut self, value_usd: u128, total_usd: u128) -> Result<()> {
        self.current_allocation_bps = if total_usd == 0 {
            0
        } else {
            ratio_bps(value_usd, total_usd)?
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::StaticPriceOracle;
    use crate::utils::constants::WAD;

    #[test]
    fn test_value_and_allocation() {
        let feed = Address::derive("eth-usd");
        let mut oracle = StaticPriceOracle::new();
        oracle.set_price(feed, 2000_0000_0000, 8, 100);

        let mut reserve = ReserveAsset::new(feed, 3000, false, 100);
        reserve.balance = 3 * WAD;

        let value = reserve.balance_value(&oracle, 100, 3600).unwrap();
        assert_eq!(value, 6000 * WAD);

        reserve.update_allocation(value, 12_000 * WAD).unwrap();
        assert_eq!(reserve.current_allocation_bps, 5000);

        reserve.update_allocation(value, 0).unwrap();
        assert_eq!(reserve.current_allocation_bps, 0);
    }

    #[test]
    fn test_zero_amount_needs_no_quote() {
        let oracle = StaticPriceOracle::new();
        let reserve = ReserveAsset::new(Address::derive("missing"), 0, true, 0);
        assert_eq!(reserve.balance_value(&oracle, 0, 3600).unwrap(), 0);
        assert!(reserve.value_of(&oracle, 1, 0, 3600).is_err());
    }
}
