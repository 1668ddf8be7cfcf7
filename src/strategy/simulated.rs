//! In-process yield strategy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::strategy::YieldStrategy;
use crate::utils::constants::BPS_DIVISOR;
use crate::utils::crypto::Address;
use crate::utils::math::{bps_of, safe_add, safe_sub};

/// Reference yield: 5% of each deposit
pub const DEFAULT_SIMULATED_YIELD_BPS: u128 = 500;

/// Strategy that books principal in memory and reports a fixed yield
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedStrategy {
    /// Cumulative principal placed per asset; withdrawals draw on
    /// `total_value` and leave this untouched
    placed: BTreeMap<Address, u128>,
    /// Value currently held
    total_value: u128,
    /// Yield reported per deposit, in bps of the amount
    yield_bps: u128,
    /// Loss applied to every withdrawal, in bps of the amount
    haircut_bps: u128,
    /// Cumulative amounts released per recipient
    released: BTreeMap<Address, u128>,
    /// Set once the position has been unwound
    closed: bool,
}

impl SimulatedStrategy {
    /// Strategy with the reference yield and no haircut
    pub fn new() -> Self {
        Self::with_yield(DEFAULT_SIMULATED_YIELD_BPS)
    }

    /// Strategy reporting `yield_bps` per deposit
    pub fn with_yield(yield_bps: u128) -> Self {
        Self {
            yield_bps,
            ..Self::default()
        }
    }

    /// Apply a haircut to every withdrawal
    pub fn with_haircut(mut self, haircut_bps: u128) -> Self {
        self.haircut_bps = haircut_bps.min(BPS_DIVISOR);
        self
    }

    /// Cumulative principal ever placed for `asset`.
    ///
    /// Withdrawals are not attributed to an asset, so this never decreases;
    /// use [`YieldStrategy::position_value`] for what is currently held.
    pub fn total_placed(&self, asset: &Address) -> u128 {
        self.placed.get(asset).copied().unwrap_or(0)
    }

    /// Total released to `recipient`
    pub fn released_to(&self, recipient: &Address) -> u128 {
        self.released.get(recipient).copied().unwrap_or(0)
    }

    /// Whether `close_position` has run
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl YieldStrategy for SimulatedStrategy {
    fn deposit(&mut self, asset: &Address, amount: u128) -> Result<u128> {
        if self.closed {
            return Err(Error::Strategy("position closed".into()));
        }
        let entry = self.placed.entry(*asset).or_insert(0);
        *entry = safe_add(*entry, amount)?;
        self.total_value = safe_add(self.total_value, amount)?;
        bps_of(amount, self.yield_bps)
    }

    fn withdraw(&mut self, amount: u128, recipient: &Address) -> Result<u128> {
        if amount > self.total_value {
            return Err(Error::Strategy(format!(
                "withdrawal {} exceeds position value {}",
                amount, self.total_value
            )));
        }
        self.total_value = safe_sub(self.total_value, amount)?;

        let actual = safe_sub(amount, bps_of(amount, self.haircut_bps)?)?;
        let entry = self.released.entry(*recipient).or_insert(0);
        *entry = safe_add(*entry, actual)?;
        Ok(actual)
    }

    fn position_value(&self) -> u128 {
        self.total_value
    }

    fn close_position(&mut self) -> Result<u128> {
        let value = self.total_value;
        self.total_value = 0;
        self.closed = true;
        tracing::warn!(value, "strategy position closed");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::WAD;

    #[test]
    fn test_deposit_reports_yield() {
        let mut strategy = SimulatedStrategy::new();
        let weth = Address::derive("weth");

        let generated = strategy.deposit(&weth, 10 * WAD).unwrap();
        assert_eq!(generated, WAD / 2);
        assert_eq!(strategy.total_placed(&weth), 10 * WAD);
        assert_eq!(strategy.position_value(), 10 * WAD);
    }

    #[test]
    fn test_withdraw_with_haircut() {
        let mut strategy = SimulatedStrategy::new().with_haircut(100);
        let weth = Address::derive("weth");
        let alice = Address::derive("alice");

        strategy.deposit(&weth, 10 * WAD).unwrap();
        let actual = strategy.withdraw(WAD, &alice).unwrap();
        assert_eq!(actual, WAD * 99 / 100);
        assert_eq!(strategy.released_to(&alice), actual);
        assert_eq!(strategy.position_value(), 9 * WAD);
        assert_eq!(strategy.total_placed(&weth), 10 * WAD);

        strategy.deposit(&weth, WAD).unwrap();
        assert_eq!(strategy.total_placed(&weth), 11 * WAD);
        assert_eq!(strategy.position_value(), 10 * WAD);
    }

    #[test]
    fn test_withdraw_beyond_value_fails() {
        let mut strategy = SimulatedStrategy::new();
        let alice = Address::derive("alice");
        assert!(matches!(strategy.withdraw(1, &alice), Err(Error::Strategy(_))));
    }

    #[test]
    fn test_close_position() {
        let mut strategy = SimulatedStrategy::new();
        let weth = Address::derive("weth");
        strategy.deposit(&weth, 5 * WAD).unwrap();

        assert_eq!(strategy.close_position().unwrap(), 5 * WAD);
        assert_eq!(strategy.position_value(), 0);
        assert!(strategy.deposit(&weth, WAD).is_err());
    }
}
