//! Depeg detection for the stable unit.
//!
//! The engine asks before accepting deposits (threshold: its emergency
//! threshold), the treasury asks before an emergency intervention
//! (threshold: its depeg threshold). Both go through [`DepegSignal`].

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::oracle::price_feed::PriceOracle;
use crate::utils::constants::{MAX_PRICE_STALENESS_SECS, WAD};
use crate::utils::crypto::Address;
use crate::utils::math::{deviation_bps, pow10, safe_mul_div};

/// Outcome of a depeg check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DepegStatus {
    /// Deviation exceeded the threshold
    pub depegged: bool,
    /// Observed deviation from the peg in basis points
    pub deviation_bps: u128,
}

impl DepegStatus {
    /// Classify a deviation against a threshold
    pub fn from_deviation(deviation_bps: u128, threshold_bps: u128) -> Self {
        Self {
            depegged: deviation_bps > threshold_bps,
            deviation_bps,
        }
    }
}

/// Answers "is the stable unit off its peg by more than `threshold_bps`"
pub trait DepegSignal {
    /// Evaluate the peg at `now`
    fn check(&self, oracle: &dyn PriceOracle, now: u64, threshold_bps: u128) -> Result<DepegStatus>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// PEG PRICE MONITOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Reads the stable unit's market price from a feed and compares it with the peg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PegPriceMonitor {
    /// Feed quoting the stable unit in USD
    pub feed: Address,
    /// Peg in 18-decimal USD (1e18 = $1)
    pub target_price: u128,
    /// Maximum age of the market quote
    pub max_age: u64,
}

impl PegPriceMonitor {
    /// Monitor a $1 peg on `feed`
    pub fn new(feed: Address) -> Self {
        Self {
            feed,
            target_price: WAD,
            max_age: MAX_PRICE_STALENESS_SECS,
        }
    }

    /// Override the maximum quote age
    pub fn with_max_age(mut self, max_age: u64) -> Self {
        self.max_age = max_age;
        self
    }
}

impl DepegSignal for PegPriceMonitor {
    fn check(&self, oracle: &dyn PriceOracle, now: u64, threshold_bps: u128) -> Result<DepegStatus> {
        let quote = oracle.fresh_price(&self.feed, now, self.max_age)?;
        let price_wad = safe_mul_div(quote.price, WAD, pow10(quote.decimals)?)?;
        let deviation = deviation_bps(price_wad, self.target_price)?;

        let status = DepegStatus::from_deviation(deviation, threshold_bps);
        if status.depegged {
            tracing::warn!(deviation_bps = deviation, threshold_bps, "stable unit off peg");
        }
        Ok(status)
    }
}

/// Depeg signal with an operator-set deviation; for hosts without a market feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FixedDepegSignal {
    /// Reported deviation in basis points
    pub deviation_bps: u128,
}

impl FixedDepegSignal {
    /// Signal reporting `deviation_bps`
    pub fn new(deviation_bps: u128) -> Self {
        Self { deviation_bps }
    }
}

impl DepegSignal for FixedDepegSignal {
    fn check(&self, _oracle: &dyn PriceOracle, _now: u64, threshold_bps: u128) -> Result<DepegStatus> {
        Ok(DepegStatus::from_deviation(self.deviation_bps, threshold_bps))
    }
}
