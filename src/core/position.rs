//! Collateral positions and per-asset collateral configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::utils::crypto::{Address, Hash};
use crate::utils::math::{safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL ASSET CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Parameters supplied when registering a collateral asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetParams {
    /// Smallest accepted single deposit
    pub min_deposit: u128,
    /// Largest accepted single deposit
    pub max_deposit: u128,
    /// Liquidation threshold in bps (recorded, not enforced)
    pub liquidation_threshold_bps: u128,
    /// Stability fee in bps (recorded, not charged)
    pub stability_fee_bps: u128,
    /// Oracle feed pricing the asset
    pub price_feed: Address,
}

/// A supported deposit asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralAssetConfig {
    /// Always true once registered
    pub supported: bool,
    /// Smallest accepted single deposit
    pub min_deposit: u128,
    /// Largest accepted single deposit
    pub max_deposit: u128,
    /// Liquidation threshold in bps
    pub liquidation_threshold_bps: u128,
    /// Stability fee in bps
    pub stability_fee_bps: u128,
    /// Oracle feed pricing the asset
    pub price_feed: Address,
}

impl From<AssetParams> for CollateralAssetConfig {
    fn from(params: AssetParams) -> Self {
        Self {
            supported: true,
            min_deposit: params.min_deposit,
            max_deposit: params.max_deposit,
            liquidation_threshold_bps: params.liquidation_threshold_bps,
            stability_fee_bps: params.stability_fee_bps,
            price_feed: params.price_feed,
        }
    }
}

impl CollateralAssetConfig {
    /// Check `amount` against the deposit bounds
    pub fn check_bounds(&self, amount: u128) -> Result<()> {
        if amount < self.min_deposit || amount > self.max_deposit {
            return Err(Error::DepositOutOfBounds {
                amount,
                min: self.min_deposit,
                max: self.max_deposit,
            });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION
// ═══════════════════════════════════════════════════════════════════════════════

/// A user's deposited collateral and the stable units issued against it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Cumulative asset amount deposited, net of withdrawals
    pub total_deposited: u128,
    /// Stable units outstanding against this position
    pub stable_minted: u128,
    /// Timestamp of the last mutation
    pub last_update_time: u64,
    /// Deposited amount per held asset; entries are removed at zero
    collateral: BTreeMap<Address, u128>,
}

impl Position {
    /// Deposited amount of `asset`
    pub fn collateral(&self, asset: &Address) -> u128 {
        self.collateral.get(asset).copied().unwrap_or(0)
    }

    /// Assets with a nonzero deposit
    pub fn held_assets(&self) -> impl Iterator<Item = (&Address, &u128)> {
        self.collateral.iter()
    }

    /// Whether the position holds `asset`
    pub fn holds(&self, asset: &Address) -> bool {
        self.collateral.contains_key(asset)
    }

    /// No collateral and no debt
    pub fn is_empty(&self) -> bool {
        self.collateral.is_empty() && self.stable_minted == 0
    }

    /// Record a deposit and the stable units issued for it
    pub fn credit(&mut self, asset: Address, amount: u128, stable: u128, now: u64) -> Result<()> {
        let held = safe_add(self.collateral(&asset), amount)?;
        self.total_deposited = safe_add(self.total_deposited, amount)?;
        self.stable_minted = safe_add(self.stable_minted, stable)?;
        self.collateral.insert(asset, held);
        self.last_update_time = now;
        Ok(())
    }

    /// Record a withdrawal of `amount` of `asset` against `stable` burned
    pub fn debit(&mut self, asset: &Address, amount: u128, stable: u128, now: u64) -> Result<()> {
        let held = safe_sub(self.collateral(asset), amount)?;
        self.stable_minted = safe_sub(self.stable_minted, stable)?;
        self.total_deposited = self.total_deposited.saturating_sub(amount);
        if held == 0 {
            self.collateral.remove(asset);
        } else {
            self.collateral.insert(*asset, held);
        }
        self.last_update_time = now;
        Ok(())
    }

    /// Deterministic hash of the position
    pub fn hash(&self, owner: &Address) -> Hash {
        let mut data = Vec::new();
        data.extend_from_slice(owner.as_bytes());
        data.extend_from_slice(&self.total_deposited.to_be_bytes());
        data.extend_from_slice(&self.stable_minted.to_be_bytes());
        data.extend_from_slice(&self.last_update_time.to_be_bytes());
        for (asset, amount) in &self.collateral {
            data.extend_from_slice(asset.as_bytes());
            data.extend_from_slice(&amount.to_be_bytes());
        }
        Hash::sha256(&data)
    }
}
