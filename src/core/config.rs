//! Protocol configuration and parameters.
//!
//! Parameters are grouped per component:
//! - Supply: cap and mint rate limit of the stable unit
//! - Engine: yield routing and the deposit depeg guard
//! - Treasury: reserve policy, timelock and intervention pacing
//! - Oracle: quote freshness
//!
//! Defaults are the reference deployment values. A configuration can be
//! persisted as pretty-printed JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::utils::constants::*;

/// Environment variable naming a JSON configuration file
pub const CONFIG_PATH_ENV: &str = "SYNTHUSD_CONFIG";

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENT PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Token Supply Controller parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyParams {
    /// Maximum total supply
    pub supply_cap: u128,
    /// Maximum minted per rate-limit period
    pub rate_limit: u128,
    /// Length of a rate-limit period in seconds
    pub rate_limit_period_secs: u64,
}

impl Default for SupplyParams {
    fn default() -> Self {
        Self {
            supply_cap: DEFAULT_SUPPLY_CAP,
            rate_limit: DEFAULT_RATE_LIMIT,
            rate_limit_period_secs: DEFAULT_RATE_LIMIT_PERIOD_SECS,
        }
    }
}

/// Collateral Engine parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineParams {
    /// Share of strategy yield routed to the treasury
    pub treasury_yield_bps: u128,
    /// Peg deviation above which deposits are refused
    pub emergency_threshold_bps: u128,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            treasury_yield_bps: DEFAULT_TREASURY_YIELD_BPS,
            emergency_threshold_bps: DEFAULT_EMERGENCY_THRESHOLD_BPS,
        }
    }
}

/// Treasury Reserve Manager parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryParams {
    /// Portion of reserves held back for emergencies
    pub emergency_reserve_bps: u128,
    /// Minimum reserves-to-supply ratio after a withdrawal
    pub min_reserve_ratio_bps: u128,
    /// Peg deviation that permits an intervention
    pub depeg_threshold_bps: u128,
    /// Largest withdrawal, as a share of reserves, that skips the timelock
    pub max_single_withdrawal_bps: u128,
    /// Timelock delay for large withdrawals
    pub timelock_secs: u64,
    /// Minimum spacing between depeg interventions
    pub min_intervention_interval_secs: u64,
}

impl Default for TreasuryParams {
    fn default() -> Self {
        Self {
            emergency_reserve_bps: DEFAULT_EMERGENCY_RESERVE_BPS,
            min_reserve_ratio_bps: DEFAULT_MIN_RESERVE_RATIO_BPS,
            depeg_threshold_bps: DEFAULT_DEPEG_THRESHOLD_BPS,
            max_single_withdrawal_bps: DEFAULT_MAX_SINGLE_WITHDRAWAL_BPS,
            timelock_secs: DEFAULT_TIMELOCK_SECS,
            min_intervention_interval_secs: DEFAULT_MIN_INTERVENTION_INTERVAL_SECS,
        }
    }
}

/// Oracle parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleParams {
    /// Maximum quote age in seconds
    pub max_price_age_secs: u64,
}

impl Default for OracleParams {
    fn default() -> Self {
        Self {
            max_price_age_secs: MAX_PRICE_STALENESS_SECS,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Complete protocol configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Supply controller
    #[serde(default)]
    pub supply: SupplyParams,
    /// Collateral engine
    #[serde(default)]
    pub engine: EngineParams,
    /// Treasury
    #[serde(default)]
    pub treasury: TreasuryParams,
    /// Oracle
    #[serde(default)]
    pub oracle: OracleParams,
}

impl ProtocolConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        let config: Self =
            serde_json::from_str(&content).map_err(|e| Error::Deserialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content =
            serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("{}: {}", parent.display(), e)))?;
        }

        std::fs::write(path, content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from the file named by `SYNTHUSD_CONFIG`, or fall back to defaults
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(path),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Reject inconsistent values
    pub fn validate(&self) -> Result<()> {
        let supply = &self.supply;
        if supply.supply_cap == 0 {
            return Err(invalid("supply.supply_cap", "must be positive"));
        }
        if supply.rate_limit_period_secs == 0 {
            return Err(invalid("supply.rate_limit_period_secs", "must be positive"));
        }

        check_bps("engine.treasury_yield_bps", self.engine.treasury_yield_bps, BPS_DIVISOR)?;
        check_bps(
            "engine.emergency_threshold_bps",
            self.engine.emergency_threshold_bps,
            BPS_DIVISOR,
        )?;

        let treasury = &self.treasury;
        check_bps(
            "treasury.emergency_reserve_bps",
            treasury.emergency_reserve_bps,
            BPS_DIVISOR,
        )?;
        check_bps(
            "treasury.min_reserve_ratio_bps",
            treasury.min_reserve_ratio_bps,
            MAX_MIN_RESERVE_RATIO_BPS,
        )?;
        check_bps(
            "treasury.depeg_threshold_bps",
            treasury.depeg_threshold_bps,
            MAX_DEPEG_THRESHOLD_BPS,
        )?;
        check_bps(
            "treasury.max_single_withdrawal_bps",
            treasury.max_single_withdrawal_bps,
            BPS_DIVISOR,
        )?;

        if self.oracle.max_price_age_secs == 0 {
            return Err(invalid("oracle.max_price_age_secs", "must be positive"));
        }

        Ok(())
    }
}

fn invalid(name: &str, reason: &str) -> Error {
    Error::Config(format!("{}: {}", name, reason))
}

fn check_bps(name: &str, value: u128, max: u128) -> Result<()> {
    if value > max {
        return Err(invalid(name, &format!("{} exceeds {}", value, max)));
    }
    Ok(())
}
