//! Protocol constants and magic numbers.
//!
//! All protocol-wide constants are defined here for easy auditing and modification.

// ═══════════════════════════════════════════════════════════════════════════════
// UNIT CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Stable unit decimals
pub const STABLE_DECIMALS: u8 = 18;

/// One whole stable unit (10^18 base units)
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Basis points divisor (10000 = 100%)
pub const BPS_DIVISOR: u128 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERALIZATION CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Minimum collateralization ratio - 150% (15000 bps)
pub const MIN_COLLATERAL_RATIO_BPS: u128 = 15_000;

// ═══════════════════════════════════════════════════════════════════════════════
// SUPPLY CONTROLLER CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Single-mint circuit breaker - 10% of current supply
pub const CIRCUIT_BREAKER_THRESHOLD_BPS: u128 = 1_000;

/// Default supply cap - one billion stable units
pub const DEFAULT_SUPPLY_CAP: u128 = 1_000_000_000 * WAD;

/// Default mint allowance per rate-limit period - 100,000 stable units
pub const DEFAULT_RATE_LIMIT: u128 = 100_000 * WAD;

/// Default rate-limit period - 1 hour
pub const DEFAULT_RATE_LIMIT_PERIOD_SECS: u64 = 3600;

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default share of strategy yield routed to the treasury - 70%
pub const DEFAULT_TREASURY_YIELD_BPS: u128 = 7_000;

/// Default peg deviation tolerated before deposits are suspended - 10%
pub const DEFAULT_EMERGENCY_THRESHOLD_BPS: u128 = 1_000;

// ═══════════════════════════════════════════════════════════════════════════════
// TREASURY CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default emergency reserve earmark - 20% of reserves
pub const DEFAULT_EMERGENCY_RESERVE_BPS: u128 = 2_000;

/// Default minimum reserve ratio - 110% of outstanding supply
pub const DEFAULT_MIN_RESERVE_RATIO_BPS: u128 = 11_000;

/// Upper bound accepted for the minimum reserve ratio - 500%
pub const MAX_MIN_RESERVE_RATIO_BPS: u128 = 50_000;

/// Default depeg threshold for treasury interventions - 5%
pub const DEFAULT_DEPEG_THRESHOLD_BPS: u128 = 500;

/// Largest depeg threshold the treasury accepts - 10%
pub const MAX_DEPEG_THRESHOLD_BPS: u128 = 1_000;

/// Default single-withdrawal cap before the timelock applies - 10% of reserves
pub const DEFAULT_MAX_SINGLE_WITHDRAWAL_BPS: u128 = 1_000;

/// Default timelock for large withdrawals - 2 days
pub const DEFAULT_TIMELOCK_SECS: u64 = 2 * 24 * 3600;

/// Default minimum time between depeg interventions - 1 day
pub const DEFAULT_MIN_INTERVENTION_INTERVAL_SECS: u64 = 24 * 3600;

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum price staleness in seconds (1 hour)
pub const MAX_PRICE_STALENESS_SECS: u64 = 3600;

/// Largest decimals value accepted from a feed
pub const MAX_PRICE_DECIMALS: u8 = 36;

// ═══════════════════════════════════════════════════════════════════════════════
// CRYPTOGRAPHIC CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Length of an account or asset address in bytes
pub const ADDRESS_LENGTH: usize = 20;

/// Length of a hash in bytes (SHA256)
pub const HASH_LENGTH: usize = 32;
