//! Checked integer arithmetic for collateral and reserve accounting.
//!
//! All amounts are `u128` base units. Every helper either returns an exact
//! result or an [`Error::Overflow`]/[`Error::Underflow`]; nothing wraps.
//! Divisions truncate toward zero, so rounding always favours the protocol.

use crate::error::{Error, Result};
use crate::utils::constants::{BPS_DIVISOR, MAX_PRICE_DECIMALS, MIN_COLLATERAL_RATIO_BPS};

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or(Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: u128, b: u128) -> Result<u128> {
    a.checked_mul(b).ok_or(Error::Overflow {
        operation: format!("{} * {}", a, b),
    })
}

/// Safe division with zero check
pub fn safe_div(a: u128, b: u128) -> Result<u128> {
    if b == 0 {
        return Err(Error::InvalidParameter {
            name: "divisor".into(),
            reason: "division by zero".into(),
        });
    }
    Ok(a / b)
}

/// Computes `(a * b) / c`, truncating
pub fn safe_mul_div(a: u128, b: u128, c: u128) -> Result<u128> {
    if c == 0 {
        return Err(Error::InvalidParameter {
            name: "divisor".into(),
            reason: "division by zero".into(),
        });
    }
    let product = a.checked_mul(b).ok_or_else(|| Error::Overflow {
        operation: format!("({} * {}) / {}", a, b, c),
    })?;
    Ok(product / c)
}

/// `10^decimals` for a feed's decimals
pub fn pow10(decimals: u8) -> Result<u128> {
    if decimals > MAX_PRICE_DECIMALS {
        return Err(Error::InvalidParameter {
            name: "decimals".into(),
            reason: format!("{} exceeds maximum {}", decimals, MAX_PRICE_DECIMALS),
        });
    }
    Ok(10u128.pow(decimals as u32))
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE CONVERSIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// USD value of an asset amount: `amount * price / 10^decimals`
pub fn usd_value(amount: u128, price: u128, decimals: u8) -> Result<u128> {
    if amount == 0 {
        return Ok(0);
    }
    safe_mul_div(amount, price, pow10(decimals)?)
}

/// Asset amount worth a USD value: `usd * 10^decimals / price`
pub fn asset_amount(usd: u128, price: u128, decimals: u8) -> Result<u128> {
    if price == 0 {
        return Err(Error::InvalidPrice(0));
    }
    safe_mul_div(usd, pow10(decimals)?, price)
}

// ═══════════════════════════════════════════════════════════════════════════════
// RATIO CALCULATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Portion of `amount` given by `bps`
pub fn bps_of(amount: u128, bps: u128) -> Result<u128> {
    safe_mul_div(amount, bps, BPS_DIVISOR)
}

/// `numerator / denominator` in basis points; `u128::MAX` when the
/// denominator is zero (nothing to cover)
pub fn ratio_bps(numerator: u128, denominator: u128) -> Result<u128> {
    if denominator == 0 {
        return Ok(u128::MAX);
    }
    safe_mul_div(numerator, BPS_DIVISOR, denominator)
}

/// Stable units issued against a USD value at the minimum collateral ratio
pub fn stable_for_collateral(usd: u128) -> Result<u128> {
    safe_mul_div(usd, BPS_DIVISOR, MIN_COLLATERAL_RATIO_BPS)
}

/// USD value released when burning stable units at the minimum collateral ratio
pub fn collateral_for_stable(stable: u128) -> Result<u128> {
    safe_mul_div(stable, MIN_COLLATERAL_RATIO_BPS, BPS_DIVISOR)
}

/// Deviation of `value` from `target` in basis points
pub fn deviation_bps(value: u128, target: u128) -> Result<u128> {
    if target == 0 {
        return Err(Error::InvalidParameter {
            name: "target".into(),
            reason: "cannot be zero".into(),
        });
    }
    let diff = value.abs_diff(target);
    safe_mul_div(diff, BPS_DIVISOR, target)
}
