//! Input validation utilities.
//!
//! These run before any state mutation so that a rejected call leaves no trace.

use crate::error::{Error, Result};
use crate::utils::constants::BPS_DIVISOR;
use crate::utils::crypto::Address;

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNT VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate that an amount is non-zero
pub fn validate_non_zero(amount: u128) -> Result<()> {
    if amount == 0 {
        return Err(Error::ZeroAmount);
    }
    Ok(())
}

/// Validate that an address is not the zero address
pub fn validate_address(address: &Address, name: &str) -> Result<()> {
    if address.is_zero() {
        return Err(Error::ZeroAddress(name.into()));
    }
    Ok(())
}

/// Validate a fraction expressed in basis points (at most 100%)
pub fn validate_bps(value: u128, name: &str) -> Result<()> {
    validate_bps_max(value, BPS_DIVISOR, name)
}

/// Validate a basis-point value against an explicit ceiling
pub fn validate_bps_max(value: u128, max: u128, name: &str) -> Result<()> {
    if value > max {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("{} bps exceeds maximum {} bps", value, max),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate that an oracle price is strictly positive
pub fn validate_price(price: i128) -> Result<u128> {
    if price <= 0 {
        return Err(Error::InvalidPrice(price));
    }
    Ok(price as u128)
}

/// Validate price timestamp is neither stale nor in the future
pub fn validate_price_freshness(updated_at: u64, now: u64, max_age: u64) -> Result<()> {
    if updated_at > now {
        return Err(Error::PriceFromFuture { updated_at, now });
    }

    let age = now - updated_at;
    if age > max_age {
        return Err(Error::StalePrice { age, max_age });
    }

    Ok(())
}
