//! Price quotes and the oracle interface.
//!
//! A quote is read fresh for every operation that needs one and validated
//! before use:
//! - price must be strictly positive
//! - quote must not be older than the configured maximum age
//! - quote must not be timestamped in the future
//!
//! Nothing here caches a quote across operations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::utils::constants::MAX_PRICE_DECIMALS;
use crate::utils::crypto::Address;
use crate::utils::validation::{validate_price, validate_price_freshness};

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE QUOTE
// ═══════════════════════════════════════════════════════════════════════════════

/// A single oracle answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Raw answer; signed because feeds may report non-positive values
    pub price: i128,
    /// Decimal places of `price`
    pub decimals: u8,
    /// Unix timestamp of the last update
    pub updated_at: u64,
}

impl PriceQuote {
    /// Create a new quote
    pub fn new(price: i128, decimals: u8, updated_at: u64) -> Self {
        Self {
            price,
            decimals,
            updated_at,
        }
    }

    /// Age of the quote in seconds
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.updated_at)
    }

    /// Check if the quote is fresh
    pub fn is_fresh(&self, now: u64, max_age: u64) -> bool {
        self.updated_at <= now && self.age(now) <= max_age
    }

    /// Validate and return the usable price
    pub fn validate(&self, now: u64, max_age: u64) -> Result<ValidatedPrice> {
        let price = validate_price(self.price)?;
        validate_price_freshness(self.updated_at, now, max_age)?;
        if self.decimals > MAX_PRICE_DECIMALS {
            return Err(Error::InvalidParameter {
                name: "decimals".into(),
                reason: format!("{} exceeds maximum {}", self.decimals, MAX_PRICE_DECIMALS),
            });
        }
        Ok(ValidatedPrice {
            price,
            decimals: self.decimals,
        })
    }
}

/// A quote that passed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedPrice {
    /// Strictly positive price
    pub price: u128,
    /// Decimal places of `price`
    pub decimals: u8,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Source of price quotes, keyed by feed reference
pub trait PriceOracle {
    /// Latest quote for a feed; no validation is implied
    fn latest_quote(&self, feed: &Address) -> Result<PriceQuote>;

    /// Latest quote, validated for sign and freshness
    fn fresh_price(&self, feed: &Address, now: u64, max_age: u64) -> Result<ValidatedPrice> {
        self.latest_quote(feed)?.validate(now, max_age)
    }
}

/// In-memory oracle whose quotes are set directly
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticPriceOracle {
    quotes: HashMap<Address, PriceQuote>,
}

impl StaticPriceOracle {
    /// Create an empty oracle
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a quote for a feed
    pub fn set_quote(&mut self, feed: Address, quote: PriceQuote) {
        tracing::debug!(feed = %feed.short(), price = quote.price, "quote updated");
        self.quotes.insert(feed, quote);
    }

    /// Publish a price stamped at `updated_at`
    pub fn set_price(&mut self, feed: Address, price: i128, decimals: u8, updated_at: u64) {
        self.set_quote(feed, PriceQuote::new(price, decimals, updated_at));
    }

    /// Restamp every quote, as a feed heartbeat would
    pub fn refresh_all(&mut self, updated_at: u64) {
        for quote in self.quotes.values_mut() {
            quote.updated_at = updated_at;
        }
    }

    /// Remove a feed
    pub fn remove_feed(&mut self, feed: &Address) -> Option<PriceQuote> {
        self.quotes.remove(feed)
    }
}

impl PriceOracle for StaticPriceOracle {
    fn latest_quote(&self, feed: &Address) -> Result<PriceQuote> {
        self.quotes
            .get(feed)
            .copied()
            .ok_or_else(|| Error::PriceFeedNotFound(feed.to_hex()))
    }
}
