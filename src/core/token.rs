//! Stable unit supply controller.
//!
//! This module implements the synthetic dollar token:
//! - Minting and burning by holders of the minter capability
//! - Balance tracking
//! - Supply cap, per-period rate limit and mint circuit breaker
//! - Pausing

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::access::{require_role, Authorizer, Role};
use crate::core::config::SupplyParams;
use crate::error::{Error, Result};
use crate::protocol::events::*;
use crate::protocol::TxContext;
use crate::utils::constants::*;
use crate::utils::crypto::{Address, Hash};
use crate::utils::guard::{Guarded, ReentrancyLock};
use crate::utils::math::*;
use crate::utils::validation::{validate_address, validate_non_zero};

/// Events retained between drains
const MAX_PENDING_EVENTS: usize = 1000;

// ═══════════════════════════════════════════════════════════════════════════════
// STABLE TOKEN
// ═══════════════════════════════════════════════════════════════════════════════

/// The synthetic dollar and its supply policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StableToken {
    /// Token name
    pub name: String,
    /// Token symbol
    pub symbol: String,
    /// Decimal places
    pub decimals: u8,
    /// Identity of the token itself
    address: Address,
    /// Total supply
    total_supply: u128,
    /// Balances by holder
    balances: HashMap<Address, u128>,
    /// Maximum total supply
    supply_cap: u128,
    /// Maximum minted per period
    rate_limit: u128,
    /// Period length in seconds
    rate_limit_period_secs: u64,
    /// Index of the period `minted_in_period` belongs to
    current_period: u64,
    /// Minted so far in `current_period`
    minted_in_period: u128,
    /// Mint and burn halted
    paused: bool,
    /// Entry point guard
    lock: ReentrancyLock,
    /// Events not yet drained
    events: Vec<ProtocolEvent>,
    /// Maximum events to keep in memory
    max_events: usize,
}

impl Default for StableToken {
    fn default() -> Self {
        Self::new(Address::derive("synthusd"), &SupplyParams::default())
    }
}

impl Guarded for StableToken {
    fn lock(&mut self) -> &mut ReentrancyLock {
        &mut self.lock
    }
}

impl StableToken {
    /// Create a token with the given identity and supply policy
    pub fn new(address: Address, params: &SupplyParams) -> Self {
        Self {
            name: "Synthetic USD".to_string(),
            symbol: "sUSD".to_string(),
            decimals: STABLE_DECIMALS,
            address,
            total_supply: 0,
            balances: HashMap::new(),
            supply_cap: params.supply_cap,
            rate_limit: params.rate_limit,
            rate_limit_period_secs: params.rate_limit_period_secs.max(1),
            current_period: 0,
            minted_in_period: 0,
            paused: false,
            lock: ReentrancyLock::new("token"),
            events: Vec::new(),
            max_events: MAX_PENDING_EVENTS,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SUPPLY MANAGEMENT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mint `amount` to `to`; caller must hold the minter capability
    pub fn mint(
        &mut self,
        auth: &dyn Authorizer,
        ctx: &TxContext,
        to: Address,
        amount: u128,
    ) -> Result<()> {
        require_role(auth, Role::Minter, &ctx.caller)?;
        self.ensure_not_paused()?;

        self.non_reentrant("mint", |token| {
            validate_address(&to, "recipient")?;
            validate_non_zero(amount)?;

            let new_supply = safe_add(token.total_supply, amount)?;
            if new_supply > token.supply_cap {
                return Err(Error::SupplyCapExceeded {
                    resulting: new_supply,
                    cap: token.supply_cap,
                });
            }

            let period = ctx.timestamp / token.rate_limit_period_secs;
            let minted = if period == token.current_period {
                token.minted_in_period
            } else {
                0
            };
            let remaining = token.rate_limit.saturating_sub(minted);
            if amount > remaining {
                return Err(Error::RateLimitExceeded {
                    requested: amount,
                    remaining,
                });
            }

            // The first mint into an empty supply has no base to compare against
            if token.total_supply > 0 {
                let increase_bps = safe_mul_div(amount, BPS_DIVISOR, token.total_supply)?;
                if increase_bps > CIRCUIT_BREAKER_THRESHOLD_BPS {
                    tracing::warn!(
                        amount,
                        total_supply = token.total_supply,
                        increase_bps,
                        "mint circuit breaker triggered"
                    );
                    return Err(Error::MintCircuitBreaker {
                        amount,
                        total_supply: token.total_supply,
                        increase_bps,
                        threshold_bps: CIRCUIT_BREAKER_THRESHOLD_BPS,
                    });
                }
            }

            let balance = safe_add(token.balance_of(&to), amount)?;
            token.balances.insert(to, balance);
            token.total_supply = new_supply;
            token.current_period = period;
            token.minted_in_period = safe_add(minted, amount)?;

            tracing::debug!(to = %to.short(), amount, total_supply = new_supply, "minted");
            token.add_event(ProtocolEvent::Minted(MintedEvent {
                to,
                amount,
                total_supply: new_supply,
                block_height: ctx.block_height,
                timestamp: ctx.timestamp,
            }));
            Ok(())
        })
    }

    /// Burn `amount` from `from`; caller must hold the minter capability
    pub fn burn_from(
        &mut self,
        auth: &dyn Authorizer,
        ctx: &TxContext,
        from: Address,
        amount: u128,
    ) -> Result<()> {
        require_role(auth, Role::Minter, &ctx.caller)?;
        self.ensure_not_paused()?;
        self.non_reentrant("burn_from", |token| token.debit(ctx, from, amount))
    }

    /// Burn `amount` of the caller's own balance; minter capability
    pub fn burn(&mut self, auth: &dyn Authorizer, ctx: &TxContext, amount: u128) -> Result<()> {
        require_role(auth, Role::Minter, &ctx.caller)?;
        self.ensure_not_paused()?;
        self.non_reentrant("burn", |token| token.debit(ctx, ctx.caller, amount))
    }

    fn debit(&mut self, ctx: &TxContext, from: Address, amount: u128) -> Result<()> {
        validate_address(&from, "holder")?;
        validate_non_zero(amount)?;

        let balance = self.balance_of(&from);
        if balance < amount {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: balance,
            });
        }

        let new_balance = balance - amount;
        if new_balance == 0 {
            self.balances.remove(&from);
        } else {
            self.balances.insert(from, new_balance);
        }
        self.total_supply = safe_sub(self.total_supply, amount)?;

        tracing::debug!(from = %from.short(), amount, total_supply = self.total_supply, "burned");
        self.add_event(ProtocolEvent::Burned(BurnedEvent {
            from,
            amount,
            total_supply: self.total_supply,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ADMINISTRATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Change the supply cap; it may not fall below the current supply
    pub fn set_supply_cap(&mut self, auth: &dyn Authorizer, ctx: &TxContext, cap: u128) -> Result<()> {
        require_role(auth, Role::Admin, &ctx.caller)?;
        if cap < self.total_supply {
            return Err(Error::SupplyCapBelowSupply {
                cap,
                supply: self.total_supply,
            });
        }

        let old_cap = self.supply_cap;
        self.supply_cap = cap;
        tracing::info!(old_cap, new_cap = cap, "supply cap updated");
        self.add_event(ProtocolEvent::SupplyCapUpdated(SupplyCapUpdatedEvent {
            old_cap,
            new_cap: cap,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
        Ok(())
    }

    /// Change the per-period mint limit
    pub fn set_rate_limit(&mut self, auth: &dyn Authorizer, ctx: &TxContext, limit: u128) -> Result<()> {
        require_role(auth, Role::Admin, &ctx.caller)?;

        let old_limit = self.rate_limit;
        self.rate_limit = limit;
        tracing::info!(old_limit, new_limit = limit, "rate limit updated");
        self.add_event(ProtocolEvent::RateLimitUpdated(RateLimitUpdatedEvent {
            old_limit,
            new_limit: limit,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
        Ok(())
    }

    /// Halt mint and burn; emergency capability
    pub fn pause(&mut self, auth: &dyn Authorizer, ctx: &TxContext) -> Result<()> {
        require_role(auth, Role::Emergency, &ctx.caller)?;
        self.set_paused(ctx, true);
        Ok(())
    }

    /// Resume mint and burn; admin capability
    pub fn unpause(&mut self, auth: &dyn Authorizer, ctx: &TxContext) -> Result<()> {
        require_role(auth, Role::Admin, &ctx.caller)?;
        self.set_paused(ctx, false);
        Ok(())
    }

    fn set_paused(&mut self, ctx: &TxContext, paused: bool) {
        self.paused = paused;
        tracing::warn!(paused, by = %ctx.caller.short(), "token pause state changed");
        self.add_event(ProtocolEvent::TokenPauseChanged(PauseChangedEvent {
            paused,
            by: ctx.caller,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
    }

    fn ensure_not_paused(&self) -> Result<()> {
        if self.paused {
            return Err(Error::TokenPaused);
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Identity of the token
    pub fn address(&self) -> Address {
        self.address
    }

    /// Get total supply
    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    /// Get balance of a holder
    pub fn balance_of(&self, holder: &Address) -> u128 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    /// Maximum total supply
    pub fn supply_cap(&self) -> u128 {
        self.supply_cap
    }

    /// Maximum minted per period
    pub fn rate_limit(&self) -> u128 {
        self.rate_limit
    }

    /// Mint allowance left in the period containing `timestamp`
    pub fn remaining_mint_allowance(&self, timestamp: u64) -> u128 {
        let period = timestamp / self.rate_limit_period_secs;
        if period == self.current_period {
            self.rate_limit.saturating_sub(self.minted_in_period)
        } else {
            self.rate_limit
        }
    }

    /// Whether mint and burn are halted
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Get number of holders
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Verify supply invariant (total_supply == sum of all balances)
    pub fn verify_supply_invariant(&self) -> bool {
        let sum = self
            .balances
            .values()
            .try_fold(0u128, |acc, b| acc.checked_add(*b));
        sum == Some(self.total_supply)
    }

    /// Events emitted since the last drain
    pub fn pending_events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Take events emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<ProtocolEvent> {
        std::mem::take(&mut self.events)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL
    // ═══════════════════════════════════════════════════════════════════════════

    /// Add an event (with pruning)
    fn add_event(&mut self, event: ProtocolEvent) {
        self.events.push(event);

        if self.events.len() > self.max_events {
            self.events.drain(0..self.events.len() - self.max_events);
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Hash of supply, policy and balances
    pub fn state_hash(&self) -> Hash {
        let mut data = Vec::new();
        data.extend_from_slice(&self.total_supply.to_be_bytes());
        data.extend_from_slice(&self.supply_cap.to_be_bytes());
        data.extend_from_slice(&self.rate_limit.to_be_bytes());
        data.push(self.paused as u8);

        let mut sorted: Vec<_> = self.balances.iter().collect();
        sorted.sort_by_key(|(holder, _)| **holder);

        for (holder, balance) in sorted {
            data.extend_from_slice(holder.as_bytes());
            data.extend_from_slice(&balance.to_be_bytes());
        }

        Hash::sha256(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::RoleRegistry;

    fn admin() -> Address {
        Address::derive("admin")
    }

    fn alice() -> Address {
        Address::derive("alice")
    }

    fn ctx(timestamp: u64) -> TxContext {
        TxContext::new(admin(), timestamp, 1)
    }

    fn setup() -> (StableToken, RoleRegistry) {
        (StableToken::default(), RoleRegistry::with_admin(admin()))
    }

    #[test]
    fn test_mint_and_burn() {
        let (mut token, auth) = setup();

        token.mint(&auth, &ctx(0), alice(), 1000 * WAD).unwrap();
        assert_eq!(token.total_supply(), 1000 * WAD);
        assert_eq!(token.balance_of(&alice()), 1000 * WAD);

        token.burn_from(&auth, &ctx(0), alice(), 400 * WAD).unwrap();
        assert_eq!(token.total_supply(), 600 * WAD);
        assert!(token.verify_supply_invariant());
        assert_eq!(token.drain_events().len(), 2);
        assert!(token.pending_events().is_empty());
    }

    #[test]
    fn test_mint_requires_minter() {
        let (mut token, auth) = setup();
        let outsider = TxContext::new(alice(), 0, 1);

        let result = token.mint(&auth, &outsider, alice(), WAD);
        assert!(matches!(result, Err(Error::Unauthorized { .. })));
        assert_eq!(token.total_supply(), 0);
    }

    #[test]
    fn test_mint_validation() {
        let (mut token, auth) = setup();
        assert!(matches!(
            token.mint(&auth, &ctx(0), Address::ZERO, WAD),
            Err(Error::ZeroAddress(_))
        ));
        assert!(matches!(
            token.mint(&auth, &ctx(0), alice(), 0),
            Err(Error::ZeroAmount)
        ));
    }

    #[test]
    fn test_supply_cap() {
        let (mut token, auth) = setup();
        token.set_supply_cap(&auth, &ctx(0), 100 * WAD).unwrap();

        let result = token.mint(&auth, &ctx(0), alice(), 101 * WAD);
        assert!(matches!(result, Err(Error::SupplyCapExceeded { .. })));

        token.mint(&auth, &ctx(0), alice(), 100 * WAD).unwrap();
        assert!(matches!(
            token.set_supply_cap(&auth, &ctx(0), 99 * WAD),
            Err(Error::SupplyCapBelowSupply { .. })
        ));
    }

    #[test]
    fn test_circuit_breaker() {
        let (mut token, auth) = setup();

        // first mint into zero supply is never blocked by the breaker
        token.mint(&auth, &ctx(0), alice(), 1000 * WAD).unwrap();

        // exactly 10% is allowed
        token.mint(&auth, &ctx(0), alice(), 100 * WAD).unwrap();

        // 1100 supply: 111 is 1009 bps
        let result = token.mint(&auth, &ctx(0), alice(), 111 * WAD);
        assert!(matches!(
            result,
            Err(Error::MintCircuitBreaker { increase_bps: 1009, threshold_bps: 1000, .. })
        ));
        assert_eq!(token.total_supply(), 1100 * WAD);
    }

    #[test]
    fn test_rate_limit_resets_each_period() {
        let (mut token, auth) = setup();
        token.set_rate_limit(&auth, &ctx(0), 1000 * WAD).unwrap();

        token.mint(&auth, &ctx(10), alice(), 1000 * WAD).unwrap();
        assert_eq!(token.remaining_mint_allowance(10), 0);

        let result = token.mint(&auth, &ctx(20), alice(), WAD);
        assert!(matches!(result, Err(Error::RateLimitExceeded { remaining: 0, .. })));

        // next period
        let next = DEFAULT_RATE_LIMIT_PERIOD_SECS + 1;
        assert_eq!(token.remaining_mint_allowance(next), 1000 * WAD);
        token.mint(&auth, &ctx(next), alice(), 100 * WAD).unwrap();
        assert_eq!(token.remaining_mint_allowance(next), 900 * WAD);
    }

    #[test]
    fn test_burn_own_balance() {
        let (mut token, auth) = setup();
        token.mint(&auth, &ctx(0), admin(), 50 * WAD).unwrap();

        token.burn(&auth, &ctx(0), 20 * WAD).unwrap();
        assert_eq!(token.balance_of(&admin()), 30 * WAD);

        assert!(matches!(
            token.burn(&auth, &ctx(0), 31 * WAD),
            Err(Error::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_burn_own_balance_requires_minter() {
        let (mut token, auth) = setup();
        token.mint(&auth, &ctx(0), alice(), 50 * WAD).unwrap();

        let as_alice = TxContext::new(alice(), 0, 1);
        assert!(matches!(
            token.burn(&auth, &as_alice, WAD),
            Err(Error::Unauthorized { .. })
        ));
        assert_eq!(token.balance_of(&alice()), 50 * WAD);
        assert_eq!(token.total_supply(), 50 * WAD);
    }

    #[test]
    fn test_pause() {
        let (mut token, auth) = setup();
        token.pause(&auth, &ctx(0)).unwrap();
        assert!(matches!(
            token.mint(&auth, &ctx(0), alice(), WAD),
            Err(Error::TokenPaused)
        ));

        token.unpause(&auth, &ctx(0)).unwrap();
        token.mint(&auth, &ctx(0), alice(), WAD).unwrap();
    }

    #[test]
    fn test_serialization_and_state_hash() {
        let (mut token, auth) = setup();
        token.mint(&auth, &ctx(0), alice(), 5 * WAD).unwrap();

        let bytes = token.to_bytes().unwrap();
        let restored = StableToken::from_bytes(&bytes).unwrap();
        assert_eq!(restored.total_supply(), token.total_supply());
        assert_eq!(restored.state_hash(), token.state_hash());
    }
}
