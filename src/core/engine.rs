//! Collateral engine.
//!
//! Owns user positions and orchestrates the two economically sensitive flows:
//!
//! - **Deposit**: price the collateral, check the peg, park it in the yield
//!   strategy, route the treasury's share of the yield, record the position
//!   and mint stable units at the 150% ratio.
//! - **Withdraw**: convert burned stable units back into collateral at a
//!   fresh price, re-check the remaining position, burn, then release funds
//!   from the strategy.
//!
//! Each flow runs under the engine's reentrancy lock. Atomicity across
//! components is provided by [`crate::protocol::Protocol`], which rolls every
//! component back when any step fails.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::access::{require_role, Authorizer, Role};
use crate::core::config::EngineParams;
use crate::core::position::{AssetParams, CollateralAssetConfig, Position};
use crate::core::token::StableToken;
use crate::error::{Error, Result};
use crate::oracle::{DepegSignal, PriceOracle};
use crate::protocol::events::*;
use crate::protocol::TxContext;
use crate::strategy::YieldStrategy;
use crate::treasury::TreasuryReserveManager;
use crate::utils::constants::*;
use crate::utils::crypto::{Address, Hash};
use crate::utils::guard::{Guarded, ReentrancyLock};
use crate::utils::math::*;
use crate::utils::validation::*;

/// Events retained between drains
const MAX_PENDING_EVENTS: usize = 1000;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLABORATORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Components a deposit or withdrawal touches besides the engine itself
pub struct Collaborators<'a> {
    /// Price source
    pub oracle: &'a dyn PriceOracle,
    /// Yield venue holding the collateral
    pub strategy: &'a mut dyn YieldStrategy,
    /// Supply controller
    pub token: &'a mut StableToken,
    /// Receiver of the yield share
    pub treasury: &'a mut TreasuryReserveManager,
    /// Capability checks
    pub auth: &'a dyn Authorizer,
    /// Peg guard
    pub depeg: &'a dyn DepegSignal,
}

/// Outcome of a deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReceipt {
    /// Stable units minted to the depositor
    pub stable_minted: u128,
    /// USD value of the deposit
    pub usd_value: u128,
    /// Yield reported by the strategy
    pub yield_generated: u128,
    /// Portion of the yield routed to the treasury
    pub treasury_share: u128,
}

/// Outcome of a withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawReceipt {
    /// Collateral debited from the position
    pub token_amount: u128,
    /// Collateral the strategy actually released
    pub actual_amount: u128,
    /// USD value released
    pub usd_value: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Collateral engine state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralEngine {
    /// Identity of the engine
    address: Address,
    /// Deposits and withdrawals halted
    paused: bool,
    /// Supported deposit assets
    assets: HashMap<Address, CollateralAssetConfig>,
    /// Positions by owner
    positions: HashMap<Address, Position>,
    /// USD value deposited, net of withdrawals
    total_value_locked: u128,
    /// Yield reported by the strategy across all deposits
    total_yield_generated: u128,
    /// Stable units outstanding against positions
    total_stable_minted: u128,
    /// Share of strategy yield routed to the treasury
    treasury_yield_bps: u128,
    /// Peg deviation above which deposits are refused
    emergency_threshold_bps: u128,
    /// Maximum quote age
    max_price_age: u64,
    /// Value recovered by the last emergency strategy close
    strategy_recovered: Option<u128>,
    /// Entry point guard
    lock: ReentrancyLock,
    /// Events not yet drained
    events: Vec<ProtocolEvent>,
    /// Maximum events to keep in memory
    max_events: usize,
}

impl Guarded for CollateralEngine {
    fn lock(&mut self) -> &mut ReentrancyLock {
        &mut self.lock
    }
}

impl CollateralEngine {
    /// Create an engine with no supported assets
    pub fn new(address: Address, params: &EngineParams, max_price_age: u64) -> Self {
        Self {
            address,
            paused: false,
            assets: HashMap::new(),
            positions: HashMap::new(),
            total_value_locked: 0,
            total_yield_generated: 0,
            total_stable_minted: 0,
            treasury_yield_bps: params.treasury_yield_bps,
            emergency_threshold_bps: params.emergency_threshold_bps,
            max_price_age,
            strategy_recovered: None,
            lock: ReentrancyLock::new("engine"),
            events: Vec::new(),
            max_events: MAX_PENDING_EVENTS,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEPOSIT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Deposit `amount` of `asset` for the caller and mint stable units
    /// against it at the minimum collateral ratio
    pub fn deposit(
        &mut self,
        env: &mut Collaborators<'_>,
        ctx: &TxContext,
        asset: Address,
        amount: u128,
    ) -> Result<DepositReceipt> {
        self.ensure_not_paused()?;

        self.non_reentrant("deposit", |engine| {
            let user = ctx.caller;
            let now = ctx.timestamp;
            validate_address(&user, "user")?;

            let config = engine.supported_asset(&asset)?.clone();
            config.check_bounds(amount)?;

            let price = env.oracle.fresh_price(&config.price_feed, now, engine.max_price_age)?;
            let usd_value = usd_value(amount, price.price, price.decimals)?;
            validate_non_zero(usd_value)?;

            let peg = env.depeg.check(env.oracle, now, engine.emergency_threshold_bps)?;
            if peg.depegged {
                tracing::warn!(deviation_bps = peg.deviation_bps, "deposit refused while depegged");
                return Err(Error::Depegged {
                    deviation_bps: peg.deviation_bps,
                });
            }

            let stable_minted = stable_for_collateral(usd_value)?;
            validate_non_zero(stable_minted)?;

            let yield_generated = env.strategy.deposit(&asset, amount)?;
            let treasury_share = bps_of(yield_generated, engine.treasury_yield_bps)?;
            let own = ctx.as_caller(engine.address);
            if treasury_share > 0 {
                env.treasury
                    .receive_yield(env.auth, env.oracle, &own, asset, treasury_share)?;
            }

            engine
                .positions
                .entry(user)
                .or_default()
                .credit(asset, amount, stable_minted, now)?;
            engine.total_value_locked = safe_add(engine.total_value_locked, usd_value)?;
            engine.total_yield_generated = safe_add(engine.total_yield_generated, yield_generated)?;
            engine.total_stable_minted = safe_add(engine.total_stable_minted, stable_minted)?;

            env.token.mint(env.auth, &own, user, stable_minted)?;

            tracing::info!(
                user = %user.short(),
                asset = %asset.short(),
                amount,
                usd_value,
                stable_minted,
                "collateral deposited"
            );
            if yield_generated > 0 {
                engine.add_event(ProtocolEvent::YieldGenerated(YieldGeneratedEvent {
                    asset,
                    amount: yield_generated,
                    treasury_share,
                    block_height: ctx.block_height,
                    timestamp: now,
                }));
            }
            engine.add_event(ProtocolEvent::CollateralDeposited(CollateralDepositedEvent {
                user,
                asset,
                amount,
                usd_value,
                stable_minted,
                block_height: ctx.block_height,
                timestamp: now,
            }));

            Ok(DepositReceipt {
                stable_minted,
                usd_value,
                yield_generated,
                treasury_share,
            })
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // WITHDRAW
    // ═══════════════════════════════════════════════════════════════════════════

    /// Burn `stable_amount` of the caller's debt and release the matching
    /// amount of `asset`
    pub fn withdraw(
        &mut self,
        env: &mut Collaborators<'_>,
        ctx: &TxContext,
        asset: Address,
        stable_amount: u128,
    ) -> Result<WithdrawReceipt> {
        self.ensure_not_paused()?;

        self.non_reentrant("withdraw", |engine| {
            let user = ctx.caller;
            let now = ctx.timestamp;
            validate_non_zero(stable_amount)?;
            let config = engine.supported_asset(&asset)?.clone();

            let position = engine
                .positions
                .get(&user)
                .filter(|p| p.holds(&asset))
                .ok_or_else(|| Error::AssetNotInPosition(asset.to_hex()))?;
            if stable_amount > position.stable_minted {
                return Err(Error::DebtExceeded {
                    requested: stable_amount,
                    outstanding: position.stable_minted,
                });
            }

            let usd = collateral_for_stable(stable_amount)?;
            let price = env.oracle.fresh_price(&config.price_feed, now, engine.max_price_age)?;
            let token_amount = asset_amount(usd, price.price, price.decimals)?;
            let deposited = position.collateral(&asset);
            if token_amount > deposited {
                return Err(Error::InsufficientCollateral {
                    required: token_amount,
                    available: deposited,
                });
            }

            let remaining_debt = position.stable_minted - stable_amount;
            if remaining_debt > 0 {
                let remaining_value =
                    engine.remaining_value(env.oracle, position, &asset, token_amount, now)?;
                let ratio = ratio_bps(remaining_value, remaining_debt)?;
                if ratio < MIN_COLLATERAL_RATIO_BPS {
                    return Err(Error::CollateralizationRatioTooLow {
                        current_bps: ratio,
                        minimum_bps: MIN_COLLATERAL_RATIO_BPS,
                    });
                }
            }

            let own = ctx.as_caller(engine.address);
            env.token.burn_from(env.auth, &own, user, stable_amount)?;
            let actual_amount = env.strategy.withdraw(token_amount, &user)?;

            if let Some(position) = engine.positions.get_mut(&user) {
                position.debit(&asset, token_amount, stable_amount, now)?;
            }
            engine.total_value_locked = engine.total_value_locked.saturating_sub(usd);
            engine.total_stable_minted = safe_sub(engine.total_stable_minted, stable_amount)?;

            tracing::info!(
                user = %user.short(),
                asset = %asset.short(),
                stable_amount,
                token_amount,
                actual_amount,
                "collateral withdrawn"
            );
            engine.add_event(ProtocolEvent::CollateralWithdrawn(CollateralWithdrawnEvent {
                user,
                asset,
                stable_burned: stable_amount,
                token_amount,
                actual_amount,
                block_height: ctx.block_height,
                timestamp: now,
            }));

            Ok(WithdrawReceipt {
                token_amount,
                actual_amount,
                usd_value: usd,
            })
        })
    }

    /// Value of a position's holdings after removing `removed` of `asset`
    fn remaining_value(
        &self,
        oracle: &dyn PriceOracle,
        position: &Position,
        asset: &Address,
        removed: u128,
        now: u64,
    ) -> Result<u128> {
        position.held_assets().try_fold(0u128, |total, (held, amount)| {
            let amount = if held == asset {
                safe_sub(*amount, removed)?
            } else {
                *amount
            };
            safe_add(total, self.asset_value(oracle, held, amount, now)?)
        })
    }

    fn asset_value(&self, oracle: &dyn PriceOracle, asset: &Address, amount: u128, now: u64) -> Result<u128> {
        if amount == 0 {
            return Ok(0);
        }
        let config = self.supported_asset(asset)?;
        let price = oracle.fresh_price(&config.price_feed, now, self.max_price_age)?;
        usd_value(amount, price.price, price.decimals)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ADMINISTRATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register a deposit asset; admin role, once per asset
    pub fn add_supported_asset(
        &mut self,
        auth: &dyn Authorizer,
        ctx: &TxContext,
        asset: Address,
        params: AssetParams,
    ) -> Result<()> {
        require_role(auth, Role::Admin, &ctx.caller)?;
        validate_address(&asset, "asset")?;
        validate_address(&params.price_feed, "price_feed")?;
        if params.max_deposit <= params.min_deposit {
            return Err(Error::InvalidParameter {
                name: "max_deposit".into(),
                reason: "must exceed min_deposit".into(),
            });
        }
        if self.assets.contains_key(&asset) {
            return Err(Error::AssetAlreadySupported(asset.to_hex()));
        }

        let config = CollateralAssetConfig::from(params);
        tracing::info!(asset = %asset.short(), min = config.min_deposit, max = config.max_deposit, "collateral asset added");
        self.add_event(ProtocolEvent::CollateralAssetAdded(CollateralAssetAddedEvent {
            asset,
            price_feed: config.price_feed,
            min_deposit: config.min_deposit,
            max_deposit: config.max_deposit,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
        self.assets.insert(asset, config);
        Ok(())
    }

    /// Change the treasury yield share and the depeg threshold; admin role
    pub fn update_parameters(
        &mut self,
        auth: &dyn Authorizer,
        ctx: &TxContext,
        treasury_yield_bps: u128,
        emergency_threshold_bps: u128,
    ) -> Result<()> {
        require_role(auth, Role::Admin, &ctx.caller)?;
        validate_bps(treasury_yield_bps, "treasury_yield_bps")?;
        validate_bps(emergency_threshold_bps, "emergency_threshold_bps")?;

        self.treasury_yield_bps = treasury_yield_bps;
        self.emergency_threshold_bps = emergency_threshold_bps;
        self.add_event(ProtocolEvent::EngineParametersUpdated(EngineParametersUpdatedEvent {
            treasury_yield_bps,
            emergency_threshold_bps,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
        Ok(())
    }

    /// Halt deposits and withdrawals; emergency role
    pub fn emergency_pause(&mut self, auth: &dyn Authorizer, ctx: &TxContext, reason: &str) -> Result<()> {
        require_role(auth, Role::Emergency, &ctx.caller)?;
        self.paused = true;
        tracing::warn!(reason, by = %ctx.caller.short(), "engine paused");
        self.add_event(ProtocolEvent::EnginePaused(EnginePausedEvent {
            by: ctx.caller,
            reason: reason.to_string(),
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
        Ok(())
    }

    /// Resume deposits and withdrawals; admin role
    pub fn unpause(&mut self, auth: &dyn Authorizer, ctx: &TxContext) -> Result<()> {
        require_role(auth, Role::Admin, &ctx.caller)?;
        self.paused = false;
        tracing::info!(by = %ctx.caller.short(), "engine unpaused");
        self.add_event(ProtocolEvent::EngineUnpaused(PauseChangedEvent {
            paused: false,
            by: ctx.caller,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
        Ok(())
    }

    /// Unwind the strategy; emergency role, only while paused
    pub fn emergency_close_strategy(
        &mut self,
        auth: &dyn Authorizer,
        strategy: &mut dyn YieldStrategy,
        ctx: &TxContext,
    ) -> Result<u128> {
        require_role(auth, Role::Emergency, &ctx.caller)?;
        if !self.paused {
            return Err(Error::InvalidParameter {
                name: "paused".into(),
                reason: "engine must be paused to close the strategy".into(),
            });
        }

        self.non_reentrant("emergency_close_strategy", |engine| {
            let recovered = strategy.close_position()?;
            engine.strategy_recovered = Some(recovered);
            tracing::warn!(recovered, "strategy closed");
            engine.add_event(ProtocolEvent::StrategyClosed(StrategyClosedEvent {
                recovered,
                block_height: ctx.block_height,
                timestamp: ctx.timestamp,
            }));
            Ok(recovered)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Identity of the engine
    pub fn address(&self) -> Address {
        self.address
    }

    /// A user's position
    pub fn position(&self, user: &Address) -> Option<&Position> {
        self.positions.get(user)
    }

    /// All positions
    pub fn positions(&self) -> impl Iterator<Item = (&Address, &Position)> {
        self.positions.iter()
    }

    /// USD value of a user's collateral at current prices
    pub fn collateral_value_usd(&self, oracle: &dyn PriceOracle, user: &Address, now: u64) -> Result<u128> {
        match self.positions.get(user) {
            Some(position) => position.held_assets().try_fold(0u128, |total, (asset, amount)| {
                safe_add(total, self.asset_value(oracle, asset, *amount, now)?)
            }),
            None => Ok(0),
        }
    }

    /// Collateral value over debt in bps; `u128::MAX` without debt
    pub fn collateralization_ratio_bps(&self, oracle: &dyn PriceOracle, user: &Address, now: u64) -> Result<u128> {
        let debt = self.positions.get(user).map(|p| p.stable_minted).unwrap_or(0);
        ratio_bps(self.collateral_value_usd(oracle, user, now)?, debt)
    }

    /// Configuration of a supported asset
    pub fn asset_config(&self, asset: &Address) -> Option<&CollateralAssetConfig> {
        self.assets.get(asset)
    }

    /// USD value deposited, net of withdrawals
    pub fn total_value_locked(&self) -> u128 {
        self.total_value_locked
    }

    /// Yield reported across all deposits
    pub fn total_yield_generated(&self) -> u128 {
        self.total_yield_generated
    }

    /// Stable units outstanding against positions
    pub fn total_stable_minted(&self) -> u128 {
        self.total_stable_minted
    }

    /// Share of yield routed to the treasury
    pub fn treasury_yield_bps(&self) -> u128 {
        self.treasury_yield_bps
    }

    /// Deposit depeg threshold
    pub fn emergency_threshold_bps(&self) -> u128 {
        self.emergency_threshold_bps
    }

    /// Value recovered by the last strategy close
    pub fn strategy_recovered(&self) -> Option<u128> {
        self.strategy_recovered
    }

    /// Check if deposits and withdrawals are halted
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Sum of position debts equals the tracked total
    pub fn verify_debt_invariant(&self) -> bool {
        let sum: u128 = self.positions.values().map(|p| p.stable_minted).sum();
        sum == self.total_stable_minted
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

    fn ensure_not_paused(&self) -> Result<()> {
        if self.paused {
            return Err(Error::EnginePaused);
        }
        Ok(())
    }

    fn supported_asset(&self, asset: &Address) -> Result<&CollateralAssetConfig> {
        self.assets
            .get(asset)
            .filter(|config| config.supported)
            .ok_or_else(|| Error::UnsupportedAsset(asset.to_hex()))
    }

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

    /// Hash of all positions (sorted by owner) and aggregates
    pub fn state_hash(&self) -> Hash {
        let mut owners: Vec<&Address> = self.positions.keys().collect();
        owners.sort();

        let mut data = Vec::new();
        for owner in owners {
            if let Some(position) = self.positions.get(owner) {
                data.extend_from_slice(position.hash(owner).as_bytes());
            }
        }
        data.extend_from_slice(&self.total_value_locked.to_be_bytes());
        data.extend_from_slice(&self.total_stable_minted.to_be_bytes());
        data.push(self.paused as u8);
        Hash::sha256(&data)
    }
}
