//! Treasury reserve manager.
//!
//! Holds multi-asset reserves, keeps the reserve ratio against outstanding
//! supply, timelocks large withdrawals and defends the peg in emergencies.
//!
//! ## Flow
//!
//! 1. Managers (or the yield router) deposit reserves
//! 2. Withdrawals are queued; large ones wait out the timelock
//! 3. Execution re-checks the reserve ratio at current prices
//! 4. During a depeg the emergency role draws reserves, stable assets first

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::access::{require_any_role, require_role, Authorizer, Role};
use crate::core::config::TreasuryParams;
use crate::core::token::StableToken;
use crate::error::{Error, Result};
use crate::oracle::{DepegSignal, PriceOracle};
use crate::protocol::events::*;
use crate::protocol::TxContext;
use crate::treasury::reserves::ReserveAsset;
use crate::treasury::timelock::{OperationId, OperationKind, PendingOperation, PendingQueue};
use crate::utils::constants::*;
use crate::utils::crypto::{Address, Hash};
use crate::utils::guard::{Guarded, ReentrancyLock};
use crate::utils::math::*;
use crate::utils::validation::*;

/// Events retained between drains
const MAX_PENDING_EVENTS: usize = 1000;

// ═══════════════════════════════════════════════════════════════════════════════
// TREASURY RESERVE MANAGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Treasury state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasuryReserveManager {
    /// Identity of the treasury
    address: Address,
    /// Reserve assets by identity
    assets: HashMap<Address, ReserveAsset>,
    /// Registration order
    asset_order: Vec<Address>,
    /// USD value of all reserves at the last recomputation
    total_reserves_usd: u128,
    /// Reserve policy
    params: TreasuryParams,
    /// Maximum quote age
    max_price_age: u64,
    /// Fund movements halted
    circuit_breaker_active: bool,
    /// Time of the last depeg intervention
    last_intervention: Option<u64>,
    /// Account allowed to deposit without the manager role
    yield_router: Address,
    /// Queued operations
    pending: PendingQueue,
    /// Entry point guard
    lock: ReentrancyLock,
    /// Events not yet drained
    events: Vec<ProtocolEvent>,
    /// Maximum events to keep in memory
    max_events: usize,
}

impl Guarded for TreasuryReserveManager {
    fn lock(&mut self) -> &mut ReentrancyLock {
        &mut self.lock
    }
}

impl TreasuryReserveManager {
    /// Create an empty treasury
    pub fn new(address: Address, params: &TreasuryParams, max_price_age: u64) -> Self {
        Self {
            address,
            assets: HashMap::new(),
            asset_order: Vec::new(),
            total_reserves_usd: 0,
            params: params.clone(),
            max_price_age,
            circuit_breaker_active: false,
            last_intervention: None,
            yield_router: Address::ZERO,
            pending: PendingQueue::new(),
            lock: ReentrancyLock::new("treasury"),
            events: Vec::new(),
            max_events: MAX_PENDING_EVENTS,
        }
    }

    /// Set the yield router at construction
    pub fn with_yield_router(mut self, router: Address) -> Self {
        self.yield_router = router;
        self
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RESERVE INFLOWS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Add reserves; manager role or the yield router
    pub fn deposit(
        &mut self,
        auth: &dyn Authorizer,
        oracle: &dyn PriceOracle,
        ctx: &TxContext,
        asset: Address,
        amount: u128,
    ) -> Result<()> {
        self.require_depositor(auth, &ctx.caller)?;
        self.ensure_active()?;

        self.non_reentrant("deposit", |treasury| {
            treasury.credit(oracle, ctx, &asset, amount, false)?;
            tracing::info!(asset = %asset.short(), amount, "reserve deposited");
            treasury.add_event(ProtocolEvent::ReserveDeposited(ReserveDepositedEvent {
                asset,
                amount,
                depositor: ctx.caller,
                block_height: ctx.block_height,
                timestamp: ctx.timestamp,
            }));
            Ok(())
        })
    }

    /// Credit routed yield to both the balance and the distributable pool
    pub fn receive_yield(
        &mut self,
        auth: &dyn Authorizer,
        oracle: &dyn PriceOracle,
        ctx: &TxContext,
        asset: Address,
        amount: u128,
    ) -> Result<()> {
        self.require_depositor(auth, &ctx.caller)?;
        self.ensure_active()?;

        self.non_reentrant("receive_yield", |treasury| {
            let accumulated = treasury.credit(oracle, ctx, &asset, amount, true)?;
            tracing::debug!(asset = %asset.short(), amount, accumulated, "yield received");
            treasury.add_event(ProtocolEvent::YieldReceived(YieldReceivedEvent {
                asset,
                amount,
                accumulated,
                block_height: ctx.block_height,
                timestamp: ctx.timestamp,
            }));
            Ok(())
        })
    }

    fn credit(
        &mut self,
        oracle: &dyn PriceOracle,
        ctx: &TxContext,
        asset: &Address,
        amount: u128,
        is_yield: bool,
    ) -> Result<u128> {
        validate_non_zero(amount)?;
        let reserve = self.reserve_mut(asset)?;
        reserve.balance = safe_add(reserve.balance, amount)?;
        if is_yield {
            reserve.accumulated_yield = safe_add(reserve.accumulated_yield, amount)?;
        }
        let accumulated = reserve.accumulated_yield;
        self.refresh_totals(oracle, ctx.timestamp)?;
        Ok(accumulated)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // WITHDRAWALS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Queue a withdrawal; timelocked when its USD share of reserves exceeds
    /// the single-withdrawal cap
    #[allow(clippy::too_many_arguments)]
    pub fn queue_withdrawal(
        &mut self,
        auth: &dyn Authorizer,
        oracle: &dyn PriceOracle,
        ctx: &TxContext,
        asset: Address,
        amount: u128,
        recipient: Address,
        reason: impl Into<String>,
    ) -> Result<OperationId> {
        require_role(auth, Role::Manager, &ctx.caller)?;
        self.ensure_active()?;
        validate_address(&recipient, "recipient")?;
        validate_non_zero(amount)?;

        let reserve = self.reserve(&asset)?;
        if amount > reserve.balance {
            return Err(Error::InsufficientReserves {
                required: amount,
                available: reserve.balance,
            });
        }

        let value = reserve.value_of(oracle, amount, ctx.timestamp, self.max_price_age)?;
        let total = self.compute_total(oracle, ctx.timestamp)?;
        let share_bps = if total == 0 {
            BPS_DIVISOR
        } else {
            ratio_bps(value, total)?
        };

        let execute_after = if share_bps > self.params.max_single_withdrawal_bps {
            ctx.timestamp.saturating_add(self.params.timelock_secs)
        } else {
            ctx.timestamp
        };

        let id = self.pending.queue(PendingOperation {
            kind: OperationKind::Withdrawal,
            asset,
            amount,
            recipient,
            queued_at: ctx.timestamp,
            execute_after,
            executed: false,
            reason: reason.into(),
        })?;

        tracing::info!(id = %id.short(), share_bps, execute_after, "withdrawal queued");
        self.add_event(ProtocolEvent::OperationQueued(OperationQueuedEvent {
            id,
            kind: OperationKind::Withdrawal,
            asset,
            amount,
            recipient,
            execute_after,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
        Ok(id)
    }

    /// Execute a queued withdrawal once its timelock has passed.
    ///
    /// The reserve ratio is checked against `outstanding_supply` at current
    /// prices, not at the prices seen when the withdrawal was queued.
    pub fn execute_withdrawal(
        &mut self,
        auth: &dyn Authorizer,
        oracle: &dyn PriceOracle,
        ctx: &TxContext,
        outstanding_supply: u128,
        id: &OperationId,
    ) -> Result<()> {
        require_any_role(auth, &[Role::Manager, Role::Governor], &ctx.caller)?;
        self.ensure_active()?;

        self.non_reentrant("execute_withdrawal", |treasury| {
            let operation = treasury.pending.check_executable(id, ctx.timestamp)?.clone();
            let reserve = treasury.reserve(&operation.asset)?;
            if operation.amount > reserve.balance {
                return Err(Error::InsufficientReserves {
                    required: operation.amount,
                    available: reserve.balance,
                });
            }

            let value = reserve.value_of(oracle, operation.amount, ctx.timestamp, treasury.max_price_age)?;
            let total = treasury.compute_total(oracle, ctx.timestamp)?;
            if outstanding_supply > 0 {
                let ratio = ratio_bps(total.saturating_sub(value), outstanding_supply)?;
                if ratio < treasury.params.min_reserve_ratio_bps {
                    tracing::warn!(
                        id = %id.short(),
                        ratio_bps = ratio,
                        minimum_bps = treasury.params.min_reserve_ratio_bps,
                        "withdrawal would breach reserve ratio"
                    );
                    return Err(Error::ReserveRatioTooLow {
                        ratio_bps: ratio,
                        minimum_bps: treasury.params.min_reserve_ratio_bps,
                    });
                }
            }

            treasury.pending.mark_executed(id, ctx.timestamp)?;
            let reserve = treasury.reserve_mut(&operation.asset)?;
            reserve.balance = safe_sub(reserve.balance, operation.amount)?;
            treasury.refresh_totals(oracle, ctx.timestamp)?;

            tracing::info!(
                id = %id.short(),
                asset = %operation.asset.short(),
                amount = operation.amount,
                "withdrawal executed"
            );
            treasury.add_event(ProtocolEvent::OperationExecuted(OperationExecutedEvent {
                id: *id,
                block_height: ctx.block_height,
                timestamp: ctx.timestamp,
            }));
            treasury.add_event(ProtocolEvent::ReserveWithdrawn(ReserveWithdrawnEvent {
                asset: operation.asset,
                amount: operation.amount,
                recipient: operation.recipient,
                block_height: ctx.block_height,
                timestamp: ctx.timestamp,
            }));
            Ok(())
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PEG DEFENSE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Deploy reserves worth `stable_amount` USD against a detected depeg.
    ///
    /// Stable-classified assets are drawn first, then the rest, each in
    /// registration order. Returns the USD value deployed.
    pub fn emergency_depeg_intervention(
        &mut self,
        auth: &dyn Authorizer,
        oracle: &dyn PriceOracle,
        depeg: &dyn DepegSignal,
        ctx: &TxContext,
        stable_amount: u128,
    ) -> Result<u128> {
        require_role(auth, Role::Emergency, &ctx.caller)?;
        self.ensure_active()?;

        self.non_reentrant("emergency_depeg_intervention", |treasury| {
            let now = ctx.timestamp;
            if let Some(last) = treasury.last_intervention {
                let next_allowed = last.saturating_add(treasury.params.min_intervention_interval_secs);
                if now < next_allowed {
                    return Err(Error::InterventionTooSoon { next_allowed, now });
                }
            }
            validate_non_zero(stable_amount)?;

            let status = depeg.check(oracle, now, treasury.params.depeg_threshold_bps)?;
            if !status.depegged {
                return Err(Error::NoDepegDetected {
                    deviation_bps: status.deviation_bps,
                });
            }

            let total = treasury.compute_total(oracle, now)?;
            if total < stable_amount {
                return Err(Error::InsufficientReserves {
                    required: stable_amount,
                    available: total,
                });
            }

            let mut remaining = stable_amount;
            for stable_pass in [true, false] {
                let order = treasury.asset_order.clone();
                for asset in order {
                    if remaining == 0 {
                        break;
                    }
                    let max_age = treasury.max_price_age;
                    let reserve = treasury.reserve_mut(&asset)?;
                    if reserve.is_stable != stable_pass || reserve.balance == 0 {
                        continue;
                    }
                    let value = reserve.balance_value(oracle, now, max_age)?;
                    if value == 0 {
                        continue;
                    }
                    let to_use = remaining.min(value);
                    let units = safe_mul_div(to_use, reserve.balance, value)?;
                    reserve.balance = safe_sub(reserve.balance, units)?;
                    remaining -= to_use;
                }
            }

            if remaining > 0 {
                return Err(Error::InsufficientReserves {
                    required: stable_amount,
                    available: stable_amount - remaining,
                });
            }

            treasury.last_intervention = Some(now);
            treasury.refresh_totals(oracle, now)?;

            tracing::warn!(
                stable_amount,
                deviation_bps = status.deviation_bps,
                "depeg intervention executed"
            );
            treasury.add_event(ProtocolEvent::DepegIntervention(DepegInterventionEvent {
                stable_amount,
                deviation_bps: status.deviation_bps,
                usd_deployed: stable_amount,
                block_height: ctx.block_height,
                timestamp: now,
            }));
            Ok(stable_amount)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // YIELD
    // ═══════════════════════════════════════════════════════════════════════════

    /// Distribute accumulated yield: burn its USD value in stable units held
    /// by the treasury, or release the asset to the caller
    #[allow(clippy::too_many_arguments)]
    pub fn distribute_yield(
        &mut self,
        auth: &dyn Authorizer,
        oracle: &dyn PriceOracle,
        token: &mut StableToken,
        ctx: &TxContext,
        asset: Address,
        amount: u128,
        burn_stable: bool,
    ) -> Result<()> {
        require_role(auth, Role::Governor, &ctx.caller)?;
        self.ensure_active()?;

        self.non_reentrant("distribute_yield", |treasury| {
            validate_non_zero(amount)?;
            let max_age = treasury.max_price_age;
            let own = ctx.as_caller(treasury.address);
            let reserve = treasury.reserve_mut(&asset)?;
            if amount > reserve.accumulated_yield {
                return Err(Error::InsufficientYield {
                    requested: amount,
                    available: reserve.accumulated_yield,
                });
            }

            let (stable_burned, recipient) = if burn_stable {
                let stable = reserve.value_of(oracle, amount, ctx.timestamp, max_age)?;
                token.burn(auth, &own, stable)?;
                (stable, Address::ZERO)
            } else {
                if amount > reserve.balance {
                    return Err(Error::InsufficientReserves {
                        required: amount,
                        available: reserve.balance,
                    });
                }
                reserve.balance -= amount;
                (0, ctx.caller)
            };
            reserve.accumulated_yield -= amount;
            treasury.refresh_totals(oracle, ctx.timestamp)?;

            tracing::info!(asset = %asset.short(), amount, stable_burned, "yield distributed");
            treasury.add_event(ProtocolEvent::YieldDistributed(YieldDistributedEvent {
                asset,
                amount,
                stable_burned,
                recipient,
                block_height: ctx.block_height,
                timestamp: ctx.timestamp,
            }));
            Ok(())
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ADMINISTRATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register a reserve asset
    pub fn add_supported_asset(
        &mut self,
        auth: &dyn Authorizer,
        ctx: &TxContext,
        asset: Address,
        price_feed: Address,
        target_allocation_bps: u128,
        is_stable: bool,
    ) -> Result<()> {
        require_role(auth, Role::Admin, &ctx.caller)?;
        validate_address(&asset, "asset")?;
        validate_address(&price_feed, "price_feed")?;
        validate_bps(target_allocation_bps, "target_allocation_bps")?;
        if self.assets.contains_key(&asset) {
            return Err(Error::AssetAlreadySupported(asset.to_hex()));
        }

        self.assets.insert(
            asset,
            ReserveAsset::new(price_feed, target_allocation_bps, is_stable, ctx.timestamp),
        );
        self.asset_order.push(asset);

        tracing::info!(asset = %asset.short(), target_allocation_bps, is_stable, "reserve asset added");
        self.add_event(ProtocolEvent::ReserveAssetAdded(ReserveAssetAddedEvent {
            asset,
            target_allocation_bps,
            is_stable,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
        Ok(())
    }

    /// Change an asset's allocation target; manager or admin
    pub fn rebalance_asset(
        &mut self,
        auth: &dyn Authorizer,
        oracle: &dyn PriceOracle,
        ctx: &TxContext,
        asset: Address,
        new_target_bps: u128,
    ) -> Result<()> {
        require_any_role(auth, &[Role::Manager, Role::Admin], &ctx.caller)?;
        validate_bps(new_target_bps, "target_allocation_bps")?;

        let reserve = self.reserve_mut(&asset)?;
        let old_target_bps = reserve.target_allocation_bps;
        reserve.target_allocation_bps = new_target_bps;
        reserve.last_rebalance_time = ctx.timestamp;
        self.refresh_totals(oracle, ctx.timestamp)?;

        self.add_event(ProtocolEvent::AllocationTargetUpdated(AllocationTargetUpdatedEvent {
            asset,
            old_target_bps,
            new_target_bps,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
        Ok(())
    }

    /// Halt fund movements; emergency role
    pub fn activate_circuit_breaker(
        &mut self,
        auth: &dyn Authorizer,
        ctx: &TxContext,
        reason: &str,
    ) -> Result<()> {
        require_role(auth, Role::Emergency, &ctx.caller)?;
        self.circuit_breaker_active = true;
        tracing::warn!(reason, by = %ctx.caller.short(), "treasury circuit breaker activated");
        self.add_event(ProtocolEvent::TreasuryCircuitBreakerActivated(PauseChangedEvent {
            paused: true,
            by: ctx.caller,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
        Ok(())
    }

    /// Resume fund movements; admin role
    pub fn deactivate_circuit_breaker(&mut self, auth: &dyn Authorizer, ctx: &TxContext) -> Result<()> {
        require_role(auth, Role::Admin, &ctx.caller)?;
        self.circuit_breaker_active = false;
        tracing::info!(by = %ctx.caller.short(), "treasury circuit breaker deactivated");
        self.add_event(ProtocolEvent::TreasuryCircuitBreakerDeactivated(PauseChangedEvent {
            paused: false,
            by: ctx.caller,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
        Ok(())
    }

    /// Change reserve policy; admin role
    pub fn update_reserve_parameters(
        &mut self,
        auth: &dyn Authorizer,
        ctx: &TxContext,
        emergency_reserve_bps: u128,
        min_reserve_ratio_bps: u128,
        depeg_threshold_bps: u128,
    ) -> Result<()> {
        require_role(auth, Role::Admin, &ctx.caller)?;
        validate_bps(emergency_reserve_bps, "emergency_reserve_bps")?;
        validate_bps_max(min_reserve_ratio_bps, MAX_MIN_RESERVE_RATIO_BPS, "min_reserve_ratio_bps")?;
        validate_bps_max(depeg_threshold_bps, MAX_DEPEG_THRESHOLD_BPS, "depeg_threshold_bps")?;

        self.params.emergency_reserve_bps = emergency_reserve_bps;
        self.params.min_reserve_ratio_bps = min_reserve_ratio_bps;
        self.params.depeg_threshold_bps = depeg_threshold_bps;

        tracing::info!(
            emergency_reserve_bps,
            min_reserve_ratio_bps,
            depeg_threshold_bps,
            "reserve parameters updated"
        );
        self.add_event(ProtocolEvent::ReserveParametersUpdated(ReserveParametersUpdatedEvent {
            emergency_reserve_bps,
            min_reserve_ratio_bps,
            depeg_threshold_bps,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
        Ok(())
    }

    /// Designate the account allowed to deposit yield; admin role
    pub fn set_yield_router(&mut self, auth: &dyn Authorizer, ctx: &TxContext, router: Address) -> Result<()> {
        require_role(auth, Role::Admin, &ctx.caller)?;
        validate_address(&router, "router")?;
        self.yield_router = router;
        self.add_event(ProtocolEvent::YieldRouterUpdated(YieldRouterUpdatedEvent {
            router,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Identity of the treasury
    pub fn address(&self) -> Address {
        self.address
    }

    /// Reserve asset with its allocation recomputed at current prices
    pub fn reserve_info(&self, oracle: &dyn PriceOracle, asset: &Address, now: u64) -> Result<ReserveAsset> {
        let mut info = self.reserve(asset)?.clone();
        let total = self.compute_total(oracle, now)?;
        let value = info.balance_value(oracle, now, self.max_price_age)?;
        info.update_allocation(value, total)?;
        Ok(info)
    }

    /// USD value of all reserves at current prices
    pub fn total_reserves_usd(&self, oracle: &dyn PriceOracle, now: u64) -> Result<u128> {
        self.compute_total(oracle, now)
    }

    /// USD value of all reserves at the last recomputation
    pub fn last_total_reserves_usd(&self) -> u128 {
        self.total_reserves_usd
    }

    /// Reserves over `outstanding_supply` in bps
    pub fn reserve_ratio_bps(&self, oracle: &dyn PriceOracle, outstanding_supply: u128, now: u64) -> Result<u128> {
        ratio_bps(self.compute_total(oracle, now)?, outstanding_supply)
    }

    /// Portion of reserves earmarked for emergencies
    pub fn emergency_reserve_usd(&self, oracle: &dyn PriceOracle, now: u64) -> Result<u128> {
        bps_of(self.compute_total(oracle, now)?, self.params.emergency_reserve_bps)
    }

    /// A pending operation
    pub fn pending_operation(&self, id: &OperationId) -> Option<&PendingOperation> {
        self.pending.get(id)
    }

    /// Operations executable at `now`
    pub fn pending_operations_ready(&self, now: u64) -> Vec<OperationId> {
        self.pending.ready(now)
    }

    /// Registered assets in registration order
    pub fn supported_assets(&self) -> &[Address] {
        &self.asset_order
    }

    /// Current reserve policy
    pub fn params(&self) -> &TreasuryParams {
        &self.params
    }

    /// Whether fund movements are halted
    pub fn is_circuit_breaker_active(&self) -> bool {
        self.circuit_breaker_active
    }

    /// Account allowed to deposit yield
    pub fn yield_router(&self) -> Address {
        self.yield_router
    }

    /// Time of the last depeg intervention
    pub fn last_intervention(&self) -> Option<u64> {
        self.last_intervention
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

    fn require_depositor(&self, auth: &dyn Authorizer, caller: &Address) -> Result<()> {
        if !self.yield_router.is_zero() && *caller == self.yield_router {
            return Ok(());
        }
        require_role(auth, Role::Manager, caller)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.circuit_breaker_active {
            return Err(Error::TreasuryHalted);
        }
        Ok(())
    }

    fn reserve(&self, asset: &Address) -> Result<&ReserveAsset> {
        self.assets
            .get(asset)
            .filter(|r| r.supported)
            .ok_or_else(|| Error::UnsupportedAsset(asset.to_hex()))
    }

    fn reserve_mut(&mut self, asset: &Address) -> Result<&mut ReserveAsset> {
        self.assets
            .get_mut(asset)
            .filter(|r| r.supported)
            .ok_or_else(|| Error::UnsupportedAsset(asset.to_hex()))
    }

    /// Per-asset values at current prices, in registration order
    fn asset_values(&self, oracle: &dyn PriceOracle, now: u64) -> Result<Vec<(Address, u128)>> {
        self.asset_order
            .iter()
            .map(|asset| {
                let reserve = self.reserve(asset)?;
                Ok((*asset, reserve.balance_value(oracle, now, self.max_price_age)?))
            })
            .collect()
    }

    fn compute_total(&self, oracle: &dyn PriceOracle, now: u64) -> Result<u128> {
        self.asset_values(oracle, now)?
            .iter()
            .try_fold(0u128, |acc, (_, value)| safe_add(acc, *value))
    }

    /// Recompute the total and every allocation from current prices
    fn refresh_totals(&mut self, oracle: &dyn PriceOracle, now: u64) -> Result<u128> {
        let values = self.asset_values(oracle, now)?;
        let total = values
            .iter()
            .try_fold(0u128, |acc, (_, value)| safe_add(acc, *value))?;

        for (asset, value) in values {
            if let Some(reserve) = self.assets.get_mut(&asset) {
                reserve.update_allocation(value, total)?;
            }
        }
        self.total_reserves_usd = total;
        Ok(total)
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

    /// Hash of balances, yields and flags
    pub fn state_hash(&self) -> Hash {
        let mut data = Vec::new();
        for asset in &self.asset_order {
            if let Some(reserve) = self.assets.get(asset) {
                data.extend_from_slice(asset.as_bytes());
                data.extend_from_slice(&reserve.balance.to_be_bytes());
                data.extend_from_slice(&reserve.accumulated_yield.to_be_bytes());
                data.extend_from_slice(&reserve.target_allocation_bps.to_be_bytes());
            }
        }
        data.push(self.circuit_breaker_active as u8);
        data.extend_from_slice(&self.last_intervention.unwrap_or(0).to_be_bytes());
        Hash::sha256(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::RoleRegistry;
    use crate::core::config::SupplyParams;
    use crate::oracle::{FixedDepegSignal, StaticPriceOracle};

    const NOW: u64 = 1_000_000;

    fn admin() -> Address {
        Address::derive("admin")
    }

    fn usdc() -> Address {
        Address::derive("usdc")
    }

    fn weth() -> Address {
        Address::derive("weth")
    }

    fn ctx(timestamp: u64) -> TxContext {
        TxContext::new(admin(), timestamp, 1)
    }

    struct Fixture {
        treasury: TreasuryReserveManager,
        auth: RoleRegistry,
        oracle: StaticPriceOracle,
    }

    fn setup() -> Fixture {
        let auth = RoleRegistry::with_admin(admin());
        let mut oracle = StaticPriceOracle::new();
        oracle.set_price(Address::derive("usdc-usd"), 1_0000_0000, 8, NOW);
        oracle.set_price(Address::derive("eth-usd"), 2000_0000_0000, 8, NOW);

        let mut treasury =
            TreasuryReserveManager::new(Address::derive("treasury"), &TreasuryParams::default(), 3600);
        treasury
            .add_supported_asset(&auth, &ctx(NOW), usdc(), Address::derive("usdc-usd"), 4000, true)
            .unwrap();
        treasury
            .add_supported_asset(&auth, &ctx(NOW), weth(), Address::derive("eth-usd"), 3000, false)
            .unwrap();

        Fixture { treasury, auth, oracle }
    }

    #[test]
    fn test_deposit_updates_totals_and_allocation() {
        let Fixture { mut treasury, auth, oracle } = setup();

        treasury.deposit(&auth, &oracle, &ctx(NOW), usdc(), 6000 * WAD).unwrap();
        treasury.deposit(&auth, &oracle, &ctx(NOW), weth(), 2 * WAD).unwrap();

        assert_eq!(treasury.total_reserves_usd(&oracle, NOW).unwrap(), 10_000 * WAD);
        assert_eq!(treasury.last_total_reserves_usd(), 10_000 * WAD);
        let info = treasury.reserve_info(&oracle, &usdc(), NOW).unwrap();
        assert_eq!(info.current_allocation_bps, 6000);
        assert_eq!(info.target_allocation_bps, 4000);
    }

    #[test]
    fn test_deposit_authorization() {
        let Fixture { mut treasury, auth, oracle } = setup();
        let router = Address::derive("engine");
        let as_router = TxContext::new(router, NOW, 1);

        assert!(matches!(
            treasury.deposit(&auth, &oracle, &as_router, usdc(), WAD),
            Err(Error::Unauthorized { .. })
        ));

        treasury.set_yield_router(&auth, &ctx(NOW), router).unwrap();
        treasury.deposit(&auth, &oracle, &as_router, usdc(), WAD).unwrap();
        treasury.receive_yield(&auth, &oracle, &as_router, usdc(), WAD).unwrap();

        let info = treasury.reserve_info(&oracle, &usdc(), NOW).unwrap();
        assert_eq!(info.balance, 2 * WAD);
        assert_eq!(info.accumulated_yield, WAD);
    }

    #[test]
    fn test_duplicate_and_unsupported_assets() {
        let Fixture { mut treasury, auth, oracle } = setup();
        assert!(matches!(
            treasury.add_supported_asset(&auth, &ctx(NOW), usdc(), Address::derive("x"), 0, true),
            Err(Error::AssetAlreadySupported(_))
        ));
        assert!(matches!(
            treasury.deposit(&auth, &oracle, &ctx(NOW), Address::derive("dai"), WAD),
            Err(Error::UnsupportedAsset(_))
        ));
        assert!(treasury
            .add_supported_asset(&auth, &ctx(NOW), Address::derive("dai"), Address::derive("x"), 10_001, true)
            .is_err());
    }

    #[test]
    fn test_small_withdrawal_is_immediate() {
        let Fixture { mut treasury, auth, oracle } = setup();
        treasury.deposit(&auth, &oracle, &ctx(NOW), usdc(), 10_000 * WAD).unwrap();

        // 10% exactly is not above the cap
        let id = treasury
            .queue_withdrawal(&auth, &oracle, &ctx(NOW), usdc(), 1000 * WAD, admin(), "ops")
            .unwrap();
        assert_eq!(treasury.pending_operation(&id).unwrap().execute_after, NOW);
        assert_eq!(treasury.pending_operations_ready(NOW), vec![id]);

        treasury.execute_withdrawal(&auth, &oracle, &ctx(NOW), 0, &id).unwrap();
        assert_eq!(treasury.reserve_info(&oracle, &usdc(), NOW).unwrap().balance, 9000 * WAD);
    }

    #[test]
    fn test_large_withdrawal_is_timelocked() {
        let Fixture { mut treasury, auth, oracle } = setup();
        treasury.deposit(&auth, &oracle, &ctx(NOW), usdc(), 10_000 * WAD).unwrap();

        let id = treasury
            .queue_withdrawal(&auth, &oracle, &ctx(NOW), usdc(), 1001 * WAD, admin(), "ops")
            .unwrap();
        let execute_after = NOW + DEFAULT_TIMELOCK_SECS;
        assert_eq!(treasury.pending_operation(&id).unwrap().execute_after, execute_after);

        let early = treasury.execute_withdrawal(&auth, &oracle, &ctx(execute_after - 1), 0, &id);
        assert!(matches!(early, Err(Error::TimelockNotExpired { .. })));
        assert!(early.unwrap_err().is_retryable());
    }

    #[test]
    fn test_queue_rejects_overdraw() {
        let Fixture { mut treasury, auth, oracle } = setup();
        treasury.deposit(&auth, &oracle, &ctx(NOW), usdc(), 10 * WAD).unwrap();
        assert!(matches!(
            treasury.queue_withdrawal(&auth, &oracle, &ctx(NOW), usdc(), 11 * WAD, admin(), "x"),
            Err(Error::InsufficientReserves { .. })
        ));
    }

    #[test]
    fn test_reserve_ratio_checked_at_execution() {
        let Fixture { mut treasury, auth, oracle } = setup();
        treasury.deposit(&auth, &oracle, &ctx(NOW), usdc(), 12_000 * WAD).unwrap();

        let id = treasury
            .queue_withdrawal(&auth, &oracle, &ctx(NOW), usdc(), 1000 * WAD, admin(), "ops")
            .unwrap();

        // 11_000 / 10_000 supply is exactly the minimum
        treasury.execute_withdrawal(&auth, &oracle, &ctx(NOW), 10_000 * WAD, &id).unwrap();

        let id = treasury
            .queue_withdrawal(&auth, &oracle, &ctx(NOW), usdc(), WAD, admin(), "ops")
            .unwrap();
        assert!(matches!(
            treasury.execute_withdrawal(&auth, &oracle, &ctx(NOW), 10_000 * WAD, &id),
            Err(Error::ReserveRatioTooLow { .. })
        ));
    }

    #[test]
    fn test_intervention() {
        let Fixture { mut treasury, auth, oracle } = setup();
        treasury.deposit(&auth, &oracle, &ctx(NOW), usdc(), 1000 * WAD).unwrap();
        treasury.deposit(&auth, &oracle, &ctx(NOW), weth(), WAD).unwrap();

        let calm = FixedDepegSignal::new(100);
        assert!(matches!(
            treasury.emergency_depeg_intervention(&auth, &oracle, &calm, &ctx(NOW), 100 * WAD),
            Err(Error::NoDepegDetected { deviation_bps: 100 })
        ));

        let depegged = FixedDepegSignal::new(800);
        let deployed = treasury
            .emergency_depeg_intervention(&auth, &oracle, &depegged, &ctx(NOW), 1500 * WAD)
            .unwrap();
        assert_eq!(deployed, 1500 * WAD);

        // stable asset drained first, the rest from WETH
        assert_eq!(treasury.reserve_info(&oracle, &usdc(), NOW).unwrap().balance, 0);
        assert_eq!(treasury.reserve_info(&oracle, &weth(), NOW).unwrap().balance, WAD * 3 / 4);

        let again = treasury.emergency_depeg_intervention(&auth, &oracle, &depegged, &ctx(NOW + 10), WAD);
        assert!(matches!(again, Err(Error::InterventionTooSoon { .. })));

        let later = NOW + DEFAULT_MIN_INTERVENTION_INTERVAL_SECS;
        let mut oracle = oracle;
        oracle.refresh_all(later);
        assert!(matches!(
            treasury.emergency_depeg_intervention(&auth, &oracle, &depegged, &ctx(later), 2000 * WAD),
            Err(Error::InsufficientReserves { .. })
        ));
    }

    #[test]
    fn test_circuit_breaker_halts_fund_movements() {
        let Fixture { mut treasury, auth, oracle } = setup();
        treasury.activate_circuit_breaker(&auth, &ctx(NOW), "incident").unwrap();

        assert!(matches!(
            treasury.deposit(&auth, &oracle, &ctx(NOW), usdc(), WAD),
            Err(Error::TreasuryHalted)
        ));
        assert!(matches!(
            treasury.emergency_depeg_intervention(&auth, &oracle, &FixedDepegSignal::new(900), &ctx(NOW), WAD),
            Err(Error::TreasuryHalted)
        ));

        treasury.deactivate_circuit_breaker(&auth, &ctx(NOW)).unwrap();
        treasury.deposit(&auth, &oracle, &ctx(NOW), usdc(), WAD).unwrap();
    }

    #[test]
    fn test_distribute_yield_release_and_burn() {
        let Fixture { mut treasury, mut auth, oracle } = setup();
        let mut token = StableToken::new(Address::derive("synthusd"), &SupplyParams::default());
        auth.grant_role(&admin(), Role::Minter, treasury.address()).unwrap();

        treasury.receive_yield(&auth, &oracle, &ctx(NOW), usdc(), 100 * WAD).unwrap();
        assert!(matches!(
            treasury.distribute_yield(&auth, &oracle, &mut token, &ctx(NOW), usdc(), 101 * WAD, false),
            Err(Error::InsufficientYield { .. })
        ));

        treasury
            .distribute_yield(&auth, &oracle, &mut token, &ctx(NOW), usdc(), 40 * WAD, false)
            .unwrap();
        let info = treasury.reserve_info(&oracle, &usdc(), NOW).unwrap();
        assert_eq!(info.balance, 60 * WAD);
        assert_eq!(info.accumulated_yield, 60 * WAD);

        // burning needs stable units held by the treasury
        assert!(matches!(
            treasury.distribute_yield(&auth, &oracle, &mut token, &ctx(NOW), usdc(), 10 * WAD, true),
            Err(Error::InsufficientBalance { .. })
        ));

        token.mint(&auth, &ctx(NOW), treasury.address(), 50 * WAD).unwrap();
        treasury
            .distribute_yield(&auth, &oracle, &mut token, &ctx(NOW), usdc(), 10 * WAD, true)
            .unwrap();
        assert_eq!(token.balance_of(&treasury.address()), 40 * WAD);
        assert_eq!(treasury.reserve_info(&oracle, &usdc(), NOW).unwrap().balance, 60 * WAD);
    }

    #[test]
    fn test_update_reserve_parameters_bounds() {
        let Fixture { mut treasury, auth, .. } = setup();
        treasury.update_reserve_parameters(&auth, &ctx(NOW), 2500, 12_000, 300).unwrap();
        assert_eq!(treasury.params().min_reserve_ratio_bps, 12_000);

        assert!(treasury.update_reserve_parameters(&auth, &ctx(NOW), 2500, 12_000, 1001).is_err());
        assert!(treasury.update_reserve_parameters(&auth, &ctx(NOW), 10_001, 12_000, 300).is_err());
        assert!(treasury.update_reserve_parameters(&auth, &ctx(NOW), 2500, 50_001, 300).is_err());
    }

    #[test]
    fn test_emergency_reserve_and_ratio() {
        let Fixture { mut treasury, auth, oracle } = setup();
        treasury.deposit(&auth, &oracle, &ctx(NOW), usdc(), 10_000 * WAD).unwrap();

        assert_eq!(treasury.emergency_reserve_usd(&oracle, NOW).unwrap(), 2000 * WAD);
        assert_eq!(treasury.reserve_ratio_bps(&oracle, 5000 * WAD, NOW).unwrap(), 20_000);
        assert_eq!(treasury.reserve_ratio_bps(&oracle, 0, NOW).unwrap(), u128::MAX);
    }
}
