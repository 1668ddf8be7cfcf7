//! Protocol state machine - atomic transaction substrate.
//!
//! [`Protocol`] owns the supply controller, the collateral engine, the
//! treasury and their external collaborators. Every entry point runs inside
//! `transact`: component state is checkpointed first and restored
//! if any step fails, so an operation either commits fully or not at all.
//! Rejections that carry a signal still leave that signal in the event log.

use serde::{Deserialize, Serialize};

use crate::access::{Authorizer, Role, RoleRegistry};
use crate::core::config::ProtocolConfig;
use crate::core::engine::{Collaborators, CollateralEngine, DepositReceipt, WithdrawReceipt};
use crate::core::position::AssetParams;
use crate::core::token::StableToken;
use crate::error::{Error, Result};
use crate::oracle::{DepegSignal, PriceOracle};
use crate::protocol::events::EventLog;
use crate::protocol::operations::*;
use crate::strategy::YieldStrategy;
use crate::treasury::{OperationId, TreasuryReserveManager};
use crate::utils::crypto::{Address, Hash};

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTION CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Who is calling and when
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxContext {
    /// Principal submitting the call
    pub caller: Address,
    /// Unix timestamp of the enclosing block
    pub timestamp: u64,
    /// Height of the enclosing block
    pub block_height: u64,
}

impl TxContext {
    /// Create a context
    pub fn new(caller: Address, timestamp: u64, block_height: u64) -> Self {
        Self {
            caller,
            timestamp,
            block_height,
        }
    }

    /// Same block, different caller; used when a component calls another
    pub fn as_caller(&self, caller: Address) -> Self {
        Self { caller, ..*self }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENT ADDRESSES
// ═══════════════════════════════════════════════════════════════════════════════

/// Identities the components act under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentAddresses {
    /// Supply controller
    pub token: Address,
    /// Collateral engine
    pub engine: Address,
    /// Treasury
    pub treasury: Address,
}

impl Default for ComponentAddresses {
    fn default() -> Self {
        Self {
            token: Address::derive("synthusd/token"),
            engine: Address::derive("synthusd/engine"),
            treasury: Address::derive("synthusd/treasury"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL
// ═══════════════════════════════════════════════════════════════════════════════

/// The deployed protocol and its collaborators
pub struct Protocol<O, S, A, D> {
    /// Configuration the components were built from
    config: ProtocolConfig,
    /// Supply controller
    token: StableToken,
    /// Collateral engine
    engine: CollateralEngine,
    /// Treasury
    treasury: TreasuryReserveManager,
    /// Price source
    oracle: O,
    /// Yield venue
    strategy: S,
    /// Capability checks
    auth: A,
    /// Peg guard
    depeg: D,
    /// Current block height
    block_height: u64,
    /// Current timestamp
    timestamp: u64,
    /// Committed events and rejection signals
    event_log: EventLog,
}

impl<O, S, D> Protocol<O, S, RoleRegistry, D>
where
    O: PriceOracle,
    S: YieldStrategy + Clone,
    D: DepegSignal,
{
    /// Deploy with an in-memory role registry administered by `admin`.
    ///
    /// The engine and treasury receive the minter capability.
    pub fn with_registry(
        config: ProtocolConfig,
        admin: Address,
        oracle: O,
        strategy: S,
        depeg: D,
    ) -> Result<Self> {
        let addresses = ComponentAddresses::default();
        let mut auth = RoleRegistry::with_admin(admin);
        auth.grant_role(&admin, Role::Minter, addresses.engine)?;
        auth.grant_role(&admin, Role::Minter, addresses.treasury)?;
        Self::new(config, addresses, oracle, strategy, auth, depeg)
    }
}

impl<O, S, A, D> Protocol<O, S, A, D>
where
    O: PriceOracle,
    S: YieldStrategy + Clone,
    A: Authorizer,
    D: DepegSignal,
{
    /// Deploy from a validated configuration. The authorizer must already
    /// grant the minter capability to the engine and treasury identities.
    pub fn new(
        config: ProtocolConfig,
        addresses: ComponentAddresses,
        oracle: O,
        strategy: S,
        auth: A,
        depeg: D,
    ) -> Result<Self> {
        config.validate()?;
        let max_age = config.oracle.max_price_age_secs;

        let token = StableToken::new(addresses.token, &config.supply);
        let engine = CollateralEngine::new(addresses.engine, &config.engine, max_age);
        let treasury = TreasuryReserveManager::new(addresses.treasury, &config.treasury, max_age)
            .with_yield_router(addresses.engine);

        tracing::info!(
            token = %addresses.token.short(),
            engine = %addresses.engine.short(),
            treasury = %addresses.treasury.short(),
            "protocol deployed"
        );

        Ok(Self {
            config,
            token,
            engine,
            treasury,
            oracle,
            strategy,
            auth,
            depeg,
            block_height: 0,
            timestamp: 0,
            event_log: EventLog::new(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BLOCK PROCESSING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Advance the clock; height and time never move backwards
    pub fn begin_block(&mut self, height: u64, timestamp: u64) -> Result<()> {
        if height < self.block_height || timestamp < self.timestamp {
            return Err(Error::InvalidParameter {
                name: "block".into(),
                reason: format!(
                    "({}, {}) precedes current ({}, {})",
                    height, timestamp, self.block_height, self.timestamp
                ),
            });
        }
        self.block_height = height;
        self.timestamp = timestamp;
        tracing::debug!(height, timestamp, "block started");
        Ok(())
    }

    /// Take the events logged so far
    pub fn end_block(&mut self) -> EventLog {
        std::mem::take(&mut self.event_log)
    }

    /// Run `f` as one all-or-nothing transaction on behalf of `caller`
    fn transact<T>(
        &mut self,
        caller: Address,
        operation: &'static str,
        f: impl FnOnce(&mut Self, &TxContext) -> Result<T>,
    ) -> Result<T> {
        let ctx = TxContext::new(caller, self.timestamp, self.block_height);
        let checkpoint = (
            self.token.clone(),
            self.engine.clone(),
            self.treasury.clone(),
            self.strategy.clone(),
        );

        match f(self, &ctx) {
            Ok(value) => {
                self.event_log.extend(self.token.drain_events());
                self.event_log.extend(self.engine.drain_events());
                self.event_log.extend(self.treasury.drain_events());
                Ok(value)
            }
            Err(err) => {
                let (token, engine, treasury, strategy) = checkpoint;
                self.token = token;
                self.engine = engine;
                self.treasury = treasury;
                self.strategy = strategy;

                tracing::warn!(
                    operation,
                    caller = %caller.short(),
                    code = err.code(),
                    error = %err,
                    "transaction rolled back"
                );
                if let Some(signal) = err.signal(ctx.block_height, ctx.timestamp) {
                    self.event_log.push(signal);
                }
                Err(err)
            }
        }
    }

    /// Engine plus the collaborators it orchestrates
    fn engine_parts(&mut self) -> (&mut CollateralEngine, Collaborators<'_>) {
        let Self {
            engine,
            token,
            treasury,
            oracle,
            strategy,
            auth,
            depeg,
            ..
        } = self;
        (
            engine,
            Collaborators {
                oracle: &*oracle,
                strategy,
                token,
                treasury,
                auth: &*auth,
                depeg: &*depeg,
            },
        )
    }

    /// Execute a submitted operation
    pub fn execute(&mut self, caller: Address, op: ProtocolOperation) -> Result<OperationResult> {
        tracing::debug!(operation = op.operation_type(), caller = %caller.short(), "executing");
        match op {
            ProtocolOperation::Deposit(op) => self
                .deposit(caller, op.asset, op.amount)
                .map(OperationResult::Deposited),
            ProtocolOperation::Withdraw(op) => self
                .withdraw(caller, op.asset, op.stable_amount)
                .map(OperationResult::Withdrawn),
            ProtocolOperation::ReserveDeposit(op) => self
                .treasury_deposit(caller, op.asset, op.amount)
                .map(|_| OperationResult::Done),
            ProtocolOperation::QueueWithdrawal(op) => self
                .queue_withdrawal(caller, op.asset, op.amount, op.recipient, op.reason)
                .map(OperationResult::Queued),
            ProtocolOperation::ExecuteWithdrawal(op) => self
                .execute_withdrawal(caller, &op.id)
                .map(|_| OperationResult::Done),
            ProtocolOperation::DepegIntervention(op) => self
                .emergency_depeg_intervention(caller, op.stable_amount)
                .map(OperationResult::InterventionDeployed),
            ProtocolOperation::DistributeYield(op) => self
                .distribute_yield(caller, op.asset, op.amount, op.burn_stable)
                .map(|_| OperationResult::Done),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // COLLATERAL ENGINE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Deposit collateral and mint stable units to `caller`
    pub fn deposit(&mut self, caller: Address, asset: Address, amount: u128) -> Result<DepositReceipt> {
        self.transact(caller, "deposit", |p, ctx| {
            let (engine, mut env) = p.engine_parts();
            engine.deposit(&mut env, ctx, asset, amount)
        })
    }

    /// Burn `caller`'s stable units and withdraw collateral
    pub fn withdraw(&mut self, caller: Address, asset: Address, stable_amount: u128) -> Result<WithdrawReceipt> {
        self.transact(caller, "withdraw", |p, ctx| {
            let (engine, mut env) = p.engine_parts();
            engine.withdraw(&mut env, ctx, asset, stable_amount)
        })
    }

    /// Register a collateral asset
    pub fn add_collateral_asset(&mut self, caller: Address, asset: Address, params: AssetParams) -> Result<()> {
        self.transact(caller, "add_collateral_asset", |p, ctx| {
            p.engine.add_supported_asset(&p.auth, ctx, asset, params)
        })
    }

    /// Change the treasury yield share and the deposit depeg threshold
    pub fn update_engine_parameters(
        &mut self,
        caller: Address,
        treasury_yield_bps: u128,
        emergency_threshold_bps: u128,
    ) -> Result<()> {
        self.transact(caller, "update_engine_parameters", |p, ctx| {
            p.engine
                .update_parameters(&p.auth, ctx, treasury_yield_bps, emergency_threshold_bps)
        })
    }

    /// Halt deposits and withdrawals
    pub fn emergency_pause(&mut self, caller: Address, reason: &str) -> Result<()> {
        self.transact(caller, "emergency_pause", |p, ctx| {
            p.engine.emergency_pause(&p.auth, ctx, reason)
        })
    }

    /// Resume deposits and withdrawals
    pub fn unpause_engine(&mut self, caller: Address) -> Result<()> {
        self.transact(caller, "unpause_engine", |p, ctx| p.engine.unpause(&p.auth, ctx))
    }

    /// Unwind the strategy while the engine is paused
    pub fn emergency_close_strategy(&mut self, caller: Address) -> Result<u128> {
        self.transact(caller, "emergency_close_strategy", |p, ctx| {
            p.engine.emergency_close_strategy(&p.auth, &mut p.strategy, ctx)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SUPPLY CONTROLLER
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mint directly; minter capability
    pub fn mint(&mut self, caller: Address, to: Address, amount: u128) -> Result<()> {
        self.transact(caller, "mint", |p, ctx| p.token.mint(&p.auth, ctx, to, amount))
    }

    /// Burn from a holder; minter capability
    pub fn burn_from(&mut self, caller: Address, from: Address, amount: u128) -> Result<()> {
        self.transact(caller, "burn_from", |p, ctx| {
            p.token.burn_from(&p.auth, ctx, from, amount)
        })
    }

    /// Burn the caller's own stable units; minter capability
    pub fn burn(&mut self, caller: Address, amount: u128) -> Result<()> {
        self.transact(caller, "burn", |p, ctx| p.token.burn(&p.auth, ctx, amount))
    }

    /// Change the supply cap
    pub fn set_supply_cap(&mut self, caller: Address, cap: u128) -> Result<()> {
        self.transact(caller, "set_supply_cap", |p, ctx| {
            p.token.set_supply_cap(&p.auth, ctx, cap)
        })
    }

    /// Change the per-period mint allowance
    pub fn set_rate_limit(&mut self, caller: Address, limit: u128) -> Result<()> {
        self.transact(caller, "set_rate_limit", |p, ctx| {
            p.token.set_rate_limit(&p.auth, ctx, limit)
        })
    }

    /// Halt minting and burning
    pub fn pause_token(&mut self, caller: Address) -> Result<()> {
        self.transact(caller, "pause_token", |p, ctx| p.token.pause(&p.auth, ctx))
    }

    /// Resume minting and burning
    pub fn unpause_token(&mut self, caller: Address) -> Result<()> {
        self.transact(caller, "unpause_token", |p, ctx| p.token.unpause(&p.auth, ctx))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TREASURY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register a reserve asset
    pub fn add_reserve_asset(
        &mut self,
        caller: Address,
        asset: Address,
        price_feed: Address,
        target_allocation_bps: u128,
        is_stable: bool,
    ) -> Result<()> {
        self.transact(caller, "add_reserve_asset", |p, ctx| {
            p.treasury
                .add_supported_asset(&p.auth, ctx, asset, price_feed, target_allocation_bps, is_stable)
        })
    }

    /// Add reserves
    pub fn treasury_deposit(&mut self, caller: Address, asset: Address, amount: u128) -> Result<()> {
        self.transact(caller, "treasury_deposit", |p, ctx| {
            p.treasury.deposit(&p.auth, &p.oracle, ctx, asset, amount)
        })
    }

    /// Queue a reserve withdrawal
    pub fn queue_withdrawal(
        &mut self,
        caller: Address,
        asset: Address,
        amount: u128,
        recipient: Address,
        reason: impl Into<String>,
    ) -> Result<OperationId> {
        let reason = reason.into();
        self.transact(caller, "queue_withdrawal", |p, ctx| {
            p.treasury
                .queue_withdrawal(&p.auth, &p.oracle, ctx, asset, amount, recipient, reason)
        })
    }

    /// Execute a queued withdrawal against the current supply
    pub fn execute_withdrawal(&mut self, caller: Address, id: &OperationId) -> Result<()> {
        self.transact(caller, "execute_withdrawal", |p, ctx| {
            let supply = p.token.total_supply();
            p.treasury.execute_withdrawal(&p.auth, &p.oracle, ctx, supply, id)
        })
    }

    /// Deploy reserves against a detected depeg
    pub fn emergency_depeg_intervention(&mut self, caller: Address, stable_amount: u128) -> Result<u128> {
        self.transact(caller, "emergency_depeg_intervention", |p, ctx| {
            p.treasury
                .emergency_depeg_intervention(&p.auth, &p.oracle, &p.depeg, ctx, stable_amount)
        })
    }

    /// Change an allocation target
    pub fn rebalance_asset(&mut self, caller: Address, asset: Address, new_target_bps: u128) -> Result<()> {
        self.transact(caller, "rebalance_asset", |p, ctx| {
            p.treasury.rebalance_asset(&p.auth, &p.oracle, ctx, asset, new_target_bps)
        })
    }

    /// Halt treasury fund movements
    pub fn activate_circuit_breaker(&mut self, caller: Address, reason: &str) -> Result<()> {
        self.transact(caller, "activate_circuit_breaker", |p, ctx| {
            p.treasury.activate_circuit_breaker(&p.auth, ctx, reason)
        })
    }

    /// Resume treasury fund movements
    pub fn deactivate_circuit_breaker(&mut self, caller: Address) -> Result<()> {
        self.transact(caller, "deactivate_circuit_breaker", |p, ctx| {
            p.treasury.deactivate_circuit_breaker(&p.auth, ctx)
        })
    }

    /// Distribute accumulated yield
    pub fn distribute_yield(&mut self, caller: Address, asset: Address, amount: u128, burn_stable: bool) -> Result<()> {
        self.transact(caller, "distribute_yield", |p, ctx| {
            p.treasury
                .distribute_yield(&p.auth, &p.oracle, &mut p.token, ctx, asset, amount, burn_stable)
        })
    }

    /// Change reserve policy
    pub fn update_reserve_parameters(
        &mut self,
        caller: Address,
        emergency_reserve_bps: u128,
        min_reserve_ratio_bps: u128,
        depeg_threshold_bps: u128,
    ) -> Result<()> {
        self.transact(caller, "update_reserve_parameters", |p, ctx| {
            p.treasury.update_reserve_parameters(
                &p.auth,
                ctx,
                emergency_reserve_bps,
                min_reserve_ratio_bps,
                depeg_threshold_bps,
            )
        })
    }

    /// Designate the account allowed to deposit yield into the treasury
    pub fn set_yield_router(&mut self, caller: Address, router: Address) -> Result<()> {
        self.transact(caller, "set_yield_router", |p, ctx| {
            p.treasury.set_yield_router(&p.auth, ctx, router)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Configuration the protocol was deployed with
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Supply controller
    pub fn token(&self) -> &StableToken {
        &self.token
    }

    /// Collateral engine
    pub fn engine(&self) -> &CollateralEngine {
        &self.engine
    }

    /// Treasury
    pub fn treasury(&self) -> &TreasuryReserveManager {
        &self.treasury
    }

    /// Price source
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Price source, for hosts that push quotes
    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    /// Yield venue
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Capability checks
    pub fn auth(&self) -> &A {
        &self.auth
    }

    /// Capability checks, for hosts that manage roles
    pub fn auth_mut(&mut self) -> &mut A {
        &mut self.auth
    }

    /// Peg guard, for hosts that reconfigure it
    pub fn depeg_mut(&mut self) -> &mut D {
        &mut self.depeg
    }

    /// Current block height
    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    /// Current timestamp
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Events logged since the last `end_block`
    pub fn events(&self) -> &EventLog {
        &self.event_log
    }

    /// Value currently held by the strategy
    pub fn strategy_position_value(&self) -> u128 {
        self.strategy.position_value()
    }

    /// Treasury reserves over outstanding supply at current prices
    pub fn reserve_ratio_bps(&self) -> Result<u128> {
        self.treasury
            .reserve_ratio_bps(&self.oracle, self.token.total_supply(), self.timestamp)
    }

    /// A user's collateralization at current prices
    pub fn collateralization_ratio_bps(&self, user: &Address) -> Result<u128> {
        self.engine
            .collateralization_ratio_bps(&self.oracle, user, self.timestamp)
    }

    /// Combined hash of token, engine and treasury state
    pub fn state_hash(&self) -> Hash {
        let mut data = Vec::with_capacity(3 * 32 + 8);
        data.extend_from_slice(self.token.state_hash().as_bytes());
        data.extend_from_slice(self.engine.state_hash().as_bytes());
        data.extend_from_slice(self.treasury.state_hash().as_bytes());
        data.extend_from_slice(&self.block_height.to_be_bytes());
        Hash::sha256(&data)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
