//! Protocol events for state change notifications.
//!
//! Every committed state change emits an event. Events raised inside an
//! operation that is later rejected are discarded with the rest of its state,
//! except the signal events an [`Error`](crate::error::Error) carries.

use serde::{Deserialize, Serialize};

use crate::treasury::timelock::OperationKind;
use crate::utils::crypto::{Address, Hash};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

macro_rules! protocol_events {
    ($( $(#[$doc:meta])* $variant:ident($event:ident), )+) => {
        /// All protocol event types
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub enum ProtocolEvent {
            $( $(#[$doc])* $variant($event), )+
        }

        impl ProtocolEvent {
            /// Get the event type as a string
            pub fn event_type(&self) -> &'static str {
                match self {
                    $( Self::$variant(_) => stringify!($variant), )+
                }
            }

            /// Get the timestamp of the event
            pub fn timestamp(&self) -> u64 {
                match self {
                    $( Self::$variant(e) => e.timestamp, )+
                }
            }

            /// Get the block height of the event
            pub fn block_height(&self) -> u64 {
                match self {
                    $( Self::$variant(e) => e.block_height, )+
                }
            }
        }
    };
}

protocol_events! {
    // Supply
    /// Stable units minted
    Minted(MintedEvent),
    /// Stable units burned
    Burned(BurnedEvent),
    /// Supply cap changed
    SupplyCapUpdated(SupplyCapUpdatedEvent),
    /// Per-period mint limit changed
    RateLimitUpdated(RateLimitUpdatedEvent),
    /// Mint rejected by the supply circuit breaker
    CircuitBreakerTriggered(CircuitBreakerTriggeredEvent),
    /// Token paused or unpaused
    TokenPauseChanged(PauseChangedEvent),

    // Collateral engine
    /// Collateral deposited and stable units issued
    CollateralDeposited(CollateralDepositedEvent),
    /// Stable units burned and collateral released
    CollateralWithdrawn(CollateralWithdrawnEvent),
    /// Strategy reported yield on a deposit
    YieldGenerated(YieldGeneratedEvent),
    /// New collateral asset registered
    CollateralAssetAdded(CollateralAssetAddedEvent),
    /// Engine parameters changed
    EngineParametersUpdated(EngineParametersUpdatedEvent),
    /// Engine paused
    EnginePaused(EnginePausedEvent),
    /// Engine unpaused
    EngineUnpaused(PauseChangedEvent),
    /// Strategy position unwound during an emergency
    StrategyClosed(StrategyClosedEvent),

    // Treasury
    /// Reserve deposit
    ReserveDeposited(ReserveDepositedEvent),
    /// Yield routed into reserves
    YieldReceived(YieldReceivedEvent),
    /// Pending operation recorded
    OperationQueued(OperationQueuedEvent),
    /// Pending operation executed
    OperationExecuted(OperationExecutedEvent),
    /// Reserve assets left the treasury
    ReserveWithdrawn(ReserveWithdrawnEvent),
    /// Reserves deployed to defend the peg
    DepegIntervention(DepegInterventionEvent),
    /// Allocation target changed
    AllocationTargetUpdated(AllocationTargetUpdatedEvent),
    /// New reserve asset registered
    ReserveAssetAdded(ReserveAssetAddedEvent),
    /// Treasury circuit breaker engaged
    TreasuryCircuitBreakerActivated(PauseChangedEvent),
    /// Treasury circuit breaker lifted
    TreasuryCircuitBreakerDeactivated(PauseChangedEvent),
    /// Accumulated yield distributed
    YieldDistributed(YieldDistributedEvent),
    /// Treasury parameters changed
    ReserveParametersUpdated(ReserveParametersUpdatedEvent),
    /// Yield router identity changed
    YieldRouterUpdated(YieldRouterUpdatedEvent),
}

impl ProtocolEvent {
    /// Compute event hash
    pub fn hash(&self) -> Hash {
        let data = bincode::serialize(self).unwrap_or_default();
        Hash::sha256(&data)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SUPPLY EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when stable units are minted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintedEvent {
    /// Recipient
    pub to: Address,
    /// Amount minted
    pub amount: u128,
    /// Supply after the mint
    pub total_supply: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when stable units are burned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnedEvent {
    /// Holder whose balance was burned
    pub from: Address,
    /// Amount burned
    pub amount: u128,
    /// Supply after the burn
    pub total_supply: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when the supply cap changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyCapUpdatedEvent {
    /// Previous cap
    pub old_cap: u128,
    /// New cap
    pub new_cap: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when the mint rate limit changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitUpdatedEvent {
    /// Previous limit
    pub old_limit: u128,
    /// New limit
    pub new_limit: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Signal emitted when a mint trips the supply circuit breaker.
///
/// Survives the rollback of the rejected mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerTriggeredEvent {
    /// Requested mint
    pub amount: u128,
    /// Supply at the time of the request
    pub total_supply: u128,
    /// Breaker threshold in bps
    pub threshold_bps: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Pause state change on a component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseChangedEvent {
    /// New state
    pub paused: bool,
    /// Account that changed it
    pub by: Address,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when collateral is deposited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralDepositedEvent {
    /// Depositor
    pub user: Address,
    /// Collateral asset
    pub asset: Address,
    /// Asset amount deposited
    pub amount: u128,
    /// USD value at deposit time
    pub usd_value: u128,
    /// Stable units issued
    pub stable_minted: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when collateral is withdrawn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralWithdrawnEvent {
    /// Withdrawer
    pub user: Address,
    /// Collateral asset
    pub asset: Address,
    /// Stable units burned
    pub stable_burned: u128,
    /// Asset amount debited from the position
    pub token_amount: u128,
    /// Amount the strategy actually released
    pub actual_amount: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a deposit generates strategy yield
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldGeneratedEvent {
    /// Asset the yield is denominated in
    pub asset: Address,
    /// Total yield
    pub amount: u128,
    /// Portion routed to the treasury
    pub treasury_share: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a collateral asset is registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralAssetAddedEvent {
    /// Asset
    pub asset: Address,
    /// Oracle feed
    pub price_feed: Address,
    /// Minimum single deposit
    pub min_deposit: u128,
    /// Maximum single deposit
    pub max_deposit: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when engine parameters change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineParametersUpdatedEvent {
    /// Treasury share of strategy yield
    pub treasury_yield_bps: u128,
    /// Depeg threshold guarding deposits
    pub emergency_threshold_bps: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when the engine is paused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnginePausedEvent {
    /// Account that paused
    pub by: Address,
    /// Stated reason
    pub reason: String,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when the strategy position is closed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyClosedEvent {
    /// Value recovered from the strategy
    pub recovered: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TREASURY EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted on a reserve deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveDepositedEvent {
    /// Reserve asset
    pub asset: Address,
    /// Amount deposited
    pub amount: u128,
    /// Depositor
    pub depositor: Address,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when routed yield is credited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldReceivedEvent {
    /// Reserve asset
    pub asset: Address,
    /// Amount credited
    pub amount: u128,
    /// Accumulated yield after the credit
    pub accumulated: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when an operation is queued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationQueuedEvent {
    /// Operation identifier
    pub id: Hash,
    /// Operation kind
    pub kind: OperationKind,
    /// Reserve asset
    pub asset: Address,
    /// Amount
    pub amount: u128,
    /// Recipient
    pub recipient: Address,
    /// Earliest execution time
    pub execute_after: u64,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a queued operation executes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationExecutedEvent {
    /// Operation identifier
    pub id: Hash,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when reserve assets leave the treasury
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveWithdrawnEvent {
    /// Reserve asset
    pub asset: Address,
    /// Amount withdrawn
    pub amount: u128,
    /// Recipient
    pub recipient: Address,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when reserves are deployed against a depeg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepegInterventionEvent {
    /// Stable units the intervention targets
    pub stable_amount: u128,
    /// Observed deviation
    pub deviation_bps: u128,
    /// USD value drawn from reserves
    pub usd_deployed: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when an allocation target changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationTargetUpdatedEvent {
    /// Reserve asset
    pub asset: Address,
    /// Previous target
    pub old_target_bps: u128,
    /// New target
    pub new_target_bps: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a reserve asset is registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveAssetAddedEvent {
    /// Reserve asset
    pub asset: Address,
    /// Allocation target
    pub target_allocation_bps: u128,
    /// Stable classification
    pub is_stable: bool,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when accumulated yield is distributed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldDistributedEvent {
    /// Reserve asset
    pub asset: Address,
    /// Yield amount distributed
    pub amount: u128,
    /// Stable units burned, zero when released instead
    pub stable_burned: u128,
    /// Recipient of released yield, zero when burned
    pub recipient: Address,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when treasury parameters change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveParametersUpdatedEvent {
    /// Emergency reserve share
    pub emergency_reserve_bps: u128,
    /// Minimum reserve ratio
    pub min_reserve_ratio_bps: u128,
    /// Depeg threshold
    pub depeg_threshold_bps: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when the yield router changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldRouterUpdatedEvent {
    /// New router
    pub router: Address,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered log of committed events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<ProtocolEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn push(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    /// Append events in order
    pub fn extend(&mut self, events: impl IntoIterator<Item = ProtocolEvent>) {
        self.events.extend(events);
    }

    /// Get all events
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Get events of a specific type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&ProtocolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Most recent event, if any
    pub fn last(&self) -> Option<&ProtocolEvent> {
        self.events.last()
    }

    /// Get the number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Merge another event log into this one
    pub fn merge(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Running digest over all events in order
    pub fn digest(&self) -> Hash {
        self.events.iter().fold(Hash::zero(), |acc, event| {
            let mut data = Vec::with_capacity(64);
            data.extend_from_slice(acc.as_bytes());
            data.extend_from_slice(event.hash().as_bytes());
            Hash::sha256(&data)
        })
    }
}
