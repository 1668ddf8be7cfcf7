//! Error types for the synthUSD core.
//!
//! Every rejection the engine, treasury or supply controller can produce is a
//! variant of [`Error`]. Variants are grouped into the categories of
//! [`ErrorKind`] so callers can decide whether a failure is worth retrying.

use thiserror::Error;

use crate::protocol::events::{CircuitBreakerTriggeredEvent, ProtocolEvent};

/// Result type alias for synthUSD operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad address, amount, asset or configuration
    Validation,
    /// Supply cap, rate limit, breaker, collateral or reserve ratio
    Policy,
    /// Oracle quote too old or otherwise unusable in time
    StaleData,
    /// Caller lacks the required capability
    Authorization,
    /// Timelock or intervention interval not yet elapsed
    Timing,
    /// Component paused or circuit breaker engaged
    Halted,
    /// Nested entry into a component that is already executing
    Reentrancy,
    /// Serialization, configuration and collaborator failures
    Internal,
}

/// Main error type for the synthUSD core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// A required address was the zero address
    #[error("Zero address supplied for {0}")]
    ZeroAddress(String),

    /// Amount is zero
    #[error("Amount cannot be zero")]
    ZeroAmount,

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Asset is not configured for this component
    #[error("Asset not supported: {0}")]
    UnsupportedAsset(String),

    /// Asset has already been registered
    #[error("Asset already supported: {0}")]
    AssetAlreadySupported(String),

    /// Deposit amount outside the configured bounds for the asset
    #[error("Deposit {amount} outside bounds [{min}, {max}]")]
    DepositOutOfBounds {
        /// Requested deposit
        amount: u128,
        /// Minimum deposit
        min: u128,
        /// Maximum deposit
        max: u128,
    },

    /// Asset is not part of the caller's position
    #[error("Asset {0} is not held in this position")]
    AssetNotInPosition(String),

    /// Oracle returned a zero or negative price
    #[error("Invalid oracle price {0}")]
    InvalidPrice(i128),

    /// No feed is registered under the requested reference
    #[error("Price feed not found: {0}")]
    PriceFeedNotFound(String),

    /// Pending operation identifier unknown
    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    /// Pending operation was already executed
    #[error("Operation already executed: {0}")]
    OperationAlreadyExecuted(String),

    /// An operation with the same identifier is already queued
    #[error("Operation already queued: {0}")]
    OperationAlreadyQueued(String),

    // ═══════════════════════════════════════════════════════════════════
    // Policy Violations
    // ═══════════════════════════════════════════════════════════════════

    /// Mint would push total supply over the cap
    #[error("Supply cap exceeded: resulting supply {resulting}, cap {cap}")]
    SupplyCapExceeded {
        /// Supply after the rejected mint
        resulting: u128,
        /// Configured cap
        cap: u128,
    },

    /// New cap would sit below the current supply
    #[error("Supply cap {cap} below current supply {supply}")]
    SupplyCapBelowSupply {
        /// Requested cap
        cap: u128,
        /// Current total supply
        supply: u128,
    },

    /// Mint would exceed the per-period rate limit
    #[error("Mint rate limit exceeded: requested {requested}, remaining {remaining} this period")]
    RateLimitExceeded {
        /// Requested mint
        requested: u128,
        /// Allowance left in the current period
        remaining: u128,
    },

    /// Single mint is too large relative to current supply
    #[error("Mint circuit breaker: {amount} is {increase_bps} bps of supply {total_supply}, limit {threshold_bps} bps")]
    MintCircuitBreaker {
        /// Requested mint
        amount: u128,
        /// Supply before the mint
        total_supply: u128,
        /// Requested mint as bps of supply
        increase_bps: u128,
        /// Breaker threshold
        threshold_bps: u128,
    },

    /// Position would fall below the minimum collateralization ratio
    #[error("Collateralization ratio {current_bps} bps below minimum {minimum_bps} bps")]
    CollateralizationRatioTooLow {
        /// Resulting ratio in bps
        current_bps: u128,
        /// Minimum ratio in bps
        minimum_bps: u128,
    },

    /// Treasury reserve ratio would fall below the minimum
    #[error("Reserve ratio {ratio_bps} bps below minimum {minimum_bps} bps")]
    ReserveRatioTooLow {
        /// Resulting ratio in bps
        ratio_bps: u128,
        /// Minimum ratio in bps
        minimum_bps: u128,
    },

    /// Stable-unit balance too small
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Required amount
        required: u128,
        /// Available amount
        available: u128,
    },

    /// Deposited collateral too small for the requested withdrawal
    #[error("Insufficient collateral: required {required}, available {available}")]
    InsufficientCollateral {
        /// Required amount
        required: u128,
        /// Available amount
        available: u128,
    },

    /// Treasury reserves cannot cover the request
    #[error("Insufficient reserves: required {required}, available {available}")]
    InsufficientReserves {
        /// Required amount
        required: u128,
        /// Available amount
        available: u128,
    },

    /// Accumulated yield cannot cover the distribution
    #[error("Insufficient yield: requested {requested}, available {available}")]
    InsufficientYield {
        /// Requested amount
        requested: u128,
        /// Accumulated amount
        available: u128,
    },

    /// Burn request exceeds the stable debt of the position
    #[error("Stable amount {requested} exceeds outstanding debt {outstanding}")]
    DebtExceeded {
        /// Requested amount
        requested: u128,
        /// Outstanding debt
        outstanding: u128,
    },

    /// Stable unit is off its peg; deposits are suspended
    #[error("Stable unit depegged by {deviation_bps} bps")]
    Depegged {
        /// Observed deviation
        deviation_bps: u128,
    },

    /// Intervention requested while the peg holds
    #[error("No depeg detected (deviation {deviation_bps} bps)")]
    NoDepegDetected {
        /// Observed deviation
        deviation_bps: u128,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Stale Data
    // ═══════════════════════════════════════════════════════════════════

    /// Price is stale (not updated recently)
    #[error("Price is stale: last update {age}s ago, max allowed {max_age}s")]
    StalePrice {
        /// Seconds since last update
        age: u64,
        /// Maximum allowed age in seconds
        max_age: u64,
    },

    /// Quote timestamp lies after the current time
    #[error("Price timestamp {updated_at} is ahead of current time {now}")]
    PriceFromFuture {
        /// Quote timestamp
        updated_at: u64,
        /// Current time
        now: u64,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Authorization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Caller lacks the required capability
    #[error("Not authorized: {account} lacks {role}")]
    Unauthorized {
        /// Required role
        role: String,
        /// Calling account
        account: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Timing Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Timelock has not elapsed yet
    #[error("Timelock not expired: executable after {execute_after}, now {now}")]
    TimelockNotExpired {
        /// Earliest execution time
        execute_after: u64,
        /// Current time
        now: u64,
    },

    /// Depeg intervention attempted before the minimum interval
    #[error("Intervention too soon: next allowed at {next_allowed}, now {now}")]
    InterventionTooSoon {
        /// Earliest next intervention
        next_allowed: u64,
        /// Current time
        now: u64,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Halted States
    // ═══════════════════════════════════════════════════════════════════

    /// Collateral engine is paused
    #[error("Collateral engine is paused")]
    EnginePaused,

    /// Stable token minting and burning are paused
    #[error("Stable token is paused")]
    TokenPaused,

    /// Treasury circuit breaker is active
    #[error("Treasury circuit breaker is active")]
    TreasuryHalted,

    // ═══════════════════════════════════════════════════════════════════
    // Reentrancy
    // ═══════════════════════════════════════════════════════════════════

    /// Component entered while already executing
    #[error("Reentrant call into {0}")]
    Reentrancy(String),

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Yield strategy adapter failed
    #[error("Strategy error: {0}")]
    Strategy(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ZeroAddress(_)
            | Error::ZeroAmount
            | Error::InvalidParameter { .. }
            | Error::UnsupportedAsset(_)
            | Error::AssetAlreadySupported(_)
            | Error::DepositOutOfBounds { .. }
            | Error::AssetNotInPosition(_)
            | Error::InvalidPrice(_)
            | Error::PriceFeedNotFound(_)
            | Error::OperationNotFound(_)
            | Error::OperationAlreadyExecuted(_)
            | Error::OperationAlreadyQueued(_) => ErrorKind::Validation,

            Error::SupplyCapExceeded { .. }
            | Error::SupplyCapBelowSupply { .. }
            | Error::RateLimitExceeded { .. }
            | Error::MintCircuitBreaker { .. }
            | Error::CollateralizationRatioTooLow { .. }
            | Error::ReserveRatioTooLow { .. }
            | Error::InsufficientBalance { .. }
            | Error::InsufficientCollateral { .. }
            | Error::InsufficientReserves { .. }
            | Error::InsufficientYield { .. }
            | Error::DebtExceeded { .. }
            | Error::Depegged { .. }
            | Error::NoDepegDetected { .. } => ErrorKind::Policy,

            Error::StalePrice { .. } | Error::PriceFromFuture { .. } => ErrorKind::StaleData,

            Error::Unauthorized { .. } => ErrorKind::Authorization,

            Error::TimelockNotExpired { .. } | Error::InterventionTooSoon { .. } => {
                ErrorKind::Timing
            }

            Error::EnginePaused | Error::TokenPaused | Error::TreasuryHalted => ErrorKind::Halted,

            Error::Reentrancy(_) => ErrorKind::Reentrancy,

            Error::Strategy(_)
            | Error::Config(_)
            | Error::Serialization(_)
            | Error::Deserialization(_)
            | Error::Internal(_)
            | Error::Overflow { .. }
            | Error::Underflow { .. } => ErrorKind::Internal,
        }
    }

    /// Returns true if the same call may succeed later without any
    /// privileged intervention
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timing | ErrorKind::StaleData)
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::Internal(_) | Error::Overflow { .. } | Error::Underflow { .. }
        )
    }

    /// Event that must reach off-process observers even though the
    /// operation that raised this error is rolled back
    pub fn signal(&self, block_height: u64, timestamp: u64) -> Option<ProtocolEvent> {
        match self {
            Error::MintCircuitBreaker {
                amount,
                total_supply,
                threshold_bps,
                ..
            } => Some(ProtocolEvent::CircuitBreakerTriggered(
                CircuitBreakerTriggeredEvent {
                    amount: *amount,
                    total_supply: *total_supply,
                    threshold_bps: *threshold_bps,
                    block_height,
                    timestamp,
                },
            )),
            _ => None,
        }
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Validation errors: 1xxx
            Error::ZeroAddress(_) => 1001,
            Error::ZeroAmount => 1002,
            Error::InvalidParameter { .. } => 1003,
            Error::UnsupportedAsset(_) => 1004,
            Error::AssetAlreadySupported(_) => 1005,
            Error::DepositOutOfBounds { .. } => 1006,
            Error::AssetNotInPosition(_) => 1007,
            Error::InvalidPrice(_) => 1008,
            Error::PriceFeedNotFound(_) => 1009,
            Error::OperationNotFound(_) => 1010,
            Error::OperationAlreadyExecuted(_) => 1011,
            Error::OperationAlreadyQueued(_) => 1012,

            // Policy violations: 2xxx
            Error::SupplyCapExceeded { .. } => 2001,
            Error::SupplyCapBelowSupply { .. } => 2002,
            Error::RateLimitExceeded { .. } => 2003,
            Error::MintCircuitBreaker { .. } => 2004,
            Error::CollateralizationRatioTooLow { .. } => 2005,
            Error::ReserveRatioTooLow { .. } => 2006,
            Error::InsufficientBalance { .. } => 2007,
            Error::InsufficientCollateral { .. } => 2008,
            Error::InsufficientReserves { .. } => 2009,
            Error::InsufficientYield { .. } => 2010,
            Error::DebtExceeded { .. } => 2011,
            Error::Depegged { .. } => 2012,
            Error::NoDepegDetected { .. } => 2013,

            // Stale data: 3xxx
            Error::StalePrice { .. } => 3001,
            Error::PriceFromFuture { .. } => 3002,

            // Authorization: 4xxx
            Error::Unauthorized { .. } => 4001,

            // Timing: 5xxx
            Error::TimelockNotExpired { .. } => 5001,
            Error::InterventionTooSoon { .. } => 5002,

            // Halted and reentrancy: 6xxx
            Error::EnginePaused => 6001,
            Error::TokenPaused => 6002,
            Error::TreasuryHalted => 6003,
            Error::Reentrancy(_) => 6004,

            // Internal errors: 9xxx
            Error::Strategy(_) => 9001,
            Error::Config(_) => 9002,
            Error::Serialization(_) => 9003,
            Error::Deserialization(_) => 9004,
            Error::Internal(_) => 9005,
            Error::Overflow { .. } => 9006,
            Error::Underflow { .. } => 9007,
        }
    }
}
