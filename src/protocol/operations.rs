//! Protocol operations - atomic state changes.
//!
//! Operations describe the fund-moving actions a caller can submit to
//! [`crate::protocol::Protocol::execute`]. Each runs as one transaction: it
//! either commits fully or leaves every component untouched.

use serde::{Deserialize, Serialize};

use crate::core::engine::{DepositReceipt, WithdrawReceipt};
use crate::treasury::OperationId;
use crate::utils::crypto::Address;

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATION TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for protocol operations
pub trait Operation {
    /// Get the operation type name
    fn operation_type(&self) -> &'static str;
}

macro_rules! operation_type {
    ($($op:ident => $name:literal),* $(,)?) => {
        $(
            impl Operation for $op {
                fn operation_type(&self) -> &'static str {
                    $name
                }
            }
        )*
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Deposit collateral and mint stable units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositOp {
    /// Collateral asset
    pub asset: Address,
    /// Asset amount
    pub amount: u128,
}

/// Burn stable units and withdraw collateral
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawOp {
    /// Collateral asset
    pub asset: Address,
    /// Stable units to burn
    pub stable_amount: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TREASURY OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Add reserves to the treasury
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveDepositOp {
    /// Reserve asset
    pub asset: Address,
    /// Asset amount
    pub amount: u128,
}

/// Queue a reserve withdrawal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueWithdrawalOp {
    /// Reserve asset
    pub asset: Address,
    /// Asset amount
    pub amount: u128,
    /// Recipient of the funds
    pub recipient: Address,
    /// Justification
    pub reason: String,
}

/// Execute a queued withdrawal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteWithdrawalOp {
    /// Queued operation
    pub id: OperationId,
}

/// Deploy reserves against a depeg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepegInterventionOp {
    /// USD value to deploy
    pub stable_amount: u128,
}

/// Distribute accumulated yield
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributeYieldOp {
    /// Reserve asset
    pub asset: Address,
    /// Asset amount drawn from accumulated yield
    pub amount: u128,
    /// Burn stable units instead of releasing the asset
    pub burn_stable: bool,
}

operation_type! {
    DepositOp => "Deposit",
    WithdrawOp => "Withdraw",
    ReserveDepositOp => "ReserveDeposit",
    QueueWithdrawalOp => "QueueWithdrawal",
    ExecuteWithdrawalOp => "ExecuteWithdrawal",
    DepegInterventionOp => "DepegIntervention",
    DistributeYieldOp => "DistributeYield",
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATION ENVELOPE
// ═══════════════════════════════════════════════════════════════════════════════

/// Any submittable operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolOperation {
    /// Deposit collateral
    Deposit(DepositOp),
    /// Withdraw collateral
    Withdraw(WithdrawOp),
    /// Add treasury reserves
    ReserveDeposit(ReserveDepositOp),
    /// Queue a reserve withdrawal
    QueueWithdrawal(QueueWithdrawalOp),
    /// Execute a queued withdrawal
    ExecuteWithdrawal(ExecuteWithdrawalOp),
    /// Peg intervention
    DepegIntervention(DepegInterventionOp),
    /// Yield distribution
    DistributeYield(DistributeYieldOp),
}

impl Operation for ProtocolOperation {
    fn operation_type(&self) -> &'static str {
        match self {
            ProtocolOperation::Deposit(op) => op.operation_type(),
            ProtocolOperation::Withdraw(op) => op.operation_type(),
            ProtocolOperation::ReserveDeposit(op) => op.operation_type(),
            ProtocolOperation::QueueWithdrawal(op) => op.operation_type(),
            ProtocolOperation::ExecuteWithdrawal(op) => op.operation_type(),
            ProtocolOperation::DepegIntervention(op) => op.operation_type(),
            ProtocolOperation::DistributeYield(op) => op.operation_type(),
        }
    }
}

/// Result of any protocol operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    /// Deposit receipt
    Deposited(DepositReceipt),
    /// Withdrawal receipt
    Withdrawn(WithdrawReceipt),
    /// Identifier of the queued withdrawal
    Queued(OperationId),
    /// USD value deployed by an intervention
    InterventionDeployed(u128),
    /// Completed with nothing to report
    Done,
}
