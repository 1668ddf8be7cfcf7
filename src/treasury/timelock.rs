//! Timelocked queue of pending treasury operations.
//!
//! Sensitive fund movements are queued first and executed later. An operation
//! moves from Queued to Executed exactly once, and only after its
//! `execute_after` time has passed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::utils::crypto::{Address, Hash};

/// Identifier of a pending operation
pub type OperationId = Hash;

// ═══════════════════════════════════════════════════════════════════════════════
// PENDING OPERATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Kind of queued fund movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Reserve withdrawal to a recipient
    Withdrawal,
    /// Allocation rebalance
    Rebalance,
    /// Emergency peg restoration
    EmergencyRepeg,
    /// Governance-directed transfer
    GovernanceTransfer,
}

impl OperationKind {
    fn tag(&self) -> u8 {
        match self {
            OperationKind::Withdrawal => 0,
            OperationKind::Rebalance => 1,
            OperationKind::EmergencyRepeg => 2,
            OperationKind::GovernanceTransfer => 3,
        }
    }
}

/// A queued fund movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Operation kind
    pub kind: OperationKind,
    /// Reserve asset
    pub asset: Address,
    /// Amount of the asset
    pub amount: u128,
    /// Recipient of the funds
    pub recipient: Address,
    /// Time the operation was queued
    pub queued_at: u64,
    /// Earliest execution time
    pub execute_after: u64,
    /// Set once executed
    pub executed: bool,
    /// Free-form justification
    pub reason: String,
}

impl PendingOperation {
    /// Deterministic identifier from the operation parameters and queue time
    pub fn compute_id(
        kind: OperationKind,
        asset: &Address,
        amount: u128,
        recipient: &Address,
        queued_at: u64,
        reason: &str,
    ) -> OperationId {
        let mut data = Vec::with_capacity(1 + 20 + 16 + 20 + 8 + reason.len());
        data.push(kind.tag());
        data.extend_from_slice(asset.as_bytes());
        data.extend_from_slice(&amount.to_be_bytes());
        data.extend_from_slice(recipient.as_bytes());
        data.extend_from_slice(&queued_at.to_be_bytes());
        data.extend_from_slice(reason.as_bytes());
        Hash::sha256(&data)
    }

    /// Identifier of this operation
    pub fn id(&self) -> OperationId {
        Self::compute_id(
            self.kind,
            &self.asset,
            self.amount,
            &self.recipient,
            self.queued_at,
            &self.reason,
        )
    }

    /// Check if the operation can be executed at `now`
    pub fn can_execute(&self, now: u64) -> bool {
        !self.executed && now >= self.execute_after
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PENDING QUEUE
// ═══════════════════════════════════════════════════════════════════════════════

/// Operations indexed by identifier and by earliest execution time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingQueue {
    /// Operations by identifier
    entries: HashMap<OperationId, PendingOperation>,
    /// Identifiers ordered by `execute_after`
    by_eta: BTreeMap<u64, Vec<OperationId>>,
}

impl PendingQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an operation; identical parameters at the same time collide
    pub fn queue(&mut self, operation: PendingOperation) -> Result<OperationId> {
        let id = operation.id();
        if self.entries.contains_key(&id) {
            return Err(Error::OperationAlreadyQueued(id.to_hex()));
        }

        self.by_eta.entry(operation.execute_after).or_default().push(id);
        self.entries.insert(id, operation);
        Ok(id)
    }

    /// Check that `id` may execute at `now` without changing anything
    pub fn check_executable(&self, id: &OperationId, now: u64) -> Result<&PendingOperation> {
        let operation = self
            .entries
            .get(id)
            .ok_or_else(|| Error::OperationNotFound(id.to_hex()))?;

        if operation.executed {
            return Err(Error::OperationAlreadyExecuted(id.to_hex()));
        }

        if now < operation.execute_after {
            return Err(Error::TimelockNotExpired {
                execute_after: operation.execute_after,
                now,
            });
        }

        Ok(operation)
    }

    /// Transition `id` to Executed
    pub fn mark_executed(&mut self, id: &OperationId, now: u64) -> Result<()> {
        self.check_executable(id, now)?;
        if let Some(operation) = self.entries.get_mut(id) {
            operation.executed = true;
        }
        Ok(())
    }

    /// Get an operation
    pub fn get(&self, id: &OperationId) -> Option<&PendingOperation> {
        self.entries.get(id)
    }

    /// Identifiers executable at `now`, earliest first
    pub fn ready(&self, now: u64) -> Vec<OperationId> {
        self.by_eta
            .range(..=now)
            .flat_map(|(_, ids)| ids.iter())
            .filter(|id| self.entries.get(*id).map(|op| !op.executed).unwrap_or(false))
            .copied()
            .collect()
    }

    /// Queue statistics
    pub fn statistics(&self) -> QueueStats {
        let executed = self.entries.values().filter(|op| op.executed).count() as u64;
        QueueStats {
            queued: self.entries.len() as u64 - executed,
            executed,
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Awaiting execution
    pub queued: u64,
    /// Executed
    pub executed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation(amount: u128, queued_at: u64, execute_after: u64) -> PendingOperation {
        PendingOperation {
            kind: OperationKind::Withdrawal,
            asset: Address::derive("usdc"),
            amount,
            recipient: Address::derive("ops"),
            queued_at,
            execute_after,
            executed: false,
            reason: "payroll".into(),
        }
    }

    #[test]
    fn test_id_is_deterministic() {
        let a = operation(100, 10, 10);
        let b = operation(100, 10, 10);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), operation(100, 11, 11).id());
        assert_ne!(a.id(), operation(101, 10, 10).id());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut queue = PendingQueue::new();
        queue.queue(operation(100, 10, 10)).unwrap();
        assert!(matches!(
            queue.queue(operation(100, 10, 10)),
            Err(Error::OperationAlreadyQueued(_))
        ));
    }

    #[test]
    fn test_execute_once_after_delay() {
        let mut queue = PendingQueue::new();
        let id = queue.queue(operation(100, 0, 1000)).unwrap();

        assert!(matches!(
            queue.mark_executed(&id, 999),
            Err(Error::TimelockNotExpired { execute_after: 1000, now: 999 })
        ));

        queue.mark_executed(&id, 1000).unwrap();
        assert!(queue.get(&id).unwrap().executed);

        assert!(matches!(
            queue.mark_executed(&id, 1001),
            Err(Error::OperationAlreadyExecuted(_))
        ));
        assert!(matches!(
            queue.mark_executed(&Hash::zero(), 1001),
            Err(Error::OperationNotFound(_))
        ));
    }

    #[test]
    fn test_ready() {
        let mut queue = PendingQueue::new();
        let first = queue.queue(operation(1, 0, 100)).unwrap();
        queue.queue(operation(2, 0, 200)).unwrap();
        queue.queue(operation(3, 0, 300)).unwrap();

        assert_eq!(queue.ready(150), vec![first]);
        assert_eq!(queue.ready(250).len(), 2);

        queue.mark_executed(&first, 350).unwrap();
        assert_eq!(queue.ready(350).len(), 2);

        let stats = queue.statistics();
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.executed, 1);
    }
}
