//! Treasury reserves.
//!
//! This module contains:
//! - Reserve asset accounting
//! - The timelocked operation queue
//! - The reserve manager enforcing the reserve ratio and peg defense

pub mod manager;
pub mod reserves;
pub mod timelock;

pub use manager::TreasuryReserveManager;
pub use reserves::ReserveAsset;
pub use timelock::{OperationId, OperationKind, PendingOperation, PendingQueue, QueueStats};
