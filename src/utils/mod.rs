//! Utility modules for the synthUSD core.
//!
//! This module contains shared utilities used across the protocol:
//! - Identity and hashing primitives
//! - Checked integer arithmetic
//! - Validation helpers
//! - The per-component reentrancy lock
//! - Constants

pub mod constants;
pub mod crypto;
pub mod guard;
pub mod logging;
pub mod math;
pub mod validation;

pub use constants::*;
pub use crypto::*;
pub use guard::*;
pub use math::*;
pub use validation::*;
