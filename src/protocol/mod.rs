//! Protocol module - transaction substrate and orchestration.
//!
//! This module provides the [`Protocol`] facade that runs every operation
//! atomically across the supply controller, the collateral engine and the
//! treasury, plus the events those operations emit.

pub mod events;
pub mod operations;
pub mod state_machine;

pub use events::*;
pub use operations::*;
pub use state_machine::*;
