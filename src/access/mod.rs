//! Access control.
//!
//! Capability checks consulted at the top of each gated operation.

pub mod roles;

pub use roles::*;
