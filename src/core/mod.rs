//! Core modules for the synthetic dollar.
//!
//! This module contains the fundamental building blocks:
//! - Configuration and protocol parameters
//! - The stable token and its supply policy
//! - Collateral positions and asset configuration
//! - The collateral engine

pub mod config;
pub mod engine;
pub mod position;
pub mod token;

pub use config::*;
pub use engine::*;
pub use position::*;
pub use token::*;
