//! # synthUSD
//!
//! A collateral-backed synthetic dollar. Users deposit volatile assets, the
//! protocol prices them through an oracle, parks them in a yield strategy and
//! issues a stable unit against them at a fixed 150% collateral ratio. A
//! treasury accumulates reserves and yield and can intervene to defend the peg.
//!
//! ## Architecture
//!
//! - **Core**: configuration, the stable token with its supply policy,
//!   positions and the collateral engine
//! - **Treasury**: multi-asset reserves, timelocked withdrawals, peg defense
//! - **Oracle**: price quotes and the depeg signal
//! - **Strategy**: the yield venue holding deposited collateral
//! - **Access**: capability checks
//! - **Protocol**: the atomic transaction substrate and event log
//!
//! ## Example
//!
//! ```rust,ignore
//! use synthusd::prelude::*;
//!
//! let mut protocol = Protocol::with_registry(
//!     ProtocolConfig::default(),
//!     admin,
//!     oracle,
//!     SimulatedStrategy::new(),
//!     PegPriceMonitor::new(peg_feed),
//! )?;
//! protocol.begin_block(1, now)?;
//! let receipt = protocol.deposit(user, weth, amount)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod access;
pub mod core;
pub mod error;
pub mod oracle;
pub mod protocol;
pub mod strategy;
pub mod treasury;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::access::{Authorizer, Role, RoleRegistry};
    pub use crate::core::{
        config::ProtocolConfig,
        engine::{CollateralEngine, DepositReceipt, WithdrawReceipt},
        position::{AssetParams, Position},
        token::StableToken,
    };
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::oracle::{
        DepegSignal, FixedDepegSignal, PegPriceMonitor, PriceOracle, PriceQuote, StaticPriceOracle,
    };
    pub use crate::protocol::{EventLog, Protocol, ProtocolEvent, ProtocolOperation, TxContext};
    pub use crate::strategy::{SimulatedStrategy, YieldStrategy};
    pub use crate::treasury::{OperationId, TreasuryReserveManager};
    pub use crate::utils::{
        constants::{BPS_DIVISOR, WAD},
        crypto::{Address, Hash},
    };
}

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name
pub const PROTOCOL_NAME: &str = "synthUSD";
