//! Oracle integration.
//!
//! Price quotes for collateral and reserve assets, and the peg check for the
//! stable unit itself.

pub mod depeg;
pub mod price_feed;

pub use depeg::*;
pub use price_feed::*;
