//! mcd-strategy
//!
//! Strategy callback contract and host:
//! - Strategies react to one step at a time and trade only through the
//!   broker's placement/cancellation entry points.
//! - The host drives callbacks in registration order and fails fast when
//!   no strategy is wired.
//! - `SmaCross` is the reference implementation.

mod host;
mod sma_cross;
mod types;

pub use host::StrategyHost;
pub use sma_cross::SmaCross;
pub use types::{Strategy, StrategyHostError};
