//! mcd-broker
//!
//! Order-execution and ledger engine for deterministic single-instrument
//! replay:
//! - Step-indexed account ledger (balances carry forward by default)
//! - Closed order model (side/kind/status enums; totals fixed at placement)
//! - Pending limit orders filled on price cross; market orders fill at
//!   placement
//! - Fees in basis points, charged up front against the debited leg
//! - Per-step portfolio valuation with pending funds counted
//! - Pure deterministic logic (no IO, no time, no randomness)

mod broker;
mod fixedpoint;
mod ledger;
mod types;

pub use broker::{Broker, BrokerError};
pub use fixedpoint::Micros;
pub use ledger::{BalanceRow, Ledger, LedgerError};
pub use types::{
    marks, Account, ExecutionEvent, FeeSchedule, MarkMap, Order, OrderId, OrderKind, OrderStatus,
    Side, StepContext, StepId,
};
