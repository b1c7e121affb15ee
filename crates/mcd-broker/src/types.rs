use std::collections::BTreeMap;

use crate::fixedpoint::Micros;

// ---------------------------------------------------------------------------
// Step identity
// ---------------------------------------------------------------------------

/// Index of one time step in the replay.
///
/// Every engine operation takes an explicit `StepId` — there is no
/// engine-wide "current step" cursor, so out-of-order calls are detectable
/// instead of silently corrupting state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepId(usize);

impl StepId {
    #[inline]
    pub const fn new(index: usize) -> Self {
        StepId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical per-step price view (price column -> price micros).
///
/// The driver builds one from the frame row; a column absent from the map is
/// "no current price" for anything valued by that column.
pub type MarkMap = BTreeMap<String, Micros>;

/// Helper to build a MarkMap with minimal boilerplate.
pub fn marks<I, S>(items: I) -> MarkMap
where
    I: IntoIterator<Item = (S, Micros)>,
    S: Into<String>,
{
    let mut m = MarkMap::new();
    for (col, px) in items {
        m.insert(col.into(), px);
    }
    m
}

/// Everything the engine may know about one step: its identity and the
/// per-column marks.  Passed explicitly into every engine entry point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepContext {
    pub step: StepId,
    pub marks: MarkMap,
}

impl StepContext {
    pub fn new(step: StepId, marks: MarkMap) -> Self {
        Self { step, marks }
    }

    /// Mark for a price column, if present this step.
    #[inline]
    pub fn mark(&self, column: &str) -> Option<Micros> {
        self.marks.get(column).copied()
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// One currency account.
///
/// `price_column` names the series column that values the account in the
/// valuation currency; `None` means the balance already is the valuation
/// currency and contributes at face amount.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub symbol: String,
    pub starting_balance: Micros,
    pub price_column: Option<String>,
}

impl Account {
    /// An account denominated directly in the valuation currency.
    pub fn cash(symbol: impl Into<String>, starting_balance: Micros) -> Self {
        Self {
            symbol: symbol.into(),
            starting_balance,
            price_column: None,
        }
    }

    /// An account valued through a price column.
    pub fn priced(
        symbol: impl Into<String>,
        starting_balance: Micros,
        price_column: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            starting_balance,
            price_column: Some(price_column.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Sequential order identity.  No randomness — same run, same ids.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderId(u64);

impl OrderId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        OrderId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// BUY or SELL.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn label(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// LIMIT (fills on a price cross) or MARKET (fills at placement).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OrderKind {
    Limit,
    Market,
}

impl OrderKind {
    pub fn label(self) -> &'static str {
        match self {
            OrderKind::Limit => "limit",
            OrderKind::Market => "market",
        }
    }
}

/// Order lifecycle.  Transitions are one-way:
/// `Pending -> Completed` or `Pending -> Cancelled`, nothing else.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

/// One trade request and its resolution state.
///
/// All monetary fields are fixed at placement: `price` (resolved from the
/// current mark for market orders), `debit_total`/`credit_total` (the exact
/// leg amounts moved on fill), and `fee` (charged up front against the
/// debited leg, and refunded exactly on cancellation — never re-derived
/// from the fee schedule later).
///
/// Orders are created by the broker's placement entry points and owned by
/// its pending list; nothing else mutates them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub side: Side,
    pub kind: OrderKind,
    pub base: String,
    pub quote: String,
    pub price: Micros,
    pub size: Micros,
    pub debit_total: Micros,
    pub credit_total: Micros,
    pub fee: Micros,
    pub status: OrderStatus,
}

impl Order {
    /// The leg whose balance decreases at placement: quote for a BUY,
    /// base for a SELL.
    #[inline]
    pub fn debit_account(&self) -> &str {
        match self.side {
            Side::Buy => &self.quote,
            Side::Sell => &self.base,
        }
    }

    /// The leg whose balance increases on fill: base for a BUY, quote for
    /// a SELL.
    #[inline]
    pub fn credit_account(&self) -> &str {
        match self.side {
            Side::Buy => &self.base,
            Side::Sell => &self.quote,
        }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }
}

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

/// Proportional fee rates in basis points, by order kind.
///
/// Fees are charged on the debited amount at placement time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FeeSchedule {
    pub limit_fee_bps: i64,
    pub market_fee_bps: i64,
}

impl FeeSchedule {
    pub const DEFAULT_LIMIT_FEE_BPS: i64 = 0;
    pub const DEFAULT_MARKET_FEE_BPS: i64 = 25; // 0.25%

    pub fn new(limit_fee_bps: i64, market_fee_bps: i64) -> Self {
        debug_assert!(limit_fee_bps >= 0);
        debug_assert!(market_fee_bps >= 0);
        Self {
            limit_fee_bps,
            market_fee_bps,
        }
    }

    /// Fee-free schedule, useful in tests.
    pub fn zero() -> Self {
        Self::new(0, 0)
    }

    #[inline]
    pub fn rate_bps(&self, kind: OrderKind) -> i64 {
        match kind {
            OrderKind::Limit => self.limit_fee_bps,
            OrderKind::Market => self.market_fee_bps,
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT_FEE_BPS, Self::DEFAULT_MARKET_FEE_BPS)
    }
}

// ---------------------------------------------------------------------------
// Execution journal
// ---------------------------------------------------------------------------

/// Append-only record of what the engine did, for logging and inspection.
///
/// Derived state only: matching and accounting never read the journal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionEvent {
    /// Funds were committed and the order entered the book (or, for market
    /// orders, went straight to execution).
    Placed {
        step: StepId,
        id: OrderId,
        side: Side,
        kind: OrderKind,
        base: String,
        quote: String,
        price: Micros,
        size: Micros,
    },
    /// The credit leg was paid and the order completed.
    Filled {
        step: StepId,
        id: OrderId,
        side: Side,
        kind: OrderKind,
        base: String,
        quote: String,
        price: Micros,
        size: Micros,
    },
    /// A pending order was cancelled and the debit leg refunded.
    Cancelled {
        step: StepId,
        id: OrderId,
        base: String,
        quote: String,
        refund: Micros,
    },
    /// Placement was dropped for insufficient funds.  No order exists.
    Rejected {
        step: StepId,
        side: Side,
        kind: OrderKind,
        base: String,
        quote: String,
        required: Micros,
        available: Micros,
    },
}

impl std::fmt::Display for ExecutionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionEvent::Placed {
                step,
                id,
                side,
                kind,
                base,
                quote,
                price,
                ..
            } => write!(
                f,
                "{step}: placed {} {} {base}-{quote} order {id} at {price}",
                kind.label(),
                side.label()
            ),
            ExecutionEvent::Filled {
                step,
                id,
                side,
                kind,
                base,
                quote,
                price,
                ..
            } => write!(
                f,
                "{step}: executed {} {} {base}-{quote} order {id} at {price}",
                kind.label(),
                side.label()
            ),
            ExecutionEvent::Cancelled {
                step,
                id,
                base,
                quote,
                refund,
            } => write!(
                f,
                "{step}: cancelled {base}-{quote} order {id}, refunded {refund}"
            ),
            ExecutionEvent::Rejected {
                step,
                side,
                kind,
                base,
                quote,
                required,
                available,
            } => write!(
                f,
                "{step}: rejected {} {} {base}-{quote} order, required {required} > available {available}",
                kind.label(),
                side.label()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_order_legs() {
        let order = Order {
            id: OrderId::new(1),
            side: Side::Buy,
            kind: OrderKind::Limit,
            base: "BTC".to_string(),
            quote: "USD".to_string(),
            price: Micros::from_whole(100),
            size: Micros::from_whole(1),
            debit_total: Micros::from_whole(100),
            credit_total: Micros::from_whole(1),
            fee: Micros::ZERO,
            status: OrderStatus::Pending,
        };
        assert_eq!(order.debit_account(), "USD");
        assert_eq!(order.credit_account(), "BTC");
    }

    #[test]
    fn sell_order_legs() {
        let order = Order {
            id: OrderId::new(2),
            side: Side::Sell,
            kind: OrderKind::Market,
            base: "BTC".to_string(),
            quote: "USD".to_string(),
            price: Micros::from_whole(100),
            size: Micros::from_whole(1),
            debit_total: Micros::from_whole(1),
            credit_total: Micros::from_whole(100),
            fee: Micros::ZERO,
            status: OrderStatus::Pending,
        };
        assert_eq!(order.debit_account(), "BTC");
        assert_eq!(order.credit_account(), "USD");
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn default_fee_schedule_matches_documented_rates() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.rate_bps(OrderKind::Limit), 0);
        assert_eq!(fees.rate_bps(OrderKind::Market), 25);
    }

    #[test]
    fn marks_helper_builds_map() {
        let m = marks([("close", Micros::from_whole(100))]);
        assert_eq!(m.get("close"), Some(&Micros::from_whole(100)));
        assert_eq!(m.get("open"), None);
    }
}
