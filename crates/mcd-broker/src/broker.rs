//! The execution engine: order placement, limit matching, cancellation,
//! and per-step valuation over the ledger.
//!
//! Pipeline per step: CARRY FORWARD -> MATCH -> CLEAN -> VALUE
//!
//! - Deterministic replay: no IO, no clock, no randomness; same steps and
//!   same calls produce identical state.
//! - Fees are charged against the debited leg at placement and recorded on
//!   the order, so cancellation refunds exactly what was charged even if
//!   the schedule changes between placement and cancellation.
//! - Funds committed to a pending order stay part of portfolio value
//!   (added back to the debited leg during valuation) until the order
//!   resolves.

use std::collections::BTreeMap;

use crate::fixedpoint::Micros;
use crate::ledger::{BalanceRow, Ledger, LedgerError};
use crate::types::{
    Account, ExecutionEvent, FeeSchedule, Order, OrderId, OrderKind, OrderStatus, Side,
    StepContext, StepId,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Caller and configuration errors.  Insufficient funds is deliberately not
/// here — that is a silent rejection, not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrokerError {
    /// Forwarded ledger invariant violation.
    Ledger(LedgerError),
    /// Two accounts registered under the same symbol.
    DuplicateAccount { symbol: String },
    /// An order leg references a symbol with no registered account.
    UnknownAccount { symbol: String },
    /// A market order was placed while the base has no current price.
    NoMarketPrice { symbol: String },
    /// Order price must be strictly positive.
    NonPositivePrice { price: Micros },
    /// Order size must be strictly positive.
    NonPositiveSize { size: Micros },
    /// The order id is not in the pending set.
    UnknownOrder { id: OrderId },
    /// The order is no longer pending (e.g. a second cancel attempt).
    OrderNotPending { id: OrderId, status: OrderStatus },
    /// A trade-value or fee computation overflowed `i64`.
    ValueOverflow,
}

impl From<LedgerError> for BrokerError {
    fn from(e: LedgerError) -> Self {
        BrokerError::Ledger(e)
    }
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ledger(e) => write!(f, "ledger: {e}"),
            Self::DuplicateAccount { symbol } => {
                write!(f, "duplicate account '{symbol}'")
            }
            Self::UnknownAccount { symbol } => {
                write!(f, "unknown account '{symbol}'")
            }
            Self::NoMarketPrice { symbol } => {
                write!(f, "no current price for '{symbol}', market order rejected")
            }
            Self::NonPositivePrice { price } => {
                write!(f, "order price must be > 0, got {price}")
            }
            Self::NonPositiveSize { size } => {
                write!(f, "order size must be > 0, got {size}")
            }
            Self::UnknownOrder { id } => write!(f, "unknown order {id}"),
            Self::OrderNotPending { id, status } => {
                write!(f, "order {id} is {}, not pending", status.label())
            }
            Self::ValueOverflow => write!(f, "trade value overflowed i64 micros"),
        }
    }
}

impl std::error::Error for BrokerError {}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

/// The order-execution and ledger engine.
///
/// Exclusively owns the ledger and the pending-order list.  Strategies
/// interact only through the placement/cancellation entry points and the
/// read-only views.
#[derive(Clone, Debug)]
pub struct Broker {
    accounts: BTreeMap<String, Account>,
    fees: FeeSchedule,
    ledger: Ledger,
    pending: Vec<Order>,
    next_order_id: u64,
    /// Fees charged so far, by currency of the debited leg.  Reversed on
    /// cancellation, so conservation holds at every step:
    /// balances + fee sink == starting balances + executed transfers.
    fees_collected: BTreeMap<String, Micros>,
    /// Total portfolio value per processed step.
    value_curve: Vec<Micros>,
    events: Vec<ExecutionEvent>,
}

impl Broker {
    pub fn new(accounts: Vec<Account>, fees: FeeSchedule) -> Result<Self, BrokerError> {
        let mut map = BTreeMap::new();
        let mut starting = BalanceRow::new();
        for account in accounts {
            if map.contains_key(&account.symbol) {
                return Err(BrokerError::DuplicateAccount {
                    symbol: account.symbol,
                });
            }
            starting.insert(account.symbol.clone(), account.starting_balance);
            map.insert(account.symbol.clone(), account);
        }
        Ok(Self {
            accounts: map,
            fees,
            ledger: Ledger::new(starting),
            pending: Vec::new(),
            next_order_id: 1,
            fees_collected: BTreeMap::new(),
            value_curve: Vec::new(),
            events: Vec::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Per-step processing
    // -----------------------------------------------------------------------

    /// Process one step: carry the ledger forward, fill any pending limit
    /// order whose price crosses the current mark, drop resolved orders
    /// (relative order of the rest preserved), and record total portfolio
    /// value.
    ///
    /// Steps must be processed strictly in order; the ledger rejects
    /// anything else.
    pub fn process_step(&mut self, ctx: &StepContext) -> Result<(), BrokerError> {
        self.ledger.carry_forward(ctx.step)?;

        for i in 0..self.pending.len() {
            let crosses = {
                let order = &self.pending[i];
                order.kind == OrderKind::Limit
                    && order.is_pending()
                    && match self.current_price(ctx, &order.base) {
                        // No current price: no match this step, not an error.
                        None => false,
                        Some(px) => match order.side {
                            Side::Buy => order.price >= px,
                            Side::Sell => order.price <= px,
                        },
                    }
            };
            if crosses {
                Self::execute_order(
                    &mut self.ledger,
                    &mut self.events,
                    ctx.step,
                    &mut self.pending[i],
                )?;
            }
        }

        self.pending.retain(|o| !o.status.is_terminal());

        let value = self.total_value(ctx)?;
        self.value_curve.push(value);
        Ok(())
    }

    /// Pay the credit leg and complete the order.  Guarded: a non-pending
    /// order is never executed twice.
    fn execute_order(
        ledger: &mut Ledger,
        events: &mut Vec<ExecutionEvent>,
        step: StepId,
        order: &mut Order,
    ) -> Result<(), LedgerError> {
        if !order.is_pending() {
            return Ok(());
        }
        let credit_account = order.credit_account().to_string();
        let balance = ledger.balance(step, &credit_account)?;
        ledger.set_balance(step, &credit_account, balance + order.credit_total)?;
        order.status = OrderStatus::Completed;
        events.push(ExecutionEvent::Filled {
            step,
            id: order.id,
            side: order.side,
            kind: order.kind,
            base: order.base.clone(),
            quote: order.quote.clone(),
            price: order.price,
            size: order.size,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Placement entry points
    // -----------------------------------------------------------------------

    /// Place a limit buy: fills once the mark drops to (or below) `price`.
    pub fn buy_limit(
        &mut self,
        ctx: &StepContext,
        base: &str,
        quote: &str,
        price: Micros,
        size: Micros,
    ) -> Result<Option<OrderId>, BrokerError> {
        self.place(ctx, Side::Buy, OrderKind::Limit, base, quote, price, size)
    }

    /// Place a limit sell: fills once the mark rises to (or above) `price`.
    pub fn sell_limit(
        &mut self,
        ctx: &StepContext,
        base: &str,
        quote: &str,
        price: Micros,
        size: Micros,
    ) -> Result<Option<OrderId>, BrokerError> {
        self.place(ctx, Side::Sell, OrderKind::Limit, base, quote, price, size)
    }

    /// Buy immediately at the current mark for `base`.  Fails fast if the
    /// base has no current price.
    pub fn buy_market(
        &mut self,
        ctx: &StepContext,
        base: &str,
        quote: &str,
        size: Micros,
    ) -> Result<Option<OrderId>, BrokerError> {
        let price = self
            .current_price(ctx, base)
            .ok_or_else(|| BrokerError::NoMarketPrice {
                symbol: base.to_string(),
            })?;
        self.place(ctx, Side::Buy, OrderKind::Market, base, quote, price, size)
    }

    /// Sell immediately at the current mark for `base`.  Fails fast if the
    /// base has no current price.
    pub fn sell_market(
        &mut self,
        ctx: &StepContext,
        base: &str,
        quote: &str,
        size: Micros,
    ) -> Result<Option<OrderId>, BrokerError> {
        let price = self
            .current_price(ctx, base)
            .ok_or_else(|| BrokerError::NoMarketPrice {
                symbol: base.to_string(),
            })?;
        self.place(ctx, Side::Sell, OrderKind::Market, base, quote, price, size)
    }

    /// Shared placement path.
    ///
    /// `Ok(None)` is the silent insufficient-funds rejection: no order, no
    /// balance change.  The guard is strict — a balance exactly equal to
    /// `debit_total + fee` is rejected.
    fn place(
        &mut self,
        ctx: &StepContext,
        side: Side,
        kind: OrderKind,
        base: &str,
        quote: &str,
        price: Micros,
        size: Micros,
    ) -> Result<Option<OrderId>, BrokerError> {
        if !size.is_positive() {
            return Err(BrokerError::NonPositiveSize { size });
        }
        if !price.is_positive() {
            return Err(BrokerError::NonPositivePrice { price });
        }
        for symbol in [base, quote] {
            if !self.accounts.contains_key(symbol) {
                return Err(BrokerError::UnknownAccount {
                    symbol: symbol.to_string(),
                });
            }
        }

        let notional = size
            .checked_mul_price(price)
            .ok_or(BrokerError::ValueOverflow)?;
        // BUY: pay quote notional, receive base size.
        // SELL: pay base size, receive quote notional.
        let (debit_total, credit_total) = match side {
            Side::Buy => (notional, size),
            Side::Sell => (size, notional),
        };

        let fee = debit_total
            .checked_fee_bps(self.fees.rate_bps(kind))
            .ok_or(BrokerError::ValueOverflow)?;
        let required = debit_total.saturating_add(fee);

        let debit_symbol = match side {
            Side::Buy => quote,
            Side::Sell => base,
        };
        let available = self.ledger.balance(ctx.step, debit_symbol)?;

        if available <= required {
            self.events.push(ExecutionEvent::Rejected {
                step: ctx.step,
                side,
                kind,
                base: base.to_string(),
                quote: quote.to_string(),
                required,
                available,
            });
            return Ok(None);
        }

        self.ledger
            .set_balance(ctx.step, debit_symbol, available - required)?;
        *self
            .fees_collected
            .entry(debit_symbol.to_string())
            .or_insert(Micros::ZERO) += fee;

        let id = OrderId::new(self.next_order_id);
        self.next_order_id += 1;

        let mut order = Order {
            id,
            side,
            kind,
            base: base.to_string(),
            quote: quote.to_string(),
            price,
            size,
            debit_total,
            credit_total,
            fee,
            status: OrderStatus::Pending,
        };

        self.events.push(ExecutionEvent::Placed {
            step: ctx.step,
            id,
            side,
            kind,
            base: order.base.clone(),
            quote: order.quote.clone(),
            price,
            size,
        });

        match kind {
            OrderKind::Limit => self.pending.push(order),
            OrderKind::Market => {
                Self::execute_order(&mut self.ledger, &mut self.events, ctx.step, &mut order)?;
            }
        }

        Ok(Some(id))
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    /// Cancel a pending order: refund exactly `debit_total + fee` to the
    /// debited leg and mark the order cancelled.
    ///
    /// Cancelling an unknown or non-pending order is a loud error — a
    /// second cancel can never refund twice.
    pub fn cancel_order(&mut self, ctx: &StepContext, id: OrderId) -> Result<(), BrokerError> {
        let idx = self
            .pending
            .iter()
            .position(|o| o.id == id)
            .ok_or(BrokerError::UnknownOrder { id })?;

        let status = self.pending[idx].status;
        if status != OrderStatus::Pending {
            return Err(BrokerError::OrderNotPending { id, status });
        }

        let debit_account = self.pending[idx].debit_account().to_string();
        let fee = self.pending[idx].fee;
        let refund = self.pending[idx].debit_total.saturating_add(fee);

        let balance = self.ledger.balance(ctx.step, &debit_account)?;
        self.ledger
            .set_balance(ctx.step, &debit_account, balance + refund)?;
        if let Some(sink) = self.fees_collected.get_mut(&debit_account) {
            *sink -= fee;
        }

        let order = &mut self.pending[idx];
        order.status = OrderStatus::Cancelled;
        self.events.push(ExecutionEvent::Cancelled {
            step: ctx.step,
            id,
            base: order.base.clone(),
            quote: order.quote.clone(),
            refund,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Valuation
    // -----------------------------------------------------------------------

    /// Total portfolio value at `step`, in the valuation currency.
    ///
    /// Funds committed to pending orders are added back to the debited
    /// leg's counted balance first: a pending BUY still owns its quote
    /// notional, a pending SELL still owns its base size.  Accounts without
    /// a price column contribute face value.  Sums accumulate in `i128`
    /// and clamp to `i64` micros.
    pub fn total_value(&self, ctx: &StepContext) -> Result<Micros, BrokerError> {
        let row = self
            .ledger
            .row(ctx.step)
            .ok_or(BrokerError::Ledger(LedgerError::StepNotPopulated {
                step: ctx.step,
            }))?;
        let mut counted = row.clone();

        for order in &self.pending {
            if !order.is_pending() {
                continue;
            }
            let target = match order.side {
                Side::Buy => &order.quote,
                Side::Sell => &order.base,
            };
            // Legs were validated against the account set at placement.
            if let Some(slot) = counted.get_mut(target) {
                *slot += order.debit_total;
            }
        }

        let mut total: i128 = 0;
        for (symbol, balance) in &counted {
            total += match self.current_price(ctx, symbol) {
                Some(px) => {
                    (balance.raw() as i128) * (px.raw() as i128) / (Micros::PER_UNIT as i128)
                }
                None => balance.raw() as i128,
            };
        }
        Ok(Micros::new(i128_to_i64_clamp(total)))
    }

    // -----------------------------------------------------------------------
    // Read-only views
    // -----------------------------------------------------------------------

    /// Current mark for an account, through its price column.  `None` when
    /// the account has no price column, the column has no mark this step,
    /// or the symbol is unknown.
    pub fn current_price(&self, ctx: &StepContext, symbol: &str) -> Option<Micros> {
        self.accounts
            .get(symbol)?
            .price_column
            .as_deref()
            .and_then(|column| ctx.mark(column))
    }

    /// Balance of `symbol` at the context's step.
    pub fn balance(&self, ctx: &StepContext, symbol: &str) -> Result<Micros, BrokerError> {
        Ok(self.ledger.balance(ctx.step, symbol)?)
    }

    /// Outstanding orders awaiting a price cross (plus any resolved this
    /// step and not yet cleaned).
    pub fn pending_orders(&self) -> &[Order] {
        &self.pending
    }

    /// Look up an order still in the pending list.
    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.pending.iter().find(|o| o.id == id)
    }

    pub fn accounts(&self) -> &BTreeMap<String, Account> {
        &self.accounts
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Total portfolio value per processed step, oldest first.
    pub fn value_curve(&self) -> &[Micros] {
        &self.value_curve
    }

    /// Net fees charged so far, by currency.
    pub fn fees_collected(&self) -> &BTreeMap<String, Micros> {
        &self.fees_collected
    }

    /// The execution journal, oldest first.
    pub fn events(&self) -> &[ExecutionEvent] {
        &self.events
    }
}

fn i128_to_i64_clamp(x: i128) -> i64 {
    if x > i64::MAX as i128 {
        i64::MAX
    } else if x < i64::MIN as i128 {
        i64::MIN
    } else {
        x as i64
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::marks;

    fn usd_btc_broker(fees: FeeSchedule) -> Broker {
        Broker::new(
            vec![
                Account::cash("USD", Micros::from_whole(1000)),
                Account::priced("BTC", Micros::ZERO, "close"),
            ],
            fees,
        )
        .unwrap()
    }

    fn ctx(step: usize, close: i64) -> StepContext {
        StepContext::new(StepId::new(step), marks([("close", Micros::from_whole(close))]))
    }

    #[test]
    fn duplicate_account_rejected() {
        let err = Broker::new(
            vec![
                Account::cash("USD", Micros::ZERO),
                Account::cash("USD", Micros::ZERO),
            ],
            FeeSchedule::zero(),
        )
        .unwrap_err();
        assert!(matches!(err, BrokerError::DuplicateAccount { .. }));
    }

    #[test]
    fn market_buy_fills_in_same_call() {
        let mut broker = usd_btc_broker(FeeSchedule::zero());
        let c = ctx(0, 100);
        broker.process_step(&c).unwrap();

        let id = broker
            .buy_market(&c, "BTC", "USD", Micros::from_whole(1))
            .unwrap();
        assert!(id.is_some());

        assert_eq!(broker.balance(&c, "BTC").unwrap(), Micros::from_whole(1));
        assert_eq!(broker.balance(&c, "USD").unwrap(), Micros::from_whole(900));
        // market orders never enter the pending list
        assert!(broker.pending_orders().is_empty());
    }

    #[test]
    fn market_fee_debited_up_front() {
        let mut broker = usd_btc_broker(FeeSchedule::default());
        let c = ctx(0, 100);
        broker.process_step(&c).unwrap();

        broker
            .buy_market(&c, "BTC", "USD", Micros::from_whole(1))
            .unwrap();

        // 1000 - 100 - 0.25% of 100
        assert_eq!(
            broker.balance(&c, "USD").unwrap(),
            Micros::new(899_750_000)
        );
        assert_eq!(
            broker.fees_collected().get("USD"),
            Some(&Micros::new(250_000))
        );
    }

    #[test]
    fn limit_order_stays_pending_until_cross() {
        let mut broker = usd_btc_broker(FeeSchedule::zero());
        let c = ctx(0, 100);
        broker.process_step(&c).unwrap();

        let id = broker
            .buy_limit(&c, "BTC", "USD", Micros::from_whole(90), Micros::from_whole(1))
            .unwrap()
            .unwrap();
        assert_eq!(broker.order(id).unwrap().status, OrderStatus::Pending);
        // funds are committed immediately
        assert_eq!(broker.balance(&c, "USD").unwrap(), Micros::from_whole(910));
    }

    #[test]
    fn market_order_without_price_fails_fast() {
        let mut broker = usd_btc_broker(FeeSchedule::zero());
        let c = StepContext::new(StepId::new(0), crate::types::MarkMap::new());
        broker.process_step(&c).unwrap();

        let err = broker
            .buy_market(&c, "BTC", "USD", Micros::from_whole(1))
            .unwrap_err();
        assert_eq!(
            err,
            BrokerError::NoMarketPrice {
                symbol: "BTC".to_string()
            }
        );
        assert_eq!(broker.balance(&c, "USD").unwrap(), Micros::from_whole(1000));
    }

    #[test]
    fn unknown_leg_rejected_loudly() {
        let mut broker = usd_btc_broker(FeeSchedule::zero());
        let c = ctx(0, 100);
        broker.process_step(&c).unwrap();

        let err = broker
            .buy_limit(&c, "ETH", "USD", Micros::from_whole(90), Micros::from_whole(1))
            .unwrap_err();
        assert!(matches!(err, BrokerError::UnknownAccount { .. }));
    }

    #[test]
    fn non_positive_size_and_price_rejected() {
        let mut broker = usd_btc_broker(FeeSchedule::zero());
        let c = ctx(0, 100);
        broker.process_step(&c).unwrap();

        assert!(matches!(
            broker.buy_limit(&c, "BTC", "USD", Micros::from_whole(90), Micros::ZERO),
            Err(BrokerError::NonPositiveSize { .. })
        ));
        assert!(matches!(
            broker.buy_limit(&c, "BTC", "USD", Micros::ZERO, Micros::from_whole(1)),
            Err(BrokerError::NonPositivePrice { .. })
        ));
    }

    #[test]
    fn valuation_with_no_pending_orders_is_balance_times_price() {
        let mut broker = usd_btc_broker(FeeSchedule::zero());
        let c = ctx(0, 100);
        broker.process_step(&c).unwrap();
        broker
            .buy_market(&c, "BTC", "USD", Micros::from_whole(2))
            .unwrap();

        // USD 800 at face + 2 BTC at 100
        assert_eq!(broker.total_value(&c).unwrap(), Micros::from_whole(1000));
    }

    #[test]
    fn journal_records_placement_and_fill() {
        let mut broker = usd_btc_broker(FeeSchedule::zero());
        let c = ctx(0, 100);
        broker.process_step(&c).unwrap();
        broker
            .buy_market(&c, "BTC", "USD", Micros::from_whole(1))
            .unwrap();

        let events = broker.events();
        assert!(matches!(events[0], ExecutionEvent::Placed { .. }));
        assert!(matches!(events[1], ExecutionEvent::Filled { .. }));
    }
}
