//! Reference strategy: simple-moving-average crossover.
//!
//! Tracks the close marks it has seen, and on each step compares a fast
//! and a slow SMA.  A fast-over-slow cross buys a fixed clip at market; a
//! slow-over-fast cross sells the same clip.  Rejected placements
//! (insufficient funds) are silently skipped, like any other strategy
//! order the broker declines.
//!
//! SMA comparison stays in integer arithmetic: `mean(fast) > mean(slow)`
//! is evaluated as `sum(fast)·slow_len > sum(slow)·fast_len`.

use mcd_broker::{Broker, BrokerError, Micros, StepContext};

use crate::types::Strategy;

pub struct SmaCross {
    base: String,
    quote: String,
    price_column: String,
    fast: usize,
    slow: usize,
    trade_size: Micros,
    closes: Vec<i64>,
    fast_was_above: Option<bool>,
}

impl SmaCross {
    pub fn new(
        base: impl Into<String>,
        quote: impl Into<String>,
        price_column: impl Into<String>,
        fast: usize,
        slow: usize,
        trade_size: Micros,
    ) -> Self {
        debug_assert!(fast > 0 && slow > fast, "windows must satisfy 0 < fast < slow");
        debug_assert!(trade_size.is_positive());
        Self {
            base: base.into(),
            quote: quote.into(),
            price_column: price_column.into(),
            fast,
            slow,
            trade_size,
            closes: Vec::new(),
            fast_was_above: None,
        }
    }

    fn tail_sum(&self, len: usize) -> i128 {
        self.closes[self.closes.len() - len..]
            .iter()
            .map(|&px| px as i128)
            .sum()
    }
}

impl Strategy for SmaCross {
    fn name(&self) -> &str {
        "sma-cross"
    }

    fn on_step(&mut self, ctx: &StepContext, broker: &mut Broker) -> Result<(), BrokerError> {
        // A step without a mark contributes nothing to the windows.
        let Some(mark) = ctx.mark(&self.price_column) else {
            return Ok(());
        };
        self.closes.push(mark.raw());
        if self.closes.len() < self.slow {
            return Ok(());
        }

        let fast_above =
            self.tail_sum(self.fast) * self.slow as i128 > self.tail_sum(self.slow) * self.fast as i128;

        match (self.fast_was_above, fast_above) {
            (Some(false), true) => {
                broker.buy_market(ctx, &self.base, &self.quote, self.trade_size)?;
            }
            (Some(true), false) => {
                broker.sell_market(ctx, &self.base, &self.quote, self.trade_size)?;
            }
            _ => {}
        }
        self.fast_was_above = Some(fast_above);
        Ok(())
    }
}
