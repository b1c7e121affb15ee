use std::collections::BTreeMap;

use mcd_broker::{Account, ExecutionEvent, FeeSchedule, Micros};
use mcd_metrics::MetricsReport;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// One account to register with the broker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSpec {
    pub symbol: String,
    pub starting_balance_micros: i64,
    /// Frame column that values this account; `None` = valuation currency.
    #[serde(default)]
    pub price_column: Option<String>,
}

/// Backtest configuration (serde: loaded from JSON by the CLI).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub accounts: Vec<AccountSpec>,

    /// Limit-order fee in basis points.
    #[serde(default = "default_limit_fee_bps")]
    pub limit_fee_bps: i64,

    /// Market-order fee in basis points.
    #[serde(default = "default_market_fee_bps")]
    pub market_fee_bps: i64,

    /// Frame column whose own returns are reported next to the portfolio's,
    /// as a buy-and-hold comparison.
    #[serde(default)]
    pub benchmark_column: Option<String>,
}

fn default_limit_fee_bps() -> i64 {
    FeeSchedule::DEFAULT_LIMIT_FEE_BPS
}

fn default_market_fee_bps() -> i64 {
    FeeSchedule::DEFAULT_MARKET_FEE_BPS
}

impl BacktestConfig {
    /// Reasonable defaults for testing: 1000 USD cash, a BTC account
    /// valued by `close`, default fees, `close` as the benchmark.
    pub fn test_defaults() -> Self {
        Self {
            accounts: vec![
                AccountSpec {
                    symbol: "USD".to_string(),
                    starting_balance_micros: 1_000_000_000,
                    price_column: None,
                },
                AccountSpec {
                    symbol: "BTC".to_string(),
                    starting_balance_micros: 0,
                    price_column: Some("close".to_string()),
                },
            ],
            limit_fee_bps: FeeSchedule::DEFAULT_LIMIT_FEE_BPS,
            market_fee_bps: FeeSchedule::DEFAULT_MARKET_FEE_BPS,
            benchmark_column: Some("close".to_string()),
        }
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::new(self.limit_fee_bps, self.market_fee_bps)
    }

    pub fn broker_accounts(&self) -> Vec<Account> {
        self.accounts
            .iter()
            .map(|spec| Account {
                symbol: spec.symbol.clone(),
                starting_balance: Micros::new(spec.starting_balance_micros),
                price_column: spec.price_column.clone(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// One execution-journal entry, flattened for serialization.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EventRow {
    pub step: usize,
    pub action: &'static str,
    pub order_id: Option<u64>,
    pub side: Option<&'static str>,
    pub kind: Option<&'static str>,
    pub base: String,
    pub quote: String,
    pub price_micros: Option<i64>,
    pub size_micros: Option<i64>,
    /// Refund amount for cancellations.
    pub amount_micros: Option<i64>,
}

impl From<&ExecutionEvent> for EventRow {
    fn from(event: &ExecutionEvent) -> Self {
        match event {
            ExecutionEvent::Placed {
                step,
                id,
                side,
                kind,
                base,
                quote,
                price,
                size,
            } => EventRow {
                step: step.index(),
                action: "placed",
                order_id: Some(id.raw()),
                side: Some(side.label()),
                kind: Some(kind.label()),
                base: base.clone(),
                quote: quote.clone(),
                price_micros: Some(price.raw()),
                size_micros: Some(size.raw()),
                amount_micros: None,
            },
            ExecutionEvent::Filled {
                step,
                id,
                side,
                kind,
                base,
                quote,
                price,
                size,
            } => EventRow {
                step: step.index(),
                action: "filled",
                order_id: Some(id.raw()),
                side: Some(side.label()),
                kind: Some(kind.label()),
                base: base.clone(),
                quote: quote.clone(),
                price_micros: Some(price.raw()),
                size_micros: Some(size.raw()),
                amount_micros: None,
            },
            ExecutionEvent::Cancelled {
                step,
                id,
                base,
                quote,
                refund,
            } => EventRow {
                step: step.index(),
                action: "cancelled",
                order_id: Some(id.raw()),
                side: None,
                kind: None,
                base: base.clone(),
                quote: quote.clone(),
                price_micros: None,
                size_micros: None,
                amount_micros: Some(refund.raw()),
            },
            ExecutionEvent::Rejected {
                step,
                side,
                kind,
                base,
                quote,
                required,
                available,
            } => EventRow {
                step: step.index(),
                action: "rejected",
                order_id: None,
                side: Some(side.label()),
                kind: Some(kind.label()),
                base: base.clone(),
                quote: quote.clone(),
                price_micros: None,
                size_micros: None,
                // how much the guard wanted vs. had, packed as the delta
                amount_micros: Some(required.raw() - available.raw()),
            },
        }
    }
}

/// Everything a run produces, ready for JSON output.
///
/// Deterministic: the run id is a v5 UUID over the config and the frame
/// fingerprint, so identical inputs produce an identical report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BacktestReport {
    pub run_id: String,
    pub steps: usize,
    pub value_curve_micros: Vec<i64>,
    pub final_balances_micros: BTreeMap<String, i64>,
    pub fees_paid_micros: BTreeMap<String, i64>,
    pub metrics: MetricsReport,
    pub events: Vec<EventRow>,
}
