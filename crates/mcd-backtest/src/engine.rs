//! The driver: steps the broker through the frame, runs strategy
//! callbacks, and assembles the report.
//!
//! Pipeline per step: MARKS -> BROKER -> STRATEGIES
//!
//! Strictly sequential, one step fully processed before the next; the
//! first error aborts the run (offline replay — nothing to retry).

use mcd_broker::{Broker, BrokerError, MarkMap, Micros, StepContext, StepId};
use mcd_strategy::{Strategy, StrategyHost, StrategyHostError};
use uuid::Uuid;

use crate::frame::Frame;
use crate::types::{BacktestConfig, BacktestReport, EventRow};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BacktestError {
    /// Strategy wiring problem, caught before any step is processed.
    Host(StrategyHostError),
    /// Forwarded engine error.
    Broker(BrokerError),
    /// The configured benchmark column does not exist in the frame.
    UnknownBenchmarkColumn { column: String },
}

impl From<StrategyHostError> for BacktestError {
    fn from(e: StrategyHostError) -> Self {
        BacktestError::Host(e)
    }
}

impl From<BrokerError> for BacktestError {
    fn from(e: BrokerError) -> Self {
        BacktestError::Broker(e)
    }
}

impl std::fmt::Display for BacktestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host(e) => write!(f, "strategy host: {e}"),
            Self::Broker(e) => write!(f, "broker: {e}"),
            Self::UnknownBenchmarkColumn { column } => {
                write!(f, "benchmark column '{column}' not in frame")
            }
        }
    }
}

impl std::error::Error for BacktestError {}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct BacktestEngine {
    config: BacktestConfig,
    frame: Frame,
    broker: Broker,
    host: StrategyHost,
}

impl std::fmt::Debug for BacktestEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // `host` holds `Box<dyn Strategy>` trait objects that cannot derive
        // Debug, so format the engine by hand and elide the host internals.
        f.debug_struct("BacktestEngine")
            .field("config", &self.config)
            .field("frame", &self.frame)
            .field("broker", &self.broker)
            .field("host", &"StrategyHost")
            .finish()
    }
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig, frame: Frame) -> Result<Self, BacktestError> {
        // Fail fast on a benchmark column the frame cannot provide.
        if let Some(column) = &config.benchmark_column {
            if frame.column(column).is_none() {
                return Err(BacktestError::UnknownBenchmarkColumn {
                    column: column.clone(),
                });
            }
        }
        let broker = Broker::new(config.broker_accounts(), config.fee_schedule())?;
        Ok(Self {
            config,
            frame,
            broker,
            host: StrategyHost::new(),
        })
    }

    /// Register a strategy.  Must be called before `run`.
    pub fn add_strategy(&mut self, strategy: Box<dyn Strategy>) {
        self.host.register(strategy);
    }

    /// Run the full replay and produce the report.
    pub fn run(mut self) -> Result<BacktestReport, BacktestError> {
        self.host.ensure_wired()?;
        self.host.initialize_all();

        let mut journaled = 0;
        for step in 0..self.frame.len() {
            let mut marks = MarkMap::new();
            for (column, value) in self.frame.row(step) {
                marks.insert(column.to_string(), Micros::new(value));
            }
            let ctx = StepContext::new(StepId::new(step), marks);

            self.broker.process_step(&ctx)?;
            self.host.on_step(&ctx, &mut self.broker)?;

            for event in &self.broker.events()[journaled..] {
                tracing::debug!(step, %event, "execution");
            }
            journaled = self.broker.events().len();
        }

        Ok(self.build_report())
    }

    fn build_report(&self) -> BacktestReport {
        let values: Vec<i64> = self.broker.value_curve().iter().map(|v| v.raw()).collect();

        let benchmark: Vec<Option<i64>> = match &self.config.benchmark_column {
            Some(column) => self
                .frame
                .column(column)
                .map(|cells| cells.to_vec())
                .unwrap_or_default(),
            None => Vec::new(),
        };

        let metrics = mcd_metrics::compute_report(&values, &benchmark);

        let final_balances_micros = self
            .broker
            .ledger()
            .rows()
            .last()
            .map(|row| {
                row.iter()
                    .map(|(symbol, balance)| (symbol.clone(), balance.raw()))
                    .collect()
            })
            .unwrap_or_default();

        let fees_paid_micros = self
            .broker
            .fees_collected()
            .iter()
            .map(|(symbol, fee)| (symbol.clone(), fee.raw()))
            .collect();

        let events: Vec<EventRow> = self.broker.events().iter().map(EventRow::from).collect();

        BacktestReport {
            run_id: self.run_id(),
            steps: self.frame.len(),
            value_curve_micros: values,
            final_balances_micros,
            fees_paid_micros,
            metrics,
            events,
        }
    }

    /// Deterministic run identity: v5 UUID over the config and the frame
    /// fingerprint.  Identical inputs, identical id.
    fn run_id(&self) -> String {
        let config_json =
            serde_json::to_string(&self.config).unwrap_or_else(|_| "unserializable".to_string());
        let first_ts = self.frame.index().first().copied().unwrap_or(0);
        let last_ts = self.frame.index().last().copied().unwrap_or(0);
        let name = format!(
            "mcd-backtest:{}:{}:{}:{}",
            config_json,
            self.frame.len(),
            first_ts,
            last_ts
        );
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }
}
