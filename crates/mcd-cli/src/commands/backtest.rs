//! `mcd backtest run` handler.
//!
//! Loads a CSV price history (optionally headerless and/or resampled),
//! loads or defaults the backtest config, wires the reference SMA-cross
//! strategy, runs the replay, prints a `key=value` summary, and writes the
//! JSON report when `--out` is given.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;

use mcd_backtest::{load_csv_file, Aggregate, BacktestConfig, BacktestEngine, Frame};
use mcd_broker::Micros;
use mcd_strategy::SmaCross;

#[derive(Args)]
pub struct RunArgs {
    /// CSV price history.
    #[arg(long)]
    pub data: PathBuf,

    /// Comma-separated column names for a headerless CSV
    /// (e.g. "time,low,high,open,close,volume").
    #[arg(long)]
    pub columns: Option<String>,

    /// Resample the history into fixed buckets of this many seconds
    /// (OHLCV aggregation over the columns that exist).
    #[arg(long)]
    pub resample_secs: Option<i64>,

    /// Backtest config JSON; defaults to a 1000 USD / 0 BTC setup.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Fast SMA window (steps).
    #[arg(long, default_value_t = 10)]
    pub fast: usize,

    /// Slow SMA window (steps).
    #[arg(long, default_value_t = 30)]
    pub slow: usize,

    /// Traded clip per signal, in base units (decimal).
    #[arg(long, default_value = "0.1")]
    pub trade_size: String,

    /// Base / quote accounts and the price column driving the signal.
    #[arg(long, default_value = "BTC")]
    pub base: String,
    #[arg(long, default_value = "USD")]
    pub quote: String,
    #[arg(long, default_value = "close")]
    pub price_column: String,

    /// Write the full JSON report here.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run(args: RunArgs) -> Result<()> {
    if args.fast == 0 || args.slow <= args.fast {
        anyhow::bail!(
            "--fast/--slow must satisfy 0 < fast < slow (got {} / {})",
            args.fast,
            args.slow
        );
    }
    let trade_size = Micros::parse_decimal(&args.trade_size)
        .filter(|size| size.is_positive())
        .with_context(|| format!("invalid --trade-size '{}'", args.trade_size))?;

    let frame = load_frame(&args)?;
    tracing::info!(rows = frame.len(), "loaded price history");

    let config = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("read config failed: {}", path.display()))?;
            serde_json::from_str::<BacktestConfig>(&raw)
                .with_context(|| format!("parse config failed: {}", path.display()))?
        }
        None => BacktestConfig::test_defaults(),
    };

    let mut engine = BacktestEngine::new(config, frame).context("engine setup failed")?;
    engine.add_strategy(Box::new(SmaCross::new(
        &args.base,
        &args.quote,
        &args.price_column,
        args.fast,
        args.slow,
        trade_size,
    )));

    let report = engine.run().context("backtest run failed")?;

    let fills = report.events.iter().filter(|e| e.action == "filled").count();
    println!(
        "backtest_ok=true run_id={} steps={} fills={}",
        report.run_id, report.steps, fills
    );
    println!(
        "ratio={} benchmark_ratio={}",
        fmt_ratio(report.metrics.ratio),
        fmt_ratio(report.metrics.benchmark_ratio)
    );
    for (symbol, balance_micros) in &report.final_balances_micros {
        println!("balance_{symbol}={}", Micros::new(*balance_micros));
    }
    println!("generated_at={}", Utc::now().to_rfc3339());

    if let Some(out) = &args.out {
        let json = serde_json::to_string_pretty(&report).context("serialize report failed")?;
        fs::write(out, json).with_context(|| format!("write report failed: {}", out.display()))?;
        println!("report_path={}", out.display());
    }

    Ok(())
}

fn load_frame(args: &RunArgs) -> Result<Frame> {
    let frame = match &args.columns {
        Some(names) => {
            let names: Vec<&str> = names.split(',').map(str::trim).collect();
            load_csv_file(&args.data, Some(&names))
        }
        None => load_csv_file(&args.data, None),
    }
    .with_context(|| format!("load data failed: {}", args.data.display()))?;

    match args.resample_secs {
        Some(bucket_secs) => {
            let spec: Vec<(&str, Aggregate)> = [
                ("open", Aggregate::First),
                ("high", Aggregate::Max),
                ("low", Aggregate::Min),
                ("close", Aggregate::Last),
                ("volume", Aggregate::Sum),
            ]
            .into_iter()
            .filter(|(column, _)| frame.column(column).is_some())
            .collect();
            frame
                .resample(bucket_secs, &spec)
                .context("resample failed")
        }
        None => Ok(frame),
    }
}

fn fmt_ratio(ratio: Option<f64>) -> String {
    match ratio {
        Some(value) => format!("{value:.6}"),
        None => "n/a".to_string(),
    }
}
