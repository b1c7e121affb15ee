//! mcd-metrics
//!
//! Derived metrics over a recorded valuation series:
//! - per-step simple return: `value[t] / value[t-1] - 1`
//! - cumulative return: `Π(1 + r) - 1`
//! - summary ratio: `mean(r) / stddev(r)` (sample stddev, n−1)
//! - the same ratio for a benchmark price series, for comparison
//!
//! This is the only layer allowed to use `f64`: the engine records exact
//! micros, and everything here is derived reporting.  Ratios are
//! `Option<f64>` — `None` stands in for "not computable" (fewer than two
//! finite returns, or zero dispersion); NaN is never reported.
//!
//! Inputs are raw `i64` micros so this crate stays decoupled from the
//! engine's money newtype.

use serde::{Deserialize, Serialize};

/// Micros per whole unit; must match the engine's fixed-point scale.
const MICROS_SCALE: f64 = 1_000_000.0;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Everything derived from one valuation series.
///
/// `returns[t]` and `cumulative_returns[t]` describe the move from step `t`
/// to step `t+1`; both are one element shorter than the value series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub returns: Vec<f64>,
    pub cumulative_returns: Vec<f64>,
    /// mean/stddev of the portfolio returns.
    pub ratio: Option<f64>,
    /// mean/stddev of the benchmark price returns, when a benchmark series
    /// was supplied.
    pub benchmark_ratio: Option<f64>,
}

/// Compute the full report.  `benchmark` may be empty (no benchmark) and
/// may contain gaps; gaps are carried forward from the last observation
/// before differencing.
pub fn compute_report(values_micros: &[i64], benchmark_micros: &[Option<i64>]) -> MetricsReport {
    let returns = simple_returns(values_micros);
    let cumulative_returns = cumulative_returns(&returns);
    let ratio = mean_over_stddev(&returns);

    let benchmark_ratio = if benchmark_micros.is_empty() {
        None
    } else {
        let filled = forward_fill(benchmark_micros);
        let series: Vec<i64> = filled.into_iter().flatten().collect();
        mean_over_stddev(&simple_returns(&series))
    };

    MetricsReport {
        returns,
        cumulative_returns,
        ratio,
        benchmark_ratio,
    }
}

// ---------------------------------------------------------------------------
// Series arithmetic
// ---------------------------------------------------------------------------

/// Per-step simple returns.  One element shorter than the input; an empty
/// or single-point series has no returns.  A zero previous value yields
/// NaN, which the ratio stage ignores.
pub fn simple_returns(values_micros: &[i64]) -> Vec<f64> {
    values_micros
        .windows(2)
        .map(|pair| {
            let prev = pair[0] as f64 / MICROS_SCALE;
            let cur = pair[1] as f64 / MICROS_SCALE;
            if prev == 0.0 {
                f64::NAN
            } else {
                cur / prev - 1.0
            }
        })
        .collect()
}

/// Cumulative compound returns: element `t` is `Π_{i<=t}(1 + r_i) - 1`.
pub fn cumulative_returns(returns: &[f64]) -> Vec<f64> {
    let mut acc = 1.0;
    returns
        .iter()
        .map(|r| {
            acc *= 1.0 + r;
            acc - 1.0
        })
        .collect()
}

/// `mean / stddev` over the finite elements of `returns` (sample stddev,
/// n−1 denominator).  `None` when fewer than two finite elements remain or
/// dispersion is zero.
pub fn mean_over_stddev(returns: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = returns.iter().copied().filter(|r| r.is_finite()).collect();
    if finite.len() < 2 {
        return None;
    }

    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let var = finite.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stddev = var.sqrt();

    if stddev == 0.0 || !stddev.is_finite() {
        return None;
    }
    let ratio = mean / stddev;
    ratio.is_finite().then_some(ratio)
}

/// Carry gaps forward from the last observation.  Leading gaps stay `None`.
pub fn forward_fill(series: &[Option<i64>]) -> Vec<Option<i64>> {
    let mut last = None;
    series
        .iter()
        .map(|cell| {
            if cell.is_some() {
                last = *cell;
            }
            last
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
