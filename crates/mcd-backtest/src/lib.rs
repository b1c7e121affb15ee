//! mcd-backtest
//!
//! The backtest driver around the core engine:
//! - `Frame`: ordered, time-indexed price/volume table with first-class
//!   missing values, plus OHLCV resampling
//! - CSV loader (header or caller-named columns; decimal cells parsed to
//!   micros exactly)
//! - `BacktestEngine`: per-step mark map -> broker processing -> strategy
//!   callbacks, then report assembly with a deterministic run id

mod engine;
mod frame;
mod loader;
mod types;

pub use engine::{BacktestEngine, BacktestError};
pub use frame::{Aggregate, Frame, FrameError};
pub use loader::{load_csv_file, parse_csv_frame, LoadError, TIME_COLUMN};
pub use types::{AccountSpec, BacktestConfig, BacktestReport, EventRow};
