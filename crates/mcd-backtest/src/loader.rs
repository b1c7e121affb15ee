//! CSV loader (deterministic).
//!
//! Two input shapes:
//! - a header row naming the columns, or
//! - a headerless file with caller-supplied column names (common for raw
//!   exchange history exports).
//!
//! One column must be named `time` (epoch seconds).  Every other column is
//! parsed as a decimal number into micros exactly — no float round-trip —
//! and an empty cell is a missing value.  Rows are sorted ascending by
//! time, so exports delivered newest-first load the same as oldest-first.
//!
//! Column names are normalized to lowercase; configs reference them in
//! lowercase.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use mcd_broker::Micros;

use crate::frame::{Frame, FrameError};

/// Name of the required time column, after normalization.
pub const TIME_COLUMN: &str = "time";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Loader errors are small, explicit, and test-friendly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    EmptyInput,
    /// No `time` column in the header / supplied names.
    MissingTimeColumn,
    DuplicateColumn { column: String },
    /// A data row has a different number of fields than the header.
    ColumnCountMismatch {
        line: usize,
        expected: usize,
        got: usize,
    },
    /// A non-integer value in the time column.
    ParseTime { line: usize, value: String },
    /// A cell that is neither empty nor a decimal number.
    ParseValue {
        line: usize,
        column: String,
        value: String,
    },
    Io(String),
    Frame(FrameError),
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e.to_string())
    }
}

impl From<FrameError> for LoadError {
    fn from(e: FrameError) -> Self {
        LoadError::Frame(e)
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "empty input"),
            Self::MissingTimeColumn => write!(f, "no '{TIME_COLUMN}' column"),
            Self::DuplicateColumn { column } => write!(f, "duplicate column '{column}'"),
            Self::ColumnCountMismatch {
                line,
                expected,
                got,
            } => write!(f, "line {line}: expected {expected} fields, got {got}"),
            Self::ParseTime { line, value } => {
                write!(f, "line {line}: bad time value '{value}'")
            }
            Self::ParseValue {
                line,
                column,
                value,
            } => write!(f, "line {line}: bad value '{value}' in column '{column}'"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Frame(e) => write!(f, "frame: {e}"),
        }
    }
}

impl std::error::Error for LoadError {}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a frame from a CSV file on disk.
///
/// IO is explicit; parsing and sorting are deterministic.
pub fn load_csv_file(
    path: impl AsRef<Path>,
    column_names: Option<&[&str]>,
) -> Result<Frame, LoadError> {
    let s = fs::read_to_string(path)?;
    parse_csv_frame(&s, column_names)
}

/// Parse a frame from CSV content (pure, deterministic).
///
/// With `column_names` the input is headerless; otherwise the first
/// non-empty line is the header.
pub fn parse_csv_frame(csv: &str, column_names: Option<&[&str]>) -> Result<Frame, LoadError> {
    let mut lines = csv
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim().trim_start_matches('\u{feff}')))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

    let headers: Vec<String> = match column_names {
        Some(names) => names.iter().map(|n| normalize(n)).collect(),
        None => {
            let (_, header_line) = lines.next().ok_or(LoadError::EmptyInput)?;
            split_csv_line(header_line)
                .iter()
                .map(|h| normalize(h))
                .collect()
        }
    };

    let mut seen = BTreeMap::new();
    for (i, h) in headers.iter().enumerate() {
        if seen.insert(h.clone(), i).is_some() {
            return Err(LoadError::DuplicateColumn { column: h.clone() });
        }
    }
    let time_idx = *seen.get(TIME_COLUMN).ok_or(LoadError::MissingTimeColumn)?;

    // (time, cells-without-time) per row; sorted at the end.
    let mut rows: Vec<(i64, Vec<Option<i64>>)> = Vec::new();

    for (line_no, raw) in lines {
        let fields = split_csv_line(raw);
        if fields.len() != headers.len() {
            return Err(LoadError::ColumnCountMismatch {
                line: line_no,
                expected: headers.len(),
                got: fields.len(),
            });
        }

        let time: i64 = fields[time_idx]
            .trim()
            .parse()
            .map_err(|_| LoadError::ParseTime {
                line: line_no,
                value: fields[time_idx].clone(),
            })?;

        let mut cells = Vec::with_capacity(headers.len() - 1);
        for (i, field) in fields.iter().enumerate() {
            if i == time_idx {
                continue;
            }
            let trimmed = field.trim();
            if trimmed.is_empty() {
                cells.push(None);
                continue;
            }
            match Micros::parse_decimal(trimmed) {
                Some(v) => cells.push(Some(v.raw())),
                None => {
                    return Err(LoadError::ParseValue {
                        line: line_no,
                        column: headers[i].clone(),
                        value: trimmed.to_string(),
                    })
                }
            }
        }
        rows.push((time, cells));
    }

    if rows.is_empty() {
        return Err(LoadError::EmptyInput);
    }

    rows.sort_by_key(|(time, _)| *time);

    let index: Vec<i64> = rows.iter().map(|(time, _)| *time).collect();
    let value_names: Vec<&String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != time_idx)
        .map(|(_, h)| h)
        .collect();

    let mut columns: BTreeMap<String, Vec<Option<i64>>> = BTreeMap::new();
    for (col, name) in value_names.iter().enumerate() {
        let cells = rows.iter().map(|(_, row)| row[col]).collect();
        columns.insert((*name).clone(), cells);
    }

    Ok(Frame::new(index, columns)?)
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Minimal CSV splitting (no quoting support).
fn split_csv_line(line: &str) -> Vec<String> {
    line.split(',').map(|s| s.trim().to_string()).collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
