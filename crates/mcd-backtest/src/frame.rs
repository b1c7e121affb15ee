//! The ordered, time-indexed price/volume table the driver feeds from.
//!
//! Column-oriented: one `Vec<Option<i64>>` of micros cells per named
//! column, all aligned to a shared epoch-seconds index.  A missing cell is
//! a first-class `None`, not a sentinel — downstream that means "no
//! current price", never an error.

use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// A column's cell count differs from the index length.
    LengthMismatch {
        column: String,
        expected: usize,
        got: usize,
    },
    /// The index must be non-decreasing.
    UnsortedIndex { position: usize },
    /// Resample bucket width must be positive.
    NonPositiveBucket { bucket_secs: i64 },
    /// A referenced column does not exist.
    UnknownColumn { column: String },
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LengthMismatch {
                column,
                expected,
                got,
            } => write!(
                f,
                "column '{column}' has {got} cells, index has {expected}"
            ),
            Self::UnsortedIndex { position } => {
                write!(f, "index is not sorted at position {position}")
            }
            Self::NonPositiveBucket { bucket_secs } => {
                write!(f, "resample bucket must be > 0 secs, got {bucket_secs}")
            }
            Self::UnknownColumn { column } => write!(f, "unknown column '{column}'"),
        }
    }
}

impl std::error::Error for FrameError {}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Per-column aggregate used by [`Frame::resample`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Aggregate {
    First,
    Max,
    Min,
    Last,
    Sum,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    index: Vec<i64>,
    columns: BTreeMap<String, Vec<Option<i64>>>,
}

impl Frame {
    /// Build a frame, validating alignment and index order.
    pub fn new(
        index: Vec<i64>,
        columns: BTreeMap<String, Vec<Option<i64>>>,
    ) -> Result<Self, FrameError> {
        for (position, pair) in index.windows(2).enumerate() {
            if pair[0] > pair[1] {
                return Err(FrameError::UnsortedIndex {
                    position: position + 1,
                });
            }
        }
        for (name, cells) in &columns {
            if cells.len() != index.len() {
                return Err(FrameError::LengthMismatch {
                    column: name.clone(),
                    expected: index.len(),
                    got: cells.len(),
                });
            }
        }
        Ok(Self { index, columns })
    }

    /// An empty frame with no columns.
    pub fn empty() -> Self {
        Self {
            index: Vec::new(),
            columns: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Epoch-seconds index, oldest first.
    pub fn index(&self) -> &[i64] {
        &self.index
    }

    pub fn column(&self, name: &str) -> Option<&[Option<i64>]> {
        self.columns.get(name).map(|c| c.as_slice())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|s| s.as_str())
    }

    /// The present cells of one row: column name -> micros value.
    pub fn row(&self, idx: usize) -> BTreeMap<&str, i64> {
        let mut out = BTreeMap::new();
        for (name, cells) in &self.columns {
            if let Some(Some(value)) = cells.get(idx) {
                out.insert(name.as_str(), *value);
            }
        }
        out
    }

    /// Aggregate rows into fixed `bucket_secs` intervals.
    ///
    /// The result has one row per bucket between the first and last
    /// observation, inclusive and contiguous — a bucket with no rows (or a
    /// column with no present cells in a bucket) yields `None` cells, the
    /// same "missing" the rest of the system already understands.  Only
    /// the columns named in `spec` survive.
    pub fn resample(
        &self,
        bucket_secs: i64,
        spec: &[(&str, Aggregate)],
    ) -> Result<Frame, FrameError> {
        if bucket_secs <= 0 {
            return Err(FrameError::NonPositiveBucket { bucket_secs });
        }
        for (column, _) in spec {
            if !self.columns.contains_key(*column) {
                return Err(FrameError::UnknownColumn {
                    column: column.to_string(),
                });
            }
        }
        if self.is_empty() {
            let columns = spec
                .iter()
                .map(|(name, _)| (name.to_string(), Vec::new()))
                .collect();
            return Frame::new(Vec::new(), columns);
        }

        let first_bucket = self.index[0].div_euclid(bucket_secs);
        let last_bucket = self.index[self.index.len() - 1].div_euclid(bucket_secs);

        let mut new_index = Vec::new();
        let mut new_columns: BTreeMap<String, Vec<Option<i64>>> = spec
            .iter()
            .map(|(name, _)| (name.to_string(), Vec::new()))
            .collect();

        // The index is sorted, so each bucket is a contiguous row range.
        let mut row = 0;
        for bucket in first_bucket..=last_bucket {
            let bucket_end_ts = (bucket + 1) * bucket_secs;
            let start_row = row;
            while row < self.index.len() && self.index[row] < bucket_end_ts {
                row += 1;
            }

            new_index.push(bucket * bucket_secs);
            for (name, aggregate) in spec {
                let cells = &self.columns[*name][start_row..row];
                let value = aggregate_cells(cells, *aggregate);
                new_columns.get_mut(*name).expect("spec column").push(value);
            }
        }

        Frame::new(new_index, new_columns)
    }
}

/// Fold the present cells of one bucket.  All-missing buckets stay missing.
fn aggregate_cells(cells: &[Option<i64>], aggregate: Aggregate) -> Option<i64> {
    let mut present = cells.iter().flatten().copied();
    let first = present.next()?;
    Some(match aggregate {
        Aggregate::First => first,
        Aggregate::Last => present.last().unwrap_or(first),
        Aggregate::Max => present.fold(first, i64::max),
        Aggregate::Min => present.fold(first, i64::min),
        Aggregate::Sum => present.fold(first, i64::saturating_add),
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: Vec<i64>, cols: &[(&str, Vec<Option<i64>>)]) -> Frame {
        let columns = cols
            .iter()
            .map(|(name, cells)| (name.to_string(), cells.clone()))
            .collect();
        Frame::new(index, columns).unwrap()
    }

    #[test]
    fn misaligned_column_rejected() {
        let mut columns = BTreeMap::new();
        columns.insert("close".to_string(), vec![Some(1)]);
        let err = Frame::new(vec![0, 60], columns).unwrap_err();
        assert!(matches!(err, FrameError::LengthMismatch { .. }));
    }

    #[test]
    fn unsorted_index_rejected() {
        let err = Frame::new(vec![60, 0], BTreeMap::new()).unwrap_err();
        assert_eq!(err, FrameError::UnsortedIndex { position: 1 });
    }

    #[test]
    fn row_skips_missing_cells() {
        let f = frame(
            vec![0, 60],
            &[
                ("close", vec![Some(100), None]),
                ("volume", vec![Some(5), Some(6)]),
            ],
        );
        let row1 = f.row(1);
        assert_eq!(row1.get("close"), None);
        assert_eq!(row1.get("volume"), Some(&6));
    }

    #[test]
    fn resample_ohlcv_semantics() {
        // Two 60s buckets of 30s rows.
        let f = frame(
            vec![0, 30, 60, 90],
            &[
                ("open", vec![Some(10), Some(12), Some(20), Some(22)]),
                ("high", vec![Some(15), Some(13), Some(25), Some(23)]),
                ("low", vec![Some(9), Some(11), Some(19), Some(21)]),
                ("close", vec![Some(12), Some(11), Some(22), Some(21)]),
                ("volume", vec![Some(1), Some(2), Some(3), Some(4)]),
            ],
        );
        let out = f
            .resample(
                60,
                &[
                    ("open", Aggregate::First),
                    ("high", Aggregate::Max),
                    ("low", Aggregate::Min),
                    ("close", Aggregate::Last),
                    ("volume", Aggregate::Sum),
                ],
            )
            .unwrap();

        assert_eq!(out.index(), &[0, 60]);
        assert_eq!(out.column("open").unwrap(), &[Some(10), Some(20)]);
        assert_eq!(out.column("high").unwrap(), &[Some(15), Some(25)]);
        assert_eq!(out.column("low").unwrap(), &[Some(9), Some(19)]);
        assert_eq!(out.column("close").unwrap(), &[Some(11), Some(21)]);
        assert_eq!(out.column("volume").unwrap(), &[Some(3), Some(7)]);
    }

    #[test]
    fn resample_fills_empty_buckets_with_missing() {
        // Rows at 0s and 180s: the 60s and 120s buckets are empty.
        let f = frame(vec![0, 180], &[("close", vec![Some(1), Some(2)])]);
        let out = f.resample(60, &[("close", Aggregate::Last)]).unwrap();
        assert_eq!(out.index(), &[0, 60, 120, 180]);
        assert_eq!(
            out.column("close").unwrap(),
            &[Some(1), None, None, Some(2)]
        );
    }

    #[test]
    fn resample_skips_missing_cells_within_a_bucket() {
        let f = frame(vec![0, 30], &[("close", vec![None, Some(7)])]);
        let out = f.resample(60, &[("close", Aggregate::First)]).unwrap();
        assert_eq!(out.column("close").unwrap(), &[Some(7)]);
    }

    #[test]
    fn resample_unknown_column_rejected() {
        let f = frame(vec![0], &[("close", vec![Some(1)])]);
        let err = f.resample(60, &[("open", Aggregate::First)]).unwrap_err();
        assert!(matches!(err, FrameError::UnknownColumn { .. }));
    }

    #[test]
    fn resample_drops_columns_not_in_spec() {
        let f = frame(
            vec![0],
            &[("close", vec![Some(1)]), ("noise", vec![Some(9)])],
        );
        let out = f.resample(60, &[("close", Aggregate::Last)]).unwrap();
        assert!(out.column("noise").is_none());
    }
}
