use std::cmp::Ordering;
use std::fmt::Display;

use log::{debug, warn};

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

/// Decimal places m/z channels are rounded to
pub const MZ_PRECISION: u32 = 3;
/// Decimal places wavelength channels are rounded to
pub const WAVELENGTH_PRECISION: u32 = 1;
/// The largest dense matrix, in bytes, built before switching to sparse storage
pub const DEFAULT_DENSE_THRESHOLD: usize = 256 * 1024 * 1024;

/// One scan's channel keys and intensities before alignment.
///
/// `keys` and `values` are parallel sequences and are expected to have the
/// same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawScan {
    pub time: f64,
    pub keys: Vec<f64>,
    pub values: Vec<f64>,
}

impl RawScan {
    pub fn new(time: f64, keys: Vec<f64>, values: Vec<f64>) -> Self {
        Self { time, keys, values }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The sum of this scan's intensities
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }
}

/// Round `x` to `precision` decimal places
#[inline]
pub fn round_key(x: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (x * factor).round() / factor
}

/// A strictly increasing sequence of rounded channel keys
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelAxis {
    values: Vec<f64>,
    precision: u32,
}

impl ChannelAxis {
    /// Build an axis from arbitrary keys: round, sort and deduplicate them.
    /// Non-finite keys are ignored.
    pub fn from_keys<I: IntoIterator<Item = f64>>(keys: I, precision: u32) -> Self {
        let mut values: Vec<f64> = keys
            .into_iter()
            .filter(|k| k.is_finite())
            .map(|k| round_key(k, precision))
            .collect();
        values.sort_by(f64::total_cmp);
        values.dedup();
        Self { values, precision }
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.values.iter()
    }

    /// Find the column `key` falls into after rounding
    pub fn column_of(&self, key: f64) -> Option<usize> {
        let rounded = round_key(key, self.precision);
        self.values
            .binary_search_by(|value| value.partial_cmp(&rounded).unwrap_or(Ordering::Less))
            .ok()
    }
}

/// A scans × channels grid of intensities.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntensityMatrix {
    /// Row-major storage of every cell
    Dense {
        rows: usize,
        columns: usize,
        data: Vec<f64>,
    },
    /// `(row, column, value)` triples for non-zero cells, ordered by row then column
    Sparse {
        rows: usize,
        columns: usize,
        entries: Vec<(usize, usize, f64)>,
    },
}

impl Default for IntensityMatrix {
    fn default() -> Self {
        Self::Dense {
            rows: 0,
            columns: 0,
            data: Vec::new(),
        }
    }
}

impl IntensityMatrix {
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Self::Dense { rows, columns, .. } | Self::Sparse { rows, columns, .. } => {
                (*rows, *columns)
            }
        }
    }

    pub fn rows(&self) -> usize {
        self.shape().0
    }

    pub fn columns(&self) -> usize {
        self.shape().1
    }

    pub fn is_dense(&self) -> bool {
        matches!(self, Self::Dense { .. })
    }

    pub fn is_empty(&self) -> bool {
        let (rows, columns) = self.shape();
        rows == 0 || columns == 0
    }

    /// The value at `(row, column)`, zero for unset sparse cells and `None`
    /// outside the matrix
    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        let (rows, columns) = self.shape();
        if row >= rows || column >= columns {
            return None;
        }
        match self {
            Self::Dense { data, .. } => data.get(row * columns + column).copied(),
            Self::Sparse { entries, .. } => Some(
                entries
                    .binary_search_by(|(r, c, _)| (*r, *c).cmp(&(row, column)))
                    .map(|i| entries[i].2)
                    .unwrap_or(0.0),
            ),
        }
    }

    /// Materialize one row
    pub fn row(&self, row: usize) -> Option<Vec<f64>> {
        let (rows, columns) = self.shape();
        if row >= rows {
            return None;
        }
        match self {
            Self::Dense { data, .. } => Some(data[row * columns..(row + 1) * columns].to_vec()),
            Self::Sparse { entries, .. } => {
                let mut out = vec![0.0; columns];
                let start = entries.partition_point(|(r, _, _)| *r < row);
                for (_, c, v) in entries[start..].iter().take_while(|(r, _, _)| *r == row) {
                    out[*c] = *v;
                }
                Some(out)
            }
        }
    }

    /// The sum of every row, in row order
    pub fn row_sums(&self) -> Vec<f64> {
        let (rows, columns) = self.shape();
        match self {
            Self::Dense { data, .. } => {
                if columns == 0 {
                    return vec![0.0; rows];
                }
                data.chunks(columns).map(|r| r.iter().sum()).collect()
            }
            Self::Sparse { entries, .. } => {
                let mut sums = vec![0.0; rows];
                for (r, _, v) in entries {
                    sums[*r] += v;
                }
                sums
            }
        }
    }

    /// Convert to row-major dense storage
    pub fn to_dense(&self) -> Vec<f64> {
        match self {
            Self::Dense { data, .. } => data.clone(),
            Self::Sparse {
                rows,
                columns,
                entries,
            } => {
                let mut data = vec![0.0; rows * columns];
                for (r, c, v) in entries {
                    data[r * columns + c] = *v;
                }
                data
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SkipReason {
    LengthMismatch { keys: usize, values: usize },
    NonFiniteKey { position: usize },
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LengthMismatch { keys, values } => {
                write!(f, "{keys} keys but {values} values")
            }
            Self::NonFiniteKey { position } => write!(f, "non-finite key at position {position}"),
        }
    }
}

/// A scan left out of the matrix and why
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkippedScan {
    pub index: usize,
    pub reason: SkipReason,
}

/// The aligned output of [`ChannelMatrixBuilder::build`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelMatrix {
    pub axis: ChannelAxis,
    pub matrix: IntensityMatrix,
    /// The time of each matrix row
    pub times: Vec<f64>,
    pub skipped: Vec<SkippedScan>,
}

/**
Aligns scans that each sample a different set of channels onto a shared,
rounded channel axis.

Keys are rounded to `precision` decimal places, and the sorted union of
rounded keys over every accepted scan becomes the [`ChannelAxis`]. Each scan
becomes one matrix row, in input order. Keys within one scan that round to
the same channel are summed.

The matrix is stored densely when `rows * columns * 8` fits within
`dense_threshold` bytes, and as sparse triples of non-zero cells otherwise.
*/
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMatrixBuilder {
    pub precision: u32,
    pub dense_threshold: usize,
}

impl Default for ChannelMatrixBuilder {
    fn default() -> Self {
        Self::new(MZ_PRECISION)
    }
}

impl ChannelMatrixBuilder {
    pub fn new(precision: u32) -> Self {
        Self {
            precision,
            dense_threshold: DEFAULT_DENSE_THRESHOLD,
        }
    }

    pub fn for_mz() -> Self {
        Self::new(MZ_PRECISION)
    }

    pub fn for_wavelength() -> Self {
        Self::new(WAVELENGTH_PRECISION)
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_dense_threshold(mut self, dense_threshold: usize) -> Self {
        self.dense_threshold = dense_threshold;
        self
    }

    fn check_scan(scan: &RawScan) -> Result<(), SkipReason> {
        if scan.keys.len() != scan.values.len() {
            return Err(SkipReason::LengthMismatch {
                keys: scan.keys.len(),
                values: scan.values.len(),
            });
        }
        if let Some(position) = scan.keys.iter().position(|k| !k.is_finite()) {
            return Err(SkipReason::NonFiniteKey { position });
        }
        Ok(())
    }

    /// Resolve one scan to `(column, summed value)` pairs ordered by column
    fn resolve_row(axis: &ChannelAxis, scan: &RawScan) -> Vec<(usize, f64)> {
        let mut cells: Vec<(usize, f64)> = scan
            .keys
            .iter()
            .zip(scan.values.iter())
            .filter_map(|(k, v)| axis.column_of(*k).map(|c| (c, *v)))
            .collect();
        cells.sort_by_key(|(c, _)| *c);
        let mut merged: Vec<(usize, f64)> = Vec::with_capacity(cells.len());
        for (c, v) in cells {
            match merged.last_mut() {
                Some((last, acc)) if *last == c => *acc += v,
                _ => merged.push((c, v)),
            }
        }
        merged
    }

    #[cfg(feature = "parallelism")]
    fn resolve_rows(axis: &ChannelAxis, scans: &[&RawScan]) -> Vec<Vec<(usize, f64)>> {
        scans
            .par_iter()
            .map(|scan| Self::resolve_row(axis, scan))
            .collect()
    }

    #[cfg(not(feature = "parallelism"))]
    fn resolve_rows(axis: &ChannelAxis, scans: &[&RawScan]) -> Vec<Vec<(usize, f64)>> {
        scans
            .iter()
            .map(|scan| Self::resolve_row(axis, scan))
            .collect()
    }

    fn use_dense(&self, rows: usize, columns: usize) -> bool {
        rows.checked_mul(columns)
            .and_then(|cells| cells.checked_mul(std::mem::size_of::<f64>()))
            .is_some_and(|bytes| bytes <= self.dense_threshold)
    }

    pub fn build(&self, scans: &[RawScan]) -> ChannelMatrix {
        let mut skipped = Vec::new();
        let accepted: Vec<&RawScan> = scans
            .iter()
            .enumerate()
            .filter_map(|(index, scan)| match Self::check_scan(scan) {
                Ok(()) => Some(scan),
                Err(reason) => {
                    warn!("Skipping scan {index}: {reason}");
                    skipped.push(SkippedScan { index, reason });
                    None
                }
            })
            .collect();

        let axis = ChannelAxis::from_keys(
            accepted.iter().flat_map(|s| s.keys.iter().copied()),
            self.precision,
        );
        let rows = accepted.len();
        let columns = axis.len();
        let times = accepted.iter().map(|s| s.time).collect();
        let resolved = Self::resolve_rows(&axis, &accepted);

        let matrix = if self.use_dense(rows, columns) {
            let mut data = vec![0.0; rows * columns];
            for (r, cells) in resolved.into_iter().enumerate() {
                let row = &mut data[r * columns..(r + 1) * columns];
                for (c, v) in cells {
                    row[c] = v;
                }
            }
            IntensityMatrix::Dense {
                rows,
                columns,
                data,
            }
        } else {
            debug!("Building sparse {rows} x {columns} matrix");
            let entries = resolved
                .into_iter()
                .enumerate()
                .flat_map(|(r, cells)| {
                    cells
                        .into_iter()
                        .filter(|(_, v)| *v != 0.0)
                        .map(move |(c, v)| (r, c, v))
                })
                .collect();
            IntensityMatrix::Sparse {
                rows,
                columns,
                entries,
            }
        };

        ChannelMatrix {
            axis,
            matrix,
            times,
            skipped,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn scans() -> Vec<RawScan> {
        vec![
            RawScan::new(0.1, vec![101.2, 100.0, 150.5], vec![5.0, 10.0, 2.0]),
            RawScan::new(0.2, vec![100.0, 200.25], vec![3.0, 7.0]),
            RawScan::new(0.3, vec![], vec![]),
        ]
    }

    #[test]
    fn test_build_dense() {
        let built = ChannelMatrixBuilder::for_mz().build(&scans());
        assert_eq!(built.axis.as_slice(), &[100.0, 101.2, 150.5, 200.25]);
        assert!(built.matrix.is_dense());
        assert_eq!(built.matrix.shape(), (3, 4));
        assert_eq!(built.matrix.row(0).unwrap(), vec![10.0, 5.0, 2.0, 0.0]);
        assert_eq!(built.matrix.row(1).unwrap(), vec![3.0, 0.0, 0.0, 7.0]);
        assert_eq!(built.matrix.row(2).unwrap(), vec![0.0; 4]);
        assert_eq!(built.times, vec![0.1, 0.2, 0.3]);
        assert_eq!(built.matrix.row_sums(), vec![17.0, 10.0, 0.0]);
        assert!(built.skipped.is_empty());
    }

    #[test]
    fn test_sparse_matches_dense() {
        let dense = ChannelMatrixBuilder::for_mz().build(&scans());
        let sparse = ChannelMatrixBuilder::for_mz()
            .with_dense_threshold(0)
            .build(&scans());
        assert!(!sparse.matrix.is_dense());
        assert_eq!(sparse.axis, dense.axis);
        assert_eq!(sparse.matrix.to_dense(), dense.matrix.to_dense());
        assert_eq!(sparse.matrix.get(1, 3), Some(7.0));
        assert_eq!(sparse.matrix.get(1, 2), Some(0.0));
        assert_eq!(sparse.matrix.get(3, 0), None);
        assert_eq!(sparse.matrix.row_sums(), dense.matrix.row_sums());
        if let IntensityMatrix::Sparse { entries, .. } = &sparse.matrix {
            assert_eq!(entries.len(), 5);
        }
    }

    #[test]
    fn test_colliding_keys_are_summed() {
        let built = ChannelMatrixBuilder::for_mz().build(&[RawScan::new(
            0.0,
            vec![100.0009, 100.0011],
            vec![1.0, 2.0],
        )]);
        assert_eq!(built.axis.as_slice(), &[100.001]);
        assert_eq!(built.matrix.get(0, 0), Some(3.0));

        let built = ChannelMatrixBuilder::for_mz().build(&[
            RawScan::new(0.0, vec![100.0009], vec![1.0]),
            RawScan::new(1.0, vec![100.0011], vec![2.0]),
        ]);
        assert_eq!(built.axis.len(), 1);
        assert_eq!(built.matrix.to_dense(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_key_order_within_scan_is_irrelevant() {
        let forward = RawScan::new(0.0, vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]);
        let reverse = RawScan::new(0.0, vec![3.0, 2.0, 1.0], vec![6.0, 5.0, 4.0]);
        let builder = ChannelMatrixBuilder::for_wavelength();
        assert_eq!(builder.build(&[forward]), builder.build(&[reverse]));
    }

    #[test]
    fn test_scan_order_permutes_rows() {
        let original = scans();
        let order = [2usize, 0, 1];
        let permuted: Vec<RawScan> = order.iter().map(|i| original[*i].clone()).collect();
        for builder in [
            ChannelMatrixBuilder::for_mz(),
            ChannelMatrixBuilder::for_mz().with_dense_threshold(0),
        ] {
            let first = builder.build(&original);
            let second = builder.build(&permuted);
            assert_eq!(second.axis, first.axis);
            assert_eq!(second.matrix.is_dense(), first.matrix.is_dense());
            for (row, source) in order.iter().enumerate() {
                assert_eq!(second.matrix.row(row), first.matrix.row(*source));
                assert_eq!(second.times[row], first.times[*source]);
            }
        }
    }

    #[test]
    fn test_rebuild_from_axis_is_stable() {
        let builder = ChannelMatrixBuilder::for_mz();
        let first = builder.build(&scans());
        let rebuilt: Vec<RawScan> = (0..first.matrix.rows())
            .map(|r| {
                RawScan::new(
                    first.times[r],
                    first.axis.as_slice().to_vec(),
                    first.matrix.row(r).unwrap(),
                )
            })
            .collect();
        let second = builder.build(&rebuilt);
        assert_eq!(second.axis, first.axis);
        assert_eq!(second.matrix.to_dense(), first.matrix.to_dense());
    }

    #[test]
    fn test_empty_input() {
        let built = ChannelMatrixBuilder::default().build(&[]);
        assert!(built.axis.is_empty());
        assert!(built.matrix.is_empty());
        assert_eq!(built.matrix.shape(), (0, 0));
        assert!(built.times.is_empty());
    }

    #[test_log::test]
    fn test_malformed_scans_are_skipped() {
        let input = vec![
            RawScan::new(0.0, vec![1.0, 2.0], vec![1.0]),
            RawScan::new(1.0, vec![1.0], vec![3.0]),
            RawScan::new(2.0, vec![f64::NAN, 2.0], vec![1.0, 1.0]),
        ];
        let built = ChannelMatrixBuilder::for_wavelength().build(&input);
        assert_eq!(built.matrix.shape(), (1, 1));
        assert_eq!(built.times, vec![1.0]);
        assert_eq!(
            built.skipped,
            vec![
                SkippedScan {
                    index: 0,
                    reason: SkipReason::LengthMismatch { keys: 2, values: 1 }
                },
                SkippedScan {
                    index: 2,
                    reason: SkipReason::NonFiniteKey { position: 0 }
                },
            ]
        );
    }

    #[test]
    fn test_round_key() {
        assert_eq!(round_key(254.04, 1), 254.0);
        assert_eq!(round_key(254.06, 1), 254.1);
        assert_eq!(round_key(100.0004, 3), 100.0);
        assert_eq!(round_key(99.9996, 3), 100.0);
    }
}
