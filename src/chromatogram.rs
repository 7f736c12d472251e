//! The canonical chromatogram data model and the channel alignment used by
//! every multi-channel reader.
pub mod matrix;
pub mod record;

pub use crate::chromatogram::matrix::{
    round_key, ChannelAxis, ChannelMatrix, ChannelMatrixBuilder, IntensityMatrix, RawScan,
    SkipReason, SkippedScan, DEFAULT_DENSE_THRESHOLD, MZ_PRECISION, WAVELENGTH_PRECISION,
};
pub use crate::chromatogram::record::{CanonicalRecord, RecordFlags, Units};
