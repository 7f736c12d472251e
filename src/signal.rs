//! Decompression of vendor signal regions and their conversion to calibrated
//! intensities over a time axis.
pub mod decoders;
pub mod scaling;

pub use crate::signal::decoders::{
    decode_double_array, decode_delta, decode_double_delta, decode_scan_deltas, decode_signal,
    unpack_abundance, unpack_mz, CorruptRun, DecodedSignal, DeltaAccumulator, SignalEncoding,
};
pub use crate::signal::scaling::{
    time_axis, ScaledSignal, Scaling, ScalingPipeline, ScalingRule,
};
