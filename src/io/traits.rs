use crate::chromatogram::{RawScan, Units};
use crate::header::HeaderRecord;
use crate::params::Unit;
use crate::signal::{DecodedSignal, ScalingPipeline};

use super::dispatch::{ImportError, ImportOptions};
use super::infer_format::FormatCode;

/// A group of scans decoded from a multi-channel source, before alignment
#[derive(Debug, Default)]
pub struct ScanSet {
    /// Scans in acquisition order. Times are in the source's stored unit.
    pub scans: Vec<RawScan>,
    /// A total signal stored alongside the scans, if the format has one
    pub totals: Option<Vec<f64>>,
    /// The decimal places channel keys are rounded to
    pub precision: u32,
    pub channel_unit: Unit,
    /// The error that stopped scan reading early, if any. Scans read before
    /// it are kept.
    pub interruption: Option<ImportError>,
}

impl ScanSet {
    pub fn new(precision: u32, channel_unit: Unit) -> Self {
        Self {
            precision,
            channel_unit,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }
}

/// The decoded data region of a source
#[derive(Debug)]
pub enum SignalPayload {
    /// One intensity per time point, sampled at a regular interval
    Trace(DecodedSignal),
    /// Per-scan channel lists
    Scans(ScanSet),
}

impl SignalPayload {
    pub fn len(&self) -> usize {
        match self {
            Self::Trace(signal) => signal.len(),
            Self::Scans(scans) => scans.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/**
Common interface for the per-format readers driven by
[`FormatDispatcher`](crate::io::FormatDispatcher).

A reader owns a view of the whole source. Decoding happens in two steps so a
caller can stop after the header: [`VendorReader::read_header`] and then
[`VendorReader::read_signal`], which may add derived fields to the header.
*/
pub trait VendorReader {
    /// The format and version this reader decodes
    fn format_code(&self) -> FormatCode;

    fn read_header(&mut self) -> Result<HeaderRecord, ImportError>;

    fn read_signal(
        &mut self,
        header: &mut HeaderRecord,
        options: &ImportOptions,
    ) -> Result<SignalPayload, ImportError>;

    /// The units of the record this reader produces
    fn units(&self, header: &HeaderRecord) -> Units;

    /// The transform from stored values to calibrated intensities and minutes
    fn scaling_pipeline(&self) -> ScalingPipeline {
        let code = self.format_code();
        ScalingPipeline::for_format(code.format, code.version)
    }
}
