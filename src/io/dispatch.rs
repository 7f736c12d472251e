use std::fmt::Display;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use thiserror::Error;

use crate::chromatogram::{
    CanonicalRecord, ChannelMatrixBuilder, RecordFlags, DEFAULT_DENSE_THRESHOLD, MZ_PRECISION,
    WAVELENGTH_PRECISION,
};
use crate::header::HeaderRecord;
use crate::io::cursor::CursorError;
use crate::io::infer_format::{infer_from_bytes, FormatCode, VendorFormat};
use crate::io::traits::{ScanSet, SignalPayload, VendorReader};
use crate::io::utils::{read_path, source_name, DetailLevel};
use crate::signal::ScalingPipeline;

use crate::io::chemstation::ChemStationReader;

#[cfg(feature = "andi")]
use crate::io::andi::{AndiReader, NetCdfError};
#[cfg(feature = "mzxml")]
use crate::io::mzxml::{MzXmlError, MzXmlReader};

/// The broad class of a failed import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FailureReason {
    UnsupportedFormat,
    TruncatedFile,
    CorruptRunLength,
    IOError,
}

/// The steps an import passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ImportState {
    Start,
    HeaderRead,
    SignalRead,
    Scaled,
    Assembled,
    Done,
    Failed(FailureReason),
}

impl ImportState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

impl Display for ImportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "Failed({reason:?})"),
            _ => write!(f, "{:?}", self),
        }
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Unsupported format {0}")]
    UnsupportedFormat(FormatCode),
    #[error("The header does not locate a data region")]
    MissingDataOffset,
    #[error("The data region at offset {offset} lies beyond the end of the {length} byte source")]
    DataOffsetOutOfBounds { offset: u64, length: u64 },
    #[error("The data region ended early: {0}")]
    TruncatedData(#[from] CursorError),
    #[error(
        "A compressed run at offset {offset} declared {declared} samples but only {decoded} were present"
    )]
    CorruptRunLength {
        offset: u64,
        declared: usize,
        decoded: usize,
    },
    #[cfg(feature = "andi")]
    #[error("Failed to read netCDF structure: {0}")]
    NetCdf(#[from] NetCdfError),
    #[cfg(feature = "mzxml")]
    #[error("Failed to read mzXML document: {0}")]
    MzXml(#[from] MzXmlError),
    #[error("An IO error occurred: {0}")]
    IOError(#[from] io::Error),
}

impl ImportError {
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::UnsupportedFormat(_) => FailureReason::UnsupportedFormat,
            Self::MissingDataOffset | Self::DataOffsetOutOfBounds { .. } | Self::TruncatedData(_) => {
                FailureReason::TruncatedFile
            }
            Self::CorruptRunLength { .. } => FailureReason::CorruptRunLength,
            #[cfg(feature = "andi")]
            Self::NetCdf(e) => e.reason(),
            #[cfg(feature = "mzxml")]
            Self::MzXml(e) => e.reason(),
            Self::IOError(_) => FailureReason::IOError,
        }
    }

    /// The byte offset the failure was detected at, when known
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::UnsupportedFormat(_) => Some(0),
            Self::MissingDataOffset | Self::IOError(_) => None,
            Self::DataOffsetOutOfBounds { offset, .. } => Some(*offset),
            Self::TruncatedData(e) => e.offset(),
            Self::CorruptRunLength { offset, .. } => Some(*offset),
            #[cfg(feature = "andi")]
            Self::NetCdf(e) => e.offset(),
            #[cfg(feature = "mzxml")]
            Self::MzXml(e) => e.offset(),
        }
    }

    fn flags(&self) -> RecordFlags {
        match self.reason() {
            FailureReason::TruncatedFile => RecordFlags::TRUNCATED,
            FailureReason::CorruptRunLength => RecordFlags::CORRUPT_RUN_LENGTH,
            _ => RecordFlags::empty(),
        }
    }
}

impl From<ImportError> for io::Error {
    fn from(value: ImportError) -> Self {
        match value {
            ImportError::IOError(e) => e,
            ImportError::TruncatedData(_) | ImportError::DataOffsetOutOfBounds { .. } => {
                io::Error::new(io::ErrorKind::UnexpectedEof, value)
            }
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

/// Controls how much work an import does and how channels are aligned
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportOptions {
    pub detail_level: DetailLevel,
    pub mz_precision: u32,
    pub wavelength_precision: u32,
    pub dense_threshold: usize,
    /// Only keep scans of this MS level, for formats that record one
    pub ms_level: Option<u8>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            detail_level: DetailLevel::Full,
            mz_precision: MZ_PRECISION,
            wavelength_precision: WAVELENGTH_PRECISION,
            dense_threshold: DEFAULT_DENSE_THRESHOLD,
            ms_level: None,
        }
    }
}

impl ImportOptions {
    pub fn detail_level(mut self, detail_level: DetailLevel) -> Self {
        self.detail_level = detail_level;
        self
    }

    pub fn mz_precision(mut self, precision: u32) -> Self {
        self.mz_precision = precision;
        self
    }

    pub fn wavelength_precision(mut self, precision: u32) -> Self {
        self.wavelength_precision = precision;
        self
    }

    /// Set the largest dense matrix, in bytes, before sparse storage is used
    pub fn dense_threshold(mut self, bytes: usize) -> Self {
        self.dense_threshold = bytes;
        self
    }

    pub fn ms_level(mut self, ms_level: Option<u8>) -> Self {
        self.ms_level = ms_level;
        self
    }
}

/// Everything known about one import attempt
#[derive(Debug)]
pub struct ImportOutcome {
    pub source: String,
    pub format: FormatCode,
    /// The final state
    pub state: ImportState,
    /// Every state visited, in order, ending with `state`
    pub trace: Vec<ImportState>,
    pub record: Option<CanonicalRecord>,
    pub error: Option<ImportError>,
    pub bytes_read: u64,
    pub elapsed: Duration,
}

impl ImportOutcome {
    pub fn is_done(&self) -> bool {
        self.state == ImportState::Done
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self.state {
            ImportState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Take the record, even a partial one from a failed import, or the error
    /// when nothing was decoded
    pub fn into_result(self) -> Result<CanonicalRecord, ImportError> {
        match (self.record, self.error) {
            (Some(record), _) => Ok(record),
            (None, Some(error)) => Err(error),
            (None, None) => Err(ImportError::UnsupportedFormat(self.format)),
        }
    }
}

/// An explicit format dispatching type over the concrete readers, selected
/// by [`VendorReaderType::open`]
#[non_exhaustive]
pub enum VendorReaderType<'a> {
    ChemStation(ChemStationReader<'a>),
    #[cfg(feature = "andi")]
    AndiNetCdf(AndiReader<'a>),
    #[cfg(feature = "mzxml")]
    MzXml(MzXmlReader<'a>),
}

macro_rules! delegate {
    ($self:ident, $reader:ident => $e:expr) => {
        match $self {
            VendorReaderType::ChemStation($reader) => $e,
            #[cfg(feature = "andi")]
            VendorReaderType::AndiNetCdf($reader) => $e,
            #[cfg(feature = "mzxml")]
            VendorReaderType::MzXml($reader) => $e,
        }
    };
}

impl<'a> VendorReaderType<'a> {
    pub fn open(code: FormatCode, data: &'a [u8]) -> Result<Self, ImportError> {
        match code.format {
            VendorFormat::ChemStation => Ok(Self::ChemStation(ChemStationReader::new(
                data,
                code.version,
            )?)),
            #[cfg(feature = "andi")]
            VendorFormat::AndiNetCdf => Ok(Self::AndiNetCdf(AndiReader::new(data, code.version)?)),
            #[cfg(feature = "mzxml")]
            VendorFormat::MzXml => Ok(Self::MzXml(MzXmlReader::new(data, code.version))),
            _ => Err(ImportError::UnsupportedFormat(code)),
        }
    }
}

impl VendorReader for VendorReaderType<'_> {
    fn format_code(&self) -> FormatCode {
        delegate!(self, reader => reader.format_code())
    }

    fn read_header(&mut self) -> Result<HeaderRecord, ImportError> {
        delegate!(self, reader => reader.read_header())
    }

    fn read_signal(
        &mut self,
        header: &mut HeaderRecord,
        options: &ImportOptions,
    ) -> Result<SignalPayload, ImportError> {
        delegate!(self, reader => reader.read_signal(header, options))
    }

    fn units(&self, header: &HeaderRecord) -> crate::chromatogram::Units {
        delegate!(self, reader => reader.units(header))
    }

    fn scaling_pipeline(&self) -> ScalingPipeline {
        delegate!(self, reader => reader.scaling_pipeline())
    }
}

/// Tracks the states of one import and produces its outcome
struct ImportRun {
    source: String,
    format: FormatCode,
    trace: Vec<ImportState>,
    bytes_read: u64,
    started: Instant,
}

impl ImportRun {
    fn new(source: String, bytes_read: u64) -> Self {
        Self {
            source,
            format: FormatCode::UNKNOWN,
            trace: vec![ImportState::Start],
            bytes_read,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, state: ImportState) {
        trace!("{}: {state}", self.source);
        self.trace.push(state);
    }

    fn finish(mut self, record: Option<CanonicalRecord>, error: Option<ImportError>) -> ImportOutcome {
        let state = match error.as_ref() {
            Some(e) => {
                let state = ImportState::Failed(e.reason());
                debug!("{}: import failed: {e}", self.source);
                self.advance(state);
                state
            }
            None => {
                self.advance(ImportState::Done);
                ImportState::Done
            }
        };
        ImportOutcome {
            source: self.source,
            format: self.format,
            state,
            trace: self.trace,
            record,
            error,
            bytes_read: self.bytes_read,
            elapsed: self.started.elapsed(),
        }
    }
}

/**
Drives a [`VendorReader`] through header decoding, signal decoding, scaling
and channel assembly, recording each state reached.

A failure never discards work already done. A source whose data region is
missing still yields its header, and a source whose compressed signal is
damaged still yields the samples decoded before the damage, each flagged on
the record.
*/
#[derive(Debug, Clone, Default)]
pub struct FormatDispatcher {
    options: ImportOptions,
}

impl FormatDispatcher {
    pub fn new(options: ImportOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Read the file at `path` into memory and import it
    pub fn import_path<P: AsRef<Path>>(&self, path: P) -> ImportOutcome {
        let name = source_name(path.as_ref());
        match read_path(path.as_ref()) {
            Ok(data) => self.import_bytes(name, &data),
            Err(e) => ImportRun::new(name, 0).finish(None, Some(e.into())),
        }
    }

    /// Import an in-memory source
    pub fn import_bytes<S: Into<String>>(&self, name: S, data: &[u8]) -> ImportOutcome {
        let mut run = ImportRun::new(name.into(), data.len() as u64);
        run.format = infer_from_bytes(data);
        let mut reader = match VendorReaderType::open(run.format, data) {
            Ok(reader) => reader,
            Err(e) => return run.finish(None, Some(e)),
        };
        self.import_with(&mut reader, run)
    }

    fn import_with<R: VendorReader>(&self, reader: &mut R, mut run: ImportRun) -> ImportOutcome {
        let mut header = match reader.read_header() {
            Ok(header) => header,
            Err(e) => return run.finish(None, Some(e)),
        };
        run.advance(ImportState::HeaderRead);
        let units = reader.units(&header);

        if self.options.detail_level == DetailLevel::MetadataOnly {
            let mut record = CanonicalRecord::header_only(header);
            record.units = units;
            return run.finish(Some(record), None);
        }

        let payload = match reader.read_signal(&mut header, &self.options) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("{}: {e}, keeping the header", run.source);
                let mut record = CanonicalRecord::header_only(header);
                record.units = units;
                record.flags |= e.flags();
                return run.finish(Some(record), Some(e));
            }
        };
        run.advance(ImportState::SignalRead);

        let pipeline = reader.scaling_pipeline();
        match payload {
            SignalPayload::Trace(decoded) => {
                let scaled = pipeline.apply(&header, decoded.samples);
                run.advance(ImportState::Scaled);
                let mut record = CanonicalRecord::from_trace(
                    header,
                    scaled.time_axis,
                    scaled.values,
                    scaled.scaling,
                    units,
                );
                run.advance(ImportState::Assembled);
                let error = decoded.corruption.map(|c| ImportError::CorruptRunLength {
                    offset: c.offset,
                    declared: c.declared,
                    decoded: c.decoded,
                });
                if let Some(e) = error.as_ref() {
                    record.flags |= e.flags();
                }
                run.finish(Some(record), error)
            }
            SignalPayload::Scans(set) => self.assemble_scans(header, set, pipeline, units, run),
        }
    }

    fn assemble_scans(
        &self,
        header: HeaderRecord,
        mut set: ScanSet,
        pipeline: ScalingPipeline,
        units: crate::chromatogram::Units,
        mut run: ImportRun,
    ) -> ImportOutcome {
        let scaling = pipeline.scaling(&header);
        for scan in set.scans.iter_mut() {
            scaling.apply_all(&mut scan.values);
            scan.time /= pipeline.time_divisor;
        }
        let mut totals = set.totals.take().filter(|totals| {
            let aligned = totals.len() == set.scans.len();
            if !aligned {
                warn!(
                    "{}: ignoring {} stored totals for {} scans",
                    run.source,
                    totals.len(),
                    set.scans.len()
                );
            }
            aligned
        });
        if let Some(totals) = totals.as_mut() {
            scaling.apply_all(totals);
        }
        run.advance(ImportState::Scaled);

        let mut record = if self.options.detail_level == DetailLevel::Lazy {
            let times = set.scans.iter().map(|s| s.time).collect();
            let totals =
                totals.unwrap_or_else(|| set.scans.iter().map(|s| s.total()).collect());
            CanonicalRecord::from_trace(header, times, totals, scaling, units)
        } else {
            let built = ChannelMatrixBuilder::new(set.precision)
                .with_dense_threshold(self.options.dense_threshold)
                .build(&set.scans);
            let totals = totals.map(|totals| {
                totals
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| !built.skipped.iter().any(|s| s.index == *i))
                    .map(|(_, t)| t)
                    .collect()
            });
            CanonicalRecord::from_channels(header, built, totals, scaling, units)
        };
        run.advance(ImportState::Assembled);

        let error = set.interruption.take();
        if let Some(e) = error.as_ref() {
            record.flags |= e.flags();
        }
        run.finish(Some(record), error)
    }
}

/// Import the file at `path` with default options
pub fn import_path<P: AsRef<Path>>(path: P) -> ImportOutcome {
    FormatDispatcher::default().import_path(path)
}

/// Import an in-memory source with default options
pub fn import_bytes<S: Into<String>>(name: S, data: &[u8]) -> ImportOutcome {
    FormatDispatcher::default().import_bytes(name, data)
}
