//! Implements a reader for the mzXML format, reducing each scan's peak list to
//! the channels of a chromatogram.
//!
//! Nested scans (for instance MSn scans written inside their precursor scan)
//! are returned in document order, the order their opening tags appear in.
use std::io::{self, Write};

use flate2::write::ZlibDecoder;
use lazy_static::lazy_static;
use log::{debug, trace, warn};
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Error as XMLError, Reader};
use regex::Regex;
use thiserror::Error;

use crate::chromatogram::{RawScan, Units};
use crate::header::HeaderRecord;
use crate::io::cursor::{ByteCursor, ByteOrder, CursorError};
use crate::io::dispatch::{FailureReason, ImportError, ImportOptions};
use crate::io::infer_format::{FormatCode, VendorFormat};
use crate::io::traits::{ScanSet, SignalPayload, VendorReader};
use crate::params::{Unit, Value};

lazy_static! {
    static ref ISO_DURATION: Regex = Regex::new(
        r"^(-)?P(?:(\d+(?:\.\d+)?)D)?(?:T(?:(\d+(?:\.\d+)?)H)?(?:(\d+(?:\.\d+)?)M)?(?:(\d+(?:\.\d+)?)S)?)?$"
    )
    .unwrap();
}

/// Convert an `xs:duration` such as `PT1M30.5S` to minutes. A bare number is
/// read as seconds.
pub fn parse_duration_minutes(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(seconds) = text.parse::<f64>() {
        return Some(seconds / 60.0);
    }
    let captures = ISO_DURATION.captures(text)?;
    if captures.iter().skip(2).all(|c| c.is_none()) {
        return None;
    }
    let part = |i: usize| -> f64 {
        captures
            .get(i)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    let minutes = part(2) * 1440.0 + part(3) * 60.0 + part(4) + part(5) / 60.0;
    if captures.get(1).is_some() {
        Some(-minutes)
    } else {
        Some(minutes)
    }
}

#[derive(Debug, Error)]
pub enum MzXmlError {
    #[error("An XML error {source} occurred at offset {offset}")]
    XmlError { offset: u64, source: XMLError },
    #[error("A malformed attribute was found at offset {offset}: {source}")]
    Attribute { offset: u64, source: AttrError },
    #[error("{name} has an invalid value {value:?} at offset {offset}")]
    InvalidAttribute {
        name: &'static str,
        value: String,
        offset: u64,
    },
    #[error("Peak data encoded as {0} is not supported")]
    UnsupportedEncoding(String),
    #[error("Failed to decode base64 peak data at offset {offset}: {message}")]
    Base64 { offset: u64, message: String },
    #[error("Failed to inflate peak data at offset {offset}: {source}")]
    Zlib { offset: u64, source: io::Error },
    #[error("Peak data at offset {offset} holds {bytes} bytes, not a whole number of {width} byte pairs")]
    PeakLength { offset: u64, bytes: usize, width: usize },
    #[error("Peak data ended early: {0}")]
    Truncated(#[from] CursorError),
}

impl MzXmlError {
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::XmlError { .. } | Self::Attribute { .. } | Self::InvalidAttribute { .. } => {
                FailureReason::IOError
            }
            Self::UnsupportedEncoding(_) => FailureReason::UnsupportedFormat,
            Self::Base64 { .. } | Self::Zlib { .. } | Self::PeakLength { .. } | Self::Truncated(_) => {
                FailureReason::CorruptRunLength
            }
        }
    }

    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::XmlError { offset, .. }
            | Self::Attribute { offset, .. }
            | Self::InvalidAttribute { offset, .. }
            | Self::Base64 { offset, .. }
            | Self::Zlib { offset, .. }
            | Self::PeakLength { offset, .. } => Some(*offset),
            Self::Truncated(e) => e.offset(),
            Self::UnsupportedEncoding(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MzXmlParserState {
    #[default]
    Start,
    MsRun,
    Scan,
    Peaks,
    MsRunDone,
    ParserError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PeakCompression {
    #[default]
    NoCompression,
    Zlib,
}

/// How a `peaks` element's text is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeakEncoding {
    pub precision: u32,
    pub compression: PeakCompression,
}

impl Default for PeakEncoding {
    fn default() -> Self {
        Self {
            precision: 32,
            compression: PeakCompression::NoCompression,
        }
    }
}

impl PeakEncoding {
    /// Decode base64 text into parallel m/z and intensity arrays. Values are
    /// always in network byte order.
    pub fn decode(&self, text: &[u8], offset: u64) -> Result<(Vec<f64>, Vec<f64>), MzXmlError> {
        let compact: Vec<u8>;
        let text = if memchr::memchr3(b'\n', b'\r', b' ', text).is_some() || text.contains(&b'\t') {
            compact = text.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
            compact.as_slice()
        } else {
            text
        };
        if text.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let bytes = base64_simd::STANDARD
            .decode_type::<Vec<u8>>(text)
            .map_err(|e| MzXmlError::Base64 {
                offset,
                message: e.to_string(),
            })?;
        let bytes = match self.compression {
            PeakCompression::NoCompression => bytes,
            PeakCompression::Zlib => {
                let mut decompressor = ZlibDecoder::new(Vec::new());
                decompressor
                    .write_all(&bytes)
                    .and_then(|_| decompressor.finish())
                    .map_err(|source| MzXmlError::Zlib { offset, source })?
            }
        };
        let width = (self.precision / 8) as usize;
        if bytes.len() % (width * 2) != 0 {
            return Err(MzXmlError::PeakLength {
                offset,
                bytes: bytes.len(),
                width: width * 2,
            });
        }
        let n = bytes.len() / (width * 2);
        let mut mz = Vec::with_capacity(n);
        let mut intensity = Vec::with_capacity(n);
        let mut cursor = ByteCursor::new(&bytes);
        for _ in 0..n {
            mz.push(cursor.read_float(width, ByteOrder::Big)?);
            intensity.push(cursor.read_float(width, ByteOrder::Big)?);
        }
        Ok((mz, intensity))
    }
}

/// A scan whose tags have been closed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MzXmlScan {
    pub number: Option<u32>,
    pub ms_level: u8,
    /// In minutes
    pub retention_time: f64,
    pub total_ion_current: Option<f64>,
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
}

#[derive(Debug, Default)]
struct ScanBuilder {
    slot: usize,
    number: Option<u32>,
    ms_level: u8,
    retention_time: Option<f64>,
    peaks_count: usize,
    total_ion_current: Option<f64>,
    encoding: PeakEncoding,
    peaks_offset: u64,
    peak_text: Vec<u8>,
    mz: Vec<f64>,
    intensity: Vec<f64>,
}

type ParserResult = Result<MzXmlParserState, MzXmlError>;

fn attributes(event: &BytesStart, offset: u64) -> Result<Vec<(String, String)>, MzXmlError> {
    event
        .attributes()
        .map(|attr| {
            let attr = attr.map_err(|source| MzXmlError::Attribute { offset, source })?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|source| MzXmlError::XmlError { offset, source })?
                .into_owned();
            Ok((key, value))
        })
        .collect()
}

fn parse_attribute<T: std::str::FromStr>(
    name: &'static str,
    value: &str,
    offset: u64,
) -> Result<T, MzXmlError> {
    value.trim().parse().map_err(|_| MzXmlError::InvalidAttribute {
        name,
        value: value.to_string(),
        offset,
    })
}

fn parse_time(name: &'static str, value: &str, offset: u64) -> Result<f64, MzXmlError> {
    parse_duration_minutes(value).ok_or_else(|| MzXmlError::InvalidAttribute {
        name,
        value: value.to_string(),
        offset,
    })
}

/// Accumulates the run header and scans from parser events
#[derive(Debug, Default)]
struct MzXmlAccumulator {
    header: HeaderRecord,
    stack: Vec<ScanBuilder>,
    scans: Vec<Option<MzXmlScan>>,
    ms_level: Option<u8>,
}

impl MzXmlAccumulator {
    fn new(version: u32, ms_level: Option<u8>) -> Self {
        Self {
            header: HeaderRecord::new(version),
            ms_level,
            ..Default::default()
        }
    }

    fn header_element(&mut self, name: &[u8], attrs: &[(String, String)], offset: u64) -> Result<(), MzXmlError> {
        let get = |key: &str| attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        match name {
            b"msRun" => {
                if let Some(v) = get("scanCount") {
                    self.header.insert("scan_count", parse_attribute::<i64>("scanCount", v, offset)?);
                }
                if let Some(v) = get("startTime") {
                    self.header.insert("start_time", parse_time("startTime", v, offset)?);
                }
                if let Some(v) = get("endTime") {
                    self.header.insert("end_time", parse_time("endTime", v, offset)?);
                }
            }
            b"parentFile" => {
                if let Some(file_name) = get("fileName") {
                    if self.header.get("parent_file").is_none() {
                        self.header.insert("parent_file", file_name);
                        let stem = file_name
                            .rsplit(&['/', '\\'][..])
                            .next()
                            .unwrap_or(file_name);
                        let stem = stem.rsplit_once('.').map(|(s, _)| s).unwrap_or(stem);
                        self.header.insert("sample_name", stem);
                    }
                }
            }
            b"msManufacturer" => {
                self.header.insert("instrument_manufacturer", Value::from(get("value")));
            }
            b"msModel" => {
                self.header.insert("instrument", Value::from(get("value")));
            }
            b"msIonisation" => {
                self.header.insert("ionisation", Value::from(get("value")));
            }
            b"msDetector" => {
                self.header.insert("detector", Value::from(get("value")));
            }
            b"software" => {
                let software = match (get("name"), get("version")) {
                    (Some(name), Some(version)) => Some(format!("{name} {version}")),
                    (Some(name), None) => Some(name.to_string()),
                    _ => None,
                };
                if let Some(software) = software {
                    self.header.insert("software", software);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn start_scan(&mut self, attrs: &[(String, String)], offset: u64) -> ParserResult {
        let mut scan = ScanBuilder {
            slot: self.scans.len(),
            ms_level: 1,
            ..Default::default()
        };
        self.scans.push(None);
        for (key, value) in attrs {
            match key.as_str() {
                "num" => scan.number = Some(parse_attribute("num", value, offset)?),
                "msLevel" => scan.ms_level = parse_attribute("msLevel", value, offset)?,
                "peaksCount" => scan.peaks_count = parse_attribute("peaksCount", value, offset)?,
                "retentionTime" => {
                    scan.retention_time = Some(parse_time("retentionTime", value, offset)?)
                }
                "totIonCurrent" => {
                    scan.total_ion_current = Some(parse_attribute("totIonCurrent", value, offset)?)
                }
                _ => {}
            }
        }
        self.stack.push(scan);
        Ok(MzXmlParserState::Scan)
    }

    fn start_peaks(&mut self, attrs: &[(String, String)], offset: u64) -> ParserResult {
        let Some(scan) = self.stack.last_mut() else {
            return Ok(MzXmlParserState::MsRun);
        };
        let mut encoding = PeakEncoding::default();
        for (key, value) in attrs {
            match key.as_str() {
                "precision" => {
                    encoding.precision = match value.trim() {
                        "32" => 32,
                        "64" => 64,
                        _ => {
                            return Err(MzXmlError::InvalidAttribute {
                                name: "precision",
                                value: value.clone(),
                                offset,
                            })
                        }
                    }
                }
                "byteOrder" if value != "network" => {
                    return Err(MzXmlError::UnsupportedEncoding(format!("byteOrder={value}")))
                }
                "compressionType" => {
                    encoding.compression = match value.as_str() {
                        "none" => PeakCompression::NoCompression,
                        "zlib" => PeakCompression::Zlib,
                        _ => {
                            return Err(MzXmlError::UnsupportedEncoding(format!(
                                "compressionType={value}"
                            )))
                        }
                    }
                }
                "contentType" | "pairOrder" if value != "m/z-int" => {
                    return Err(MzXmlError::UnsupportedEncoding(format!("{key}={value}")))
                }
                _ => {}
            }
        }
        scan.encoding = encoding;
        scan.peaks_offset = offset;
        scan.peak_text.clear();
        Ok(MzXmlParserState::Peaks)
    }

    fn start_element(&mut self, event: &BytesStart, state: MzXmlParserState, offset: u64) -> ParserResult {
        let attrs = attributes(event, offset)?;
        let name = event.local_name();
        match name.as_ref() {
            b"msRun" => {
                self.header_element(name.as_ref(), &attrs, offset)?;
                Ok(MzXmlParserState::MsRun)
            }
            b"scan" => self.start_scan(&attrs, offset),
            b"peaks" => self.start_peaks(&attrs, offset),
            other => {
                self.header_element(other, &attrs, offset)?;
                Ok(state)
            }
        }
    }

    fn finish_peaks(&mut self) -> ParserResult {
        let Some(scan) = self.stack.last_mut() else {
            return Ok(MzXmlParserState::MsRun);
        };
        let (mz, intensity) = scan.encoding.decode(&scan.peak_text, scan.peaks_offset)?;
        if mz.len() != scan.peaks_count {
            debug!(
                "Scan {:?} declares {} peaks but holds {}",
                scan.number,
                scan.peaks_count,
                mz.len()
            );
        }
        scan.mz = mz;
        scan.intensity = intensity;
        scan.peak_text = Vec::new();
        Ok(MzXmlParserState::Scan)
    }

    fn finish_scan(&mut self) -> ParserResult {
        if let Some(scan) = self.stack.pop() {
            let keep = self.ms_level.map_or(true, |level| level == scan.ms_level);
            match scan.retention_time {
                Some(retention_time) if keep => {
                    self.scans[scan.slot] = Some(MzXmlScan {
                        number: scan.number,
                        ms_level: scan.ms_level,
                        retention_time,
                        total_ion_current: scan.total_ion_current,
                        mz: scan.mz,
                        intensity: scan.intensity,
                    });
                }
                None => warn!("Scan {:?} has no retention time, skipping it", scan.number),
                _ => trace!("Scan {:?} at MS level {} filtered out", scan.number, scan.ms_level),
            }
        }
        if self.stack.is_empty() {
            Ok(MzXmlParserState::MsRun)
        } else {
            Ok(MzXmlParserState::Scan)
        }
    }

    fn end_element(&mut self, event: &BytesEnd, state: MzXmlParserState) -> ParserResult {
        match event.local_name().as_ref() {
            b"peaks" => self.finish_peaks(),
            b"scan" => self.finish_scan(),
            b"msRun" => Ok(MzXmlParserState::MsRunDone),
            _ => Ok(state),
        }
    }

    fn text(&mut self, event: &BytesText, state: MzXmlParserState) -> ParserResult {
        if state == MzXmlParserState::Peaks {
            if let Some(scan) = self.stack.last_mut() {
                scan.peak_text.extend_from_slice(&event[..]);
            }
        }
        Ok(state)
    }

    fn completed_scans(&mut self) -> Vec<MzXmlScan> {
        std::mem::take(&mut self.scans).into_iter().flatten().collect()
    }
}

/// Reads one mzXML document held in memory
#[derive(Debug)]
pub struct MzXmlReader<'a> {
    data: &'a [u8],
    version: u32,
    pub state: MzXmlParserState,
    buffer: Vec<u8>,
}

impl<'a> MzXmlReader<'a> {
    pub fn new(data: &'a [u8], version: u32) -> Self {
        Self {
            data,
            version,
            state: MzXmlParserState::Start,
            buffer: Vec::new(),
        }
    }

    /// Walk the document, stopping at the first scan when `header_only`.
    /// On error the accumulator holds everything read before it.
    fn parse(
        &mut self,
        accumulator: &mut MzXmlAccumulator,
        header_only: bool,
    ) -> Result<(), MzXmlError> {
        let mut reader = Reader::from_reader(self.data);
        reader.trim_text(true);
        self.state = MzXmlParserState::Start;
        loop {
            self.buffer.clear();
            let offset = reader.buffer_position() as u64;
            let result = match reader.read_event_into(&mut self.buffer) {
                Ok(Event::Start(ref e)) => {
                    if header_only && e.local_name().as_ref() == b"scan" {
                        break;
                    }
                    accumulator.start_element(e, self.state, offset)
                }
                Ok(Event::Empty(ref e)) => {
                    if header_only && e.local_name().as_ref() == b"scan" {
                        break;
                    }
                    accumulator
                        .start_element(e, self.state, offset)
                        .and_then(|state| {
                            accumulator.end_element(&e.to_end(), state)
                        })
                }
                Ok(Event::End(ref e)) => accumulator.end_element(e, self.state),
                Ok(Event::Text(ref e)) => accumulator.text(e, self.state),
                Ok(Event::Eof) => break,
                Ok(_) => Ok(self.state),
                Err(source) => Err(MzXmlError::XmlError { offset, source }),
            };
            match result {
                Ok(state) => self.state = state,
                Err(e) => {
                    self.state = MzXmlParserState::ParserError;
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

impl VendorReader for MzXmlReader<'_> {
    fn format_code(&self) -> FormatCode {
        FormatCode::new(VendorFormat::MzXml, self.version)
    }

    fn read_header(&mut self) -> Result<HeaderRecord, ImportError> {
        let mut accumulator = MzXmlAccumulator::new(self.version, None);
        self.parse(&mut accumulator, true)?;
        accumulator.header.insert("schema_version", self.version as i64);
        Ok(accumulator.header)
    }

    fn read_signal(
        &mut self,
        _header: &mut HeaderRecord,
        options: &ImportOptions,
    ) -> Result<SignalPayload, ImportError> {
        let mut accumulator = MzXmlAccumulator::new(self.version, options.ms_level);
        let interruption = self.parse(&mut accumulator, false).err();
        let scans = accumulator.completed_scans();
        let mut set = ScanSet::new(options.mz_precision, Unit::MZ);
        if !scans.is_empty() && scans.iter().all(|s| s.total_ion_current.is_some()) {
            set.totals = Some(scans.iter().filter_map(|s| s.total_ion_current).collect());
        }
        set.scans = scans
            .into_iter()
            .map(|s| RawScan::new(s.retention_time, s.mz, s.intensity))
            .collect();
        if let Some(e) = interruption {
            debug!("Stopped reading after {} scans: {e}", set.len());
            set.interruption = Some(e.into());
        }
        Ok(SignalPayload::Scans(set))
    }

    fn units(&self, _header: &HeaderRecord) -> Units {
        Units::new(Unit::Minute, Unit::DetectorCounts, Unit::MZ)
    }
}
