//! Reader for Agilent ChemStation single trace (`.ch`), mass spectrometry
//! (`.ms`) and spectral UV (`.uv`) files.
use log::{debug, trace};

use crate::chromatogram::{RawScan, Units};
use crate::header::{decode, descriptor_for, FormatDescriptor, HeaderRecord};
use crate::io::cursor::{ByteCursor, ByteOrder, CursorError};
use crate::io::dispatch::{ImportError, ImportOptions};
use crate::io::infer_format::{FormatCode, VendorFormat};
use crate::io::traits::{ScanSet, SignalPayload, VendorReader};
use crate::params::Unit;
use crate::signal::{decode_scan_deltas, decode_signal, unpack_abundance, unpack_mz, SignalEncoding};

/// Bytes preceding the first m/z, abundance pair of an MS scan
const MS_SCAN_PREFIX: usize = 14;
/// Wavelengths are stored in twentieths of a nanometer
const WAVELENGTH_DIVISOR: f64 = 20.0;

/// What the data region of a ChemStation file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChemStationKind {
    /// Per-scan m/z and abundance lists
    MassSpectra,
    /// A single compressed intensity trace
    Trace(SignalEncoding),
    /// Per-scan absorbance spectra over a wavelength range
    Spectral,
}

impl ChemStationKind {
    pub fn for_version(version: u32) -> Option<Self> {
        let kind = match version {
            2 => Self::MassSpectra,
            8 | 30 | 130 => Self::Trace(SignalEncoding::Delta(ByteOrder::Big)),
            81 | 181 => Self::Trace(SignalEncoding::DoubleDelta(ByteOrder::Big)),
            179 => Self::Trace(SignalEncoding::DoubleArray(ByteOrder::Little)),
            31 | 131 => Self::Spectral,
            _ => return None,
        };
        Some(kind)
    }
}

/// Reads one ChemStation file held in memory
#[derive(Debug, Clone)]
pub struct ChemStationReader<'a> {
    data: &'a [u8],
    descriptor: &'static FormatDescriptor,
    kind: ChemStationKind,
}

impl<'a> ChemStationReader<'a> {
    pub fn new(data: &'a [u8], version: u32) -> Result<Self, ImportError> {
        let code = FormatCode::new(VendorFormat::ChemStation, version);
        let descriptor =
            descriptor_for(VendorFormat::ChemStation, version).ok_or(ImportError::UnsupportedFormat(code))?;
        let kind = ChemStationKind::for_version(version).ok_or(ImportError::UnsupportedFormat(code))?;
        Ok(Self {
            data,
            descriptor,
            kind,
        })
    }

    pub fn kind(&self) -> ChemStationKind {
        self.kind
    }

    /// Position a cursor at the start of the data region
    fn data_region(&self, header: &HeaderRecord) -> Result<ByteCursor<'a>, ImportError> {
        let offset = header
            .get_i64("data_offset")
            .ok_or(ImportError::MissingDataOffset)? as u64;
        let length = self.data.len() as u64;
        if offset > length {
            return Err(ImportError::DataOffsetOutOfBounds { offset, length });
        }
        let mut cursor = ByteCursor::new(self.data);
        cursor.seek(offset)?;
        Ok(cursor)
    }

    /// Read scans until `count` are read or, without a count, the data runs out.
    /// A scan that cannot be completed stops reading and is recorded as the
    /// interruption.
    fn read_scans<F>(
        cursor: &mut ByteCursor<'a>,
        count: Option<usize>,
        mut set: ScanSet,
        mut read_scan: F,
    ) -> ScanSet
    where
        F: FnMut(&mut ByteCursor<'a>) -> Result<RawScan, CursorError>,
    {
        let mut index = 0;
        loop {
            match count {
                Some(n) if index >= n => break,
                None if cursor.remaining() == 0 => break,
                _ => {}
            }
            match read_scan(cursor) {
                Ok(scan) => set.scans.push(scan),
                Err(e) => {
                    debug!("Scan {index} is incomplete: {e}");
                    set.interruption = Some(e.into());
                    break;
                }
            }
            index += 1;
        }
        set
    }

    /// Move to the declared start of the next scan, stopping at the end of the source
    fn seek_next(cursor: &mut ByteCursor<'_>, next: u64) -> Result<(), CursorError> {
        if next > cursor.position() {
            cursor.seek(next.min(cursor.len() as u64))?;
        }
        Ok(())
    }

    fn read_ms_scan(cursor: &mut ByteCursor<'_>) -> Result<RawScan, CursorError> {
        let start = cursor.position();
        let words = cursor.read_u16(ByteOrder::Big)? as u64;
        let time = cursor.read_u32(ByteOrder::Big)? as f64;
        cursor.skip(6)?;
        let n_points = cursor.read_u16(ByteOrder::Big)? as usize;
        let needed = (MS_SCAN_PREFIX + 4 * n_points) as u64;
        if words * 2 < needed {
            return Err(CursorError::Truncated {
                offset: start,
                requested: needed,
                available: words * 2,
            });
        }
        let mut keys = Vec::with_capacity(n_points);
        let mut values = Vec::with_capacity(n_points);
        for _ in 0..n_points {
            keys.push(unpack_mz(cursor.read_u16(ByteOrder::Big)?));
            values.push(unpack_abundance(cursor.read_u16(ByteOrder::Big)?));
        }
        Self::seek_next(cursor, start + words * 2)?;
        Ok(RawScan::new(time, keys, values))
    }

    fn read_spectral_scan(cursor: &mut ByteCursor<'_>) -> Result<RawScan, CursorError> {
        let start = cursor.position();
        let length = cursor.read_u16(ByteOrder::Little)? as u64;
        let time = cursor.read_u32(ByteOrder::Little)? as f64;
        let first = cursor.read_u16(ByteOrder::Little)?;
        let last = cursor.read_u16(ByteOrder::Little)?;
        let step = cursor.read_u16(ByteOrder::Little)?;
        let n_channels = if step == 0 || last < first {
            0
        } else {
            ((last - first) / step) as usize + 1
        };
        let values = decode_scan_deltas(cursor, n_channels, ByteOrder::Little)?;
        let keys = (0..n_channels)
            .map(|i| (first as f64 + (i as f64) * step as f64) / WAVELENGTH_DIVISOR)
            .collect();
        Self::seek_next(cursor, start + length)?;
        Ok(RawScan::new(time, keys, values))
    }
}

impl VendorReader for ChemStationReader<'_> {
    fn format_code(&self) -> FormatCode {
        FormatCode::new(VendorFormat::ChemStation, self.descriptor.id)
    }

    fn read_header(&mut self) -> Result<HeaderRecord, ImportError> {
        let header = decode(&mut ByteCursor::new(self.data), self.descriptor);
        if log::log_enabled!(log::Level::Trace) {
            for name in header.absent_fields() {
                trace!("{} header field {name} is absent", self.descriptor.name);
            }
        }
        Ok(header)
    }

    fn read_signal(
        &mut self,
        header: &mut HeaderRecord,
        options: &ImportOptions,
    ) -> Result<SignalPayload, ImportError> {
        let mut cursor = self.data_region(header)?;
        let payload = match self.kind {
            ChemStationKind::Trace(encoding) => {
                let zero = header.get_f64("zero");
                SignalPayload::Trace(decode_signal(&mut cursor, encoding, zero))
            }
            ChemStationKind::MassSpectra => {
                let count = header.get_i64("scan_count").map(|n| n.max(0) as usize);
                let set = ScanSet::new(options.mz_precision, Unit::MZ);
                SignalPayload::Scans(Self::read_scans(
                    &mut cursor,
                    count,
                    set,
                    Self::read_ms_scan,
                ))
            }
            ChemStationKind::Spectral => {
                let count = header.get_i64("sample_count").map(|n| n.max(0) as usize);
                let set = ScanSet::new(options.wavelength_precision, Unit::Nanometer);
                SignalPayload::Scans(Self::read_scans(
                    &mut cursor,
                    count,
                    set,
                    Self::read_spectral_scan,
                ))
            }
        };
        Ok(payload)
    }

    fn units(&self, header: &HeaderRecord) -> Units {
        let label = header.get_str("units").map(Unit::from_label);
        match self.kind {
            ChemStationKind::MassSpectra => Units::new(Unit::Minute, Unit::DetectorCounts, Unit::MZ),
            ChemStationKind::Trace(_) => Units::new(
                Unit::Minute,
                label.unwrap_or_default(),
                Unit::Unknown,
            ),
            ChemStationKind::Spectral => Units::new(
                Unit::Minute,
                label
                    .filter(|u| *u != Unit::Unknown)
                    .unwrap_or(Unit::MilliAbsorbance),
                Unit::Nanometer,
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Builders for synthetic ChemStation files
    use crate::header::{descriptor_for, FieldKind, FieldSpec, FormatDescriptor};
    use crate::io::cursor::CodeUnit;
    use crate::io::infer_format::VendorFormat;
    use crate::params::Value;

    pub fn write_field(buf: &mut Vec<u8>, spec: &FieldSpec, value: &Value) {
        let mut bytes = Vec::new();
        match (spec.kind, value) {
            (FieldKind::PascalString(unit), Value::Str(s)) => {
                bytes.push(s.chars().count() as u8);
                match unit {
                    CodeUnit::Byte => bytes.extend_from_slice(s.as_bytes()),
                    CodeUnit::Wide(_) => {
                        for c in s.encode_utf16() {
                            bytes.extend_from_slice(&c.to_le_bytes())
                        }
                    }
                }
            }
            (FieldKind::UInt8, Value::Int(v)) => bytes.push(*v as u8),
            (FieldKind::UInt16, Value::Int(v)) => bytes.extend((*v as u16).to_be_bytes()),
            (FieldKind::UInt32, Value::Int(v)) => bytes.extend((*v as u32).to_be_bytes()),
            (FieldKind::Int32, Value::Int(v)) => bytes.extend((*v as i32).to_be_bytes()),
            (FieldKind::Float32, Value::Float(v)) => bytes.extend((*v as f32).to_be_bytes()),
            (FieldKind::Float64, Value::Float(v)) => bytes.extend(v.to_be_bytes()),
            (kind, value) => panic!("Cannot write {value:?} as {kind:?}"),
        }
        let start = spec.offset as usize;
        if buf.len() < start + bytes.len() {
            buf.resize(start + bytes.len(), 0);
        }
        buf[start..start + bytes.len()].copy_from_slice(&bytes);
    }

    fn descriptor(version: u32) -> &'static FormatDescriptor {
        descriptor_for(VendorFormat::ChemStation, version).unwrap()
    }

    /// Write a version string and the named raw field values
    pub fn header(version: u32, values: &[(&str, Value)]) -> Vec<u8> {
        let descriptor = descriptor(version);
        let tag = version.to_string();
        let mut buf = vec![tag.len() as u8];
        buf.extend_from_slice(tag.as_bytes());
        for (name, value) in values {
            let spec = descriptor.field(name).unwrap();
            write_field(&mut buf, spec, value);
        }
        let end = descriptor
            .fields
            .iter()
            .filter_map(|f| f.kind.size_of().map(|s| f.offset as usize + s))
            .max()
            .unwrap();
        buf.resize(buf.len().max(end), 0);
        buf
    }

    fn common_strings() -> Vec<(&'static str, Value)> {
        vec![
            ("sample_name", Value::from("blank")),
            ("operator", Value::from("op")),
            ("datetime", Value::from("13-Mar-12, 14:22:33")),
            ("method", Value::from("DEF_LC.M")),
        ]
    }

    /// Pad `buf` to the next 512-byte sector and return its 1-based index
    fn pad_to_sector(buf: &mut Vec<u8>) -> i64 {
        let sectors = buf.len().div_ceil(512);
        buf.resize(sectors * 512, 0);
        sectors as i64 + 1
    }

    /// A single trace file whose data region holds `region`
    pub fn trace_file_with(version: u32, region: &[u8], extra: &[(&str, Value)]) -> Vec<u8> {
        let mut values = common_strings();
        values.push(("units", Value::from("mAU")));
        values.push(("signal", Value::from("DAD1 A")));
        values.push(("slope", Value::Float(1.0)));
        values.push(("intercept", Value::Float(0.0)));
        values.extend(extra.iter().cloned());
        let mut buf = header(version, &values);
        let sector = pad_to_sector(&mut buf);
        write_field(
            &mut buf,
            descriptor(version).field("data_offset").unwrap(),
            &Value::Int(sector),
        );
        buf.extend_from_slice(region);
        buf
    }

    pub fn trace_file(version: u32, region: &[u8], start_ms: f64, end_ms: f64) -> Vec<u8> {
        trace_file_with(
            version,
            region,
            &[
                ("start_time", Value::Float(start_ms)),
                ("end_time", Value::Float(end_ms)),
            ],
        )
    }

    /// A version 2 file holding `(time ms, [(m/z word, abundance word)])` scans
    pub fn ms_file(scans: &[(u32, Vec<(u16, u16)>)]) -> Vec<u8> {
        let mut values = common_strings();
        values.push(("scan_count", Value::Int(scans.len() as i64)));
        let mut buf = header(2, &values);
        if buf.len() % 2 == 1 {
            buf.push(0);
        }
        let word = (buf.len() / 2) as i64 + 1;
        write_field(
            &mut buf,
            descriptor(2).field("data_offset").unwrap(),
            &Value::Int(word),
        );
        for (time, points) in scans {
            let words = (super::MS_SCAN_PREFIX + 4 * points.len()) / 2;
            buf.extend((words as u16).to_be_bytes());
            buf.extend(time.to_be_bytes());
            buf.extend([0u8; 6]);
            buf.extend((points.len() as u16).to_be_bytes());
            for (mz, abundance) in points {
                buf.extend(mz.to_be_bytes());
                buf.extend(abundance.to_be_bytes());
            }
        }
        buf
    }

    /// A spectral file holding `(time ms, first, step, deltas-encoded values)`
    /// scans, wavelengths in twentieths of a nanometer
    pub fn uv_file(version: u32, scans: &[(u32, u16, u16, Vec<i32>)]) -> Vec<u8> {
        use crate::io::cursor::ByteOrder;
        use crate::signal::decoders::encoders::encode_deltas;

        let mut values = common_strings();
        values.push(("sample_count", Value::Int(scans.len() as i64)));
        let mut region = Vec::new();
        for (time, first, step, absorbances) in scans {
            let encoded = encode_deltas(absorbances, ByteOrder::Little);
            let last = first + step * (absorbances.len() as u16).saturating_sub(1);
            region.extend(((12 + encoded.len()) as u16).to_le_bytes());
            region.extend(time.to_le_bytes());
            region.extend(first.to_le_bytes());
            region.extend(last.to_le_bytes());
            region.extend(step.to_le_bytes());
            region.extend(encoded);
        }
        trace_file_with(version, &region, &values)
    }
}

#[cfg(test)]
mod test {
    use super::fixtures::*;
    use super::*;
    use crate::io::dispatch::{import_bytes, FailureReason, ImportState};
    use crate::params::Value;
    use crate::signal::decoders::encoders::encode_double_delta;
    use crate::signal::scaling::CHEMSTATION_181_SLOPE;

    #[test]
    fn test_versions_map_to_kinds() {
        assert_eq!(ChemStationKind::for_version(2), Some(ChemStationKind::MassSpectra));
        assert_eq!(
            ChemStationKind::for_version(179),
            Some(ChemStationKind::Trace(SignalEncoding::DoubleArray(ByteOrder::Little)))
        );
        assert_eq!(ChemStationKind::for_version(131), Some(ChemStationKind::Spectral));
        assert_eq!(ChemStationKind::for_version(3), None);
        for version in crate::io::infer_format::CHEMSTATION_VERSIONS {
            assert!(ChemStationReader::new(&[], *version).is_ok(), "{version}");
        }
    }

    #[test]
    fn test_modern_header_strings() {
        let data = trace_file(130, &[], 0.0, 0.0);
        let mut reader = ChemStationReader::new(&data, 130).unwrap();
        let header = reader.read_header().unwrap();
        assert_eq!(header.get_str("sample_name"), Some("blank"));
        assert_eq!(header.get_str("units"), Some("mAU"));
        assert_eq!(header.get_i64("data_offset"), Some(5120));
        assert!(header.get("zero").is_none());
        assert_eq!(header.acquired_at().map(|d| d.to_string()).as_deref(), Some("2012-03-13 14:22:33"));
    }

    #[test]
    fn test_double_array_with_baseline() {
        let mut region = Vec::new();
        for v in [9.0f64, 1.5, 2.5, 3.5] {
            region.extend(v.to_le_bytes());
        }
        let data = trace_file_with(
            179,
            &region,
            &[
                ("start_time", Value::Float(0.0)),
                ("end_time", Value::Float(180_000.0)),
                ("slope", Value::Float(2.0)),
                ("intercept", Value::Float(0.0)),
                ("signal_mode", Value::Int(1)),
                ("zero", Value::Float(0.5)),
            ],
        );
        let record = import_bytes("baseline.ch", &data).into_result().unwrap();
        assert_eq!(record.total_signal, vec![1.0, 3.0, 5.0, 7.0]);
        assert_eq!(record.time_axis, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_double_delta_pressure_slope() {
        let region = encode_double_delta(&[100, 110, 125], ByteOrder::Big);
        let data = trace_file_with(
            181,
            &region,
            &[
                ("start_time", Value::Float(0.0)),
                ("end_time", Value::Float(6000.0)),
                ("slope", Value::Float(99.0)),
            ],
        );
        let outcome = import_bytes("pressure.ch", &data);
        assert!(outcome.is_done());
        let record = outcome.record.unwrap();
        let expected: Vec<f64> = [100.0, 110.0, 125.0]
            .iter()
            .map(|v| v * CHEMSTATION_181_SLOPE)
            .collect();
        assert_eq!(record.total_signal, expected);
    }

    #[test]
    fn test_spectral_scans() {
        let data = uv_file(
            131,
            &[
                (60_000, 4000, 40, vec![10, 12, 9]),
                (90_000, 4000, 40, vec![100_000, 11, 8]),
            ],
        );
        let record = import_bytes("dad1.uv", &data).into_result().unwrap();
        assert_eq!(record.units.channel, Unit::Nanometer);
        assert_eq!(record.units.intensity, Unit::MilliAbsorbance);
        assert_eq!(
            record.channel_axis.as_ref().unwrap().as_slice(),
            &[200.0, 202.0, 204.0]
        );
        assert_eq!(record.time_axis, vec![1.0, 1.5]);
        assert_eq!(record.channel_trace(202.0), Some(vec![12.0, 11.0]));
        assert_eq!(record.total_signal, vec![31.0, 100_019.0]);
    }

    #[test]
    fn test_scan_shorter_than_its_points() {
        let scans = vec![
            (60_000u32, vec![(2000u16, 0x0010u16)]),
            (120_000, vec![(2000, 0x0002), (2100, 0x0003)]),
        ];
        let mut data = ms_file(&scans);
        let second = data.len() - (MS_SCAN_PREFIX + 8);
        data[second..second + 2].copy_from_slice(&3u16.to_be_bytes());
        let outcome = import_bytes("short.ms", &data);
        assert_eq!(outcome.state, ImportState::Failed(FailureReason::TruncatedFile));
        let record = outcome.record.unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record.time_axis, vec![1.0]);
    }

    #[test]
    fn test_missing_data_offset() {
        let mut data = trace_file(8, &[1, 2], 0.0, 1.0);
        data[264..268].copy_from_slice(&0i32.to_be_bytes());
        let outcome = import_bytes("nooffset.ch", &data);
        assert_eq!(outcome.state, ImportState::Failed(FailureReason::TruncatedFile));
        assert!(matches!(outcome.error, Some(ImportError::MissingDataOffset)));
        let record = outcome.record.unwrap();
        assert_eq!(record.header.get_str("sample_name"), Some("blank"));
    }
}
