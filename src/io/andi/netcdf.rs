//! A reader for the netCDF classic and 64-bit offset container formats, enough
//! to walk the header and pull whole variables out of an in-memory file.
use std::fmt::Display;

use log::trace;
use thiserror::Error;

use crate::io::cursor::{ByteCursor, ByteOrder, CursorError};
use crate::io::dispatch::FailureReason;

const NC_DIMENSION: u32 = 0x0A;
const NC_VARIABLE: u32 = 0x0B;
const NC_ATTRIBUTE: u32 = 0x0C;
/// `numrecs` value written by streaming writers that never went back to fill it in
const STREAMING: u32 = u32::MAX;

const BE: ByteOrder = ByteOrder::Big;

#[derive(Debug, Error)]
pub enum NetCdfError {
    #[error("Not a netCDF classic or 64-bit offset file")]
    BadMagic,
    #[error("Unexpected list tag {tag:#x} at offset {offset}")]
    UnexpectedTag { offset: u64, tag: u32 },
    #[error("Unknown value type {code} at offset {offset}")]
    UnknownType { offset: u64, code: u32 },
    #[error("Variable {variable} refers to undefined dimension {dimension}")]
    UndefinedDimension { variable: String, dimension: u32 },
    #[error("Variable {0} not found")]
    MissingVariable(String),
    #[error("Scan {scan} covers points {start}..{end} but only {available} are stored")]
    ScanOutOfRange {
        scan: usize,
        start: usize,
        end: usize,
        available: usize,
    },
    #[error("Variable {0} declares more values than can be addressed")]
    Oversized(String),
    #[error("The structure ended early: {0}")]
    Truncated(#[from] CursorError),
}

impl NetCdfError {
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Truncated(_) | Self::ScanOutOfRange { .. } | Self::Oversized(_) => {
                FailureReason::TruncatedFile
            }
            _ => FailureReason::UnsupportedFormat,
        }
    }

    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::BadMagic => Some(0),
            Self::UnexpectedTag { offset, .. } | Self::UnknownType { offset, .. } => Some(*offset),
            Self::Truncated(e) => e.offset(),
            _ => None,
        }
    }
}

/// The external data types of the classic format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NcType {
    Byte = 1,
    Char = 2,
    Short = 3,
    Int = 4,
    Float = 5,
    Double = 6,
}

impl NcType {
    pub fn from_code(code: u32) -> Option<Self> {
        let tp = match code {
            1 => Self::Byte,
            2 => Self::Char,
            3 => Self::Short,
            4 => Self::Int,
            5 => Self::Float,
            6 => Self::Double,
            _ => return None,
        };
        Some(tp)
    }

    pub const fn size_of(&self) -> usize {
        match self {
            Self::Byte | Self::Char => 1,
            Self::Short => 2,
            Self::Int | Self::Float => 4,
            Self::Double => 8,
        }
    }
}

/// Round up to the 4-byte boundary every header item and variable is aligned to
#[inline]
pub(crate) fn padded(n: usize) -> usize {
    n.div_ceil(4) * 4
}

/// The decoded values of an attribute or variable
#[derive(Debug, Clone, PartialEq)]
pub enum NcValues {
    Text(String),
    Numbers(Vec<f64>),
}

impl NcValues {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Numbers(_) => None,
        }
    }

    pub fn as_numbers(&self) -> Option<&[f64]> {
        match self {
            Self::Numbers(v) => Some(v),
            Self::Text(_) => None,
        }
    }

    /// The single value of a scalar numeric attribute or variable
    pub fn scalar(&self) -> Option<f64> {
        match self.as_numbers()? {
            [value] => Some(*value),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Numbers(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(cursor: &mut ByteCursor<'_>, tp: NcType, count: usize) -> Result<Self, CursorError> {
        if tp == NcType::Char {
            let bytes = cursor.read_bytes(count)?;
            let text = String::from_utf8_lossy(bytes);
            return Ok(Self::Text(text.trim_end_matches('\0').to_string()));
        }
        cursor.ensure(count.saturating_mul(tp.size_of()))?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let value = match tp {
                NcType::Byte => cursor.read_i8()? as f64,
                NcType::Short => cursor.read_i16(BE)? as f64,
                NcType::Int => cursor.read_i32(BE)? as f64,
                NcType::Float => cursor.read_f32(BE)? as f64,
                NcType::Double => cursor.read_f64(BE)?,
                NcType::Char => unreachable!("handled above"),
            };
            values.push(value);
        }
        Ok(Self::Numbers(values))
    }
}

impl Display for NcValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Numbers(v) => {
                let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    /// Zero marks the unlimited (record) dimension
    pub length: u32,
}

impl Dimension {
    pub fn is_unlimited(&self) -> bool {
        self.length == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: NcValues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub dimensions: Vec<usize>,
    pub attributes: Vec<Attribute>,
    pub nc_type: NcType,
    pub vsize: u64,
    pub begin: u64,
}

impl Variable {
    pub fn attribute(&self, name: &str) -> Option<&NcValues> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }
}

/// The parsed header of a netCDF classic file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetCdfHeader {
    pub version: u8,
    pub record_count: u64,
    pub dimensions: Vec<Dimension>,
    pub attributes: Vec<Attribute>,
    pub variables: Vec<Variable>,
    /// Bytes between the starts of consecutive records
    pub record_size: u64,
}

fn read_name(cursor: &mut ByteCursor<'_>) -> Result<String, CursorError> {
    let n = cursor.read_u32(BE)? as usize;
    let bytes = cursor.read_bytes(n)?;
    cursor.skip(padded(n) - n)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn read_type(cursor: &mut ByteCursor<'_>) -> Result<NcType, NetCdfError> {
    let offset = cursor.position();
    let code = cursor.read_u32(BE)?;
    NcType::from_code(code).ok_or(NetCdfError::UnknownType { offset, code })
}

/// Capacity for `n` list items of at least `min_size` bytes each, never more
/// than the rest of the source could hold
fn bounded_capacity(cursor: &ByteCursor<'_>, n: usize, min_size: usize) -> usize {
    n.min(cursor.remaining() / min_size)
}

/// Read a list header, returning its element count. An absent list is a zero
/// tag followed by a zero count.
fn read_list_header(cursor: &mut ByteCursor<'_>, expected: u32) -> Result<usize, NetCdfError> {
    let offset = cursor.position();
    let tag = cursor.read_u32(BE)?;
    let count = cursor.read_u32(BE)? as usize;
    if tag == expected || (tag == 0 && count == 0) {
        Ok(count)
    } else {
        Err(NetCdfError::UnexpectedTag { offset, tag })
    }
}

fn read_attributes(cursor: &mut ByteCursor<'_>) -> Result<Vec<Attribute>, NetCdfError> {
    let n = read_list_header(cursor, NC_ATTRIBUTE)?;
    // name length, type and value count
    let mut attributes = Vec::with_capacity(bounded_capacity(cursor, n, 12));
    for _ in 0..n {
        let name = read_name(cursor)?;
        let tp = read_type(cursor)?;
        let count = cursor.read_u32(BE)? as usize;
        let value = NcValues::read(cursor, tp, count)?;
        let used = count * tp.size_of();
        cursor.skip(padded(used) - used)?;
        attributes.push(Attribute { name, value });
    }
    Ok(attributes)
}

impl NetCdfHeader {
    pub fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self, NetCdfError> {
        cursor.seek(0)?;
        let magic = cursor.read_bytes(3)?;
        if magic != b"CDF" {
            return Err(NetCdfError::BadMagic);
        }
        let version = cursor.read_u8()?;
        if !matches!(version, 1 | 2) {
            return Err(NetCdfError::BadMagic);
        }
        let numrecs = cursor.read_u32(BE)?;

        let n_dims = read_list_header(cursor, NC_DIMENSION)?;
        let mut dimensions = Vec::with_capacity(bounded_capacity(cursor, n_dims, 8));
        for _ in 0..n_dims {
            let name = read_name(cursor)?;
            let length = cursor.read_u32(BE)?;
            dimensions.push(Dimension { name, length });
        }

        let attributes = read_attributes(cursor)?;

        let n_vars = read_list_header(cursor, NC_VARIABLE)?;
        // name, rank, empty attribute list, type, vsize and begin
        let mut variables = Vec::with_capacity(bounded_capacity(cursor, n_vars, 28));
        for _ in 0..n_vars {
            let name = read_name(cursor)?;
            let rank = cursor.read_u32(BE)? as usize;
            let mut var_dims = Vec::with_capacity(bounded_capacity(cursor, rank, 4));
            for _ in 0..rank {
                let id = cursor.read_u32(BE)?;
                if id as usize >= dimensions.len() {
                    return Err(NetCdfError::UndefinedDimension {
                        variable: name,
                        dimension: id,
                    });
                }
                var_dims.push(id as usize);
            }
            let var_attributes = read_attributes(cursor)?;
            let nc_type = read_type(cursor)?;
            let vsize = cursor.read_u32(BE)? as u64;
            let begin = if version == 1 {
                cursor.read_u32(BE)? as u64
            } else {
                cursor.read_u64(BE)?
            };
            variables.push(Variable {
                name,
                dimensions: var_dims,
                attributes: var_attributes,
                nc_type,
                vsize,
                begin,
            });
        }

        let mut header = Self {
            version,
            record_count: numrecs as u64,
            dimensions,
            attributes,
            variables,
            record_size: 0,
        };
        header.record_size = header.compute_record_size()?;
        if numrecs == STREAMING {
            header.record_count = header.infer_record_count(cursor.len() as u64);
            trace!("Streaming netCDF file holds {} records", header.record_count);
        }
        Ok(header)
    }

    pub fn is_record_variable(&self, var: &Variable) -> bool {
        var.dimensions
            .first()
            .is_some_and(|d| self.dimensions[*d].is_unlimited())
    }

    /// The number of values a variable holds per record, or in total for
    /// fixed-size variables
    fn slab_len(&self, var: &Variable) -> Result<usize, NetCdfError> {
        let skip = usize::from(self.is_record_variable(var));
        var.dimensions[skip..]
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(self.dimensions[*d].length as usize))
            .ok_or_else(|| NetCdfError::Oversized(var.name.clone()))
    }

    fn compute_record_size(&self) -> Result<u64, NetCdfError> {
        let record_vars: Vec<&Variable> = self
            .variables
            .iter()
            .filter(|v| self.is_record_variable(v))
            .collect();
        let size = match record_vars.as_slice() {
            [] => 0,
            // A lone record variable is not padded between records
            [var] => self
                .slab_len(var)?
                .checked_mul(var.nc_type.size_of())
                .ok_or_else(|| NetCdfError::Oversized(var.name.clone()))? as u64,
            vars => vars.iter().map(|v| v.vsize).sum(),
        };
        Ok(size)
    }

    fn infer_record_count(&self, length: u64) -> u64 {
        let first = self
            .variables
            .iter()
            .filter(|v| self.is_record_variable(v))
            .map(|v| v.begin)
            .min();
        match first {
            Some(begin) if self.record_size > 0 && length > begin => {
                (length - begin) / self.record_size
            }
            _ => 0,
        }
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variable(name).is_some()
    }

    pub fn attribute(&self, name: &str) -> Option<&NcValues> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    /// Read every value of a variable. Record variables are gathered from
    /// each record in turn.
    pub fn read_variable(&self, data: &[u8], var: &Variable) -> Result<NcValues, NetCdfError> {
        let mut cursor = ByteCursor::new(data);
        let slab = self.slab_len(var)?;
        if !self.is_record_variable(var) {
            cursor.seek(var.begin)?;
            return Ok(NcValues::read(&mut cursor, var.nc_type, slab)?);
        }
        let oversized = || NetCdfError::Oversized(var.name.clone());
        let total = slab
            .checked_mul(self.record_count as usize)
            .ok_or_else(oversized)?;
        let mut values = Vec::with_capacity(total.min(data.len() / var.nc_type.size_of()));
        let mut text = String::new();
        for record in 0..self.record_count {
            let start = record
                .checked_mul(self.record_size)
                .and_then(|offset| offset.checked_add(var.begin))
                .ok_or_else(oversized)?;
            cursor.seek(start)?;
            match NcValues::read(&mut cursor, var.nc_type, slab)? {
                NcValues::Numbers(v) => values.extend(v),
                NcValues::Text(s) => text.push_str(&s),
            }
        }
        if var.nc_type == NcType::Char {
            Ok(NcValues::Text(text))
        } else {
            Ok(NcValues::Numbers(values))
        }
    }

    /// Read a named numeric variable
    pub fn read_numbers(&self, data: &[u8], name: &str) -> Result<Vec<f64>, NetCdfError> {
        let var = self
            .variable(name)
            .ok_or_else(|| NetCdfError::MissingVariable(name.to_string()))?;
        match self.read_variable(data, var)? {
            NcValues::Numbers(v) => Ok(v),
            NcValues::Text(_) => Err(NetCdfError::MissingVariable(name.to_string())),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! A minimal netCDF classic writer for building test files
    use super::*;

    pub struct VarSpec {
        pub name: &'static str,
        pub dimensions: Vec<usize>,
        pub nc_type: NcType,
        pub attributes: Vec<(&'static str, NcType, NcValues)>,
        pub data: NcValues,
    }

    impl VarSpec {
        pub fn new(name: &'static str, dimensions: Vec<usize>, nc_type: NcType, data: NcValues) -> Self {
            Self {
                name,
                dimensions,
                nc_type,
                attributes: Vec::new(),
                data,
            }
        }

        pub fn with_attribute(mut self, name: &'static str, nc_type: NcType, value: NcValues) -> Self {
            self.attributes.push((name, nc_type, value));
            self
        }
    }

    fn put_name(buf: &mut Vec<u8>, name: &str) {
        buf.extend((name.len() as u32).to_be_bytes());
        buf.extend(name.as_bytes());
        buf.resize(buf.len() + padded(name.len()) - name.len(), 0);
    }

    fn encode(tp: NcType, values: &NcValues) -> Vec<u8> {
        let mut out = Vec::new();
        match values {
            NcValues::Text(s) => out.extend(s.as_bytes()),
            NcValues::Numbers(v) => {
                for x in v {
                    match tp {
                        NcType::Byte => out.push(*x as i8 as u8),
                        NcType::Short => out.extend((*x as i16).to_be_bytes()),
                        NcType::Int => out.extend((*x as i32).to_be_bytes()),
                        NcType::Float => out.extend((*x as f32).to_be_bytes()),
                        NcType::Double => out.extend(x.to_be_bytes()),
                        NcType::Char => panic!("numbers written as char"),
                    }
                }
            }
        }
        out
    }

    fn put_attributes(buf: &mut Vec<u8>, attributes: &[(&str, NcType, NcValues)]) {
        if attributes.is_empty() {
            buf.extend([0u8; 8]);
            return;
        }
        buf.extend(NC_ATTRIBUTE.to_be_bytes());
        buf.extend((attributes.len() as u32).to_be_bytes());
        for (name, tp, value) in attributes {
            put_name(buf, name);
            buf.extend((*tp as u32).to_be_bytes());
            let bytes = encode(*tp, value);
            buf.extend(((bytes.len() / tp.size_of()) as u32).to_be_bytes());
            let n = bytes.len();
            buf.extend(bytes);
            buf.resize(buf.len() + padded(n) - n, 0);
        }
    }

    /// Serialize a file. Dimensions of length zero are the record dimension,
    /// with `numrecs` records.
    pub fn build(
        version: u8,
        dims: &[(&str, u32)],
        numrecs: u32,
        attributes: &[(&str, NcType, NcValues)],
        vars: &[VarSpec],
    ) -> Vec<u8> {
        let is_record = |v: &VarSpec| v.dimensions.first().is_some_and(|d| dims[*d].1 == 0);
        let slab = |v: &VarSpec| -> usize {
            let skip = usize::from(is_record(v));
            v.dimensions[skip..].iter().map(|d| dims[*d].1 as usize).product()
        };
        let vsize = |v: &VarSpec| padded(slab(v) * v.nc_type.size_of());
        let n_record = vars.iter().filter(|v| is_record(v)).count();

        let header = |begins: &[u64]| -> Vec<u8> {
            let mut buf = b"CDF".to_vec();
            buf.push(version);
            buf.extend(numrecs.to_be_bytes());
            buf.extend(NC_DIMENSION.to_be_bytes());
            buf.extend((dims.len() as u32).to_be_bytes());
            for (name, length) in dims {
                put_name(&mut buf, name);
                buf.extend(length.to_be_bytes());
            }
            put_attributes(&mut buf, attributes);
            buf.extend(NC_VARIABLE.to_be_bytes());
            buf.extend((vars.len() as u32).to_be_bytes());
            for (var, begin) in vars.iter().zip(begins) {
                put_name(&mut buf, var.name);
                buf.extend((var.dimensions.len() as u32).to_be_bytes());
                for d in &var.dimensions {
                    buf.extend((*d as u32).to_be_bytes());
                }
                put_attributes(&mut buf, &var.attributes);
                buf.extend((var.nc_type as u32).to_be_bytes());
                buf.extend((vsize(var) as u32).to_be_bytes());
                if version == 1 {
                    buf.extend((*begin as u32).to_be_bytes());
                } else {
                    buf.extend(begin.to_be_bytes());
                }
            }
            buf
        };

        let header_len = header(&vec![0; vars.len()]).len() as u64;
        let mut begins = vec![0u64; vars.len()];
        let mut offset = header_len;
        for (i, var) in vars.iter().enumerate() {
            if !is_record(var) {
                begins[i] = offset;
                offset += vsize(var) as u64;
            }
        }
        for (i, var) in vars.iter().enumerate() {
            if is_record(var) {
                begins[i] = offset;
                offset += if n_record == 1 {
                    (slab(var) * var.nc_type.size_of()) as u64
                } else {
                    vsize(var) as u64
                };
            }
        }

        let mut buf = header(&begins);
        for var in vars.iter().filter(|v| !is_record(v)) {
            let bytes = encode(var.nc_type, &var.data);
            let n = bytes.len();
            buf.extend(bytes);
            buf.resize(buf.len() + padded(n) - n, 0);
        }
        let record_vars: Vec<(&VarSpec, Vec<u8>)> = vars
            .iter()
            .filter(|v| is_record(v))
            .map(|v| (v, encode(v.nc_type, &v.data)))
            .collect();
        for r in 0..numrecs as usize {
            for (var, bytes) in &record_vars {
                let width = slab(var) * var.nc_type.size_of();
                buf.extend(&bytes[r * width..(r + 1) * width]);
                if n_record > 1 {
                    buf.resize(buf.len() + padded(width) - width, 0);
                }
            }
        }
        buf
    }
}

#[cfg(test)]
mod test {
    use super::fixtures::*;
    use super::*;

    fn sample(version: u8) -> Vec<u8> {
        build(
            version,
            &[("scan_number", 3), ("point_number", 0), ("_2_byte_string", 2)],
            5,
            &[
                ("experiment_title", NcType::Char, NcValues::Text("test run".into())),
                ("netcdf_revision", NcType::Short, NcValues::Numbers(vec![2.0])),
            ],
            &[
                VarSpec::new(
                    "scan_acquisition_time",
                    vec![0],
                    NcType::Double,
                    NcValues::Numbers(vec![0.5, 1.0, 1.5]),
                ),
                VarSpec::new(
                    "point_count",
                    vec![0],
                    NcType::Short,
                    NcValues::Numbers(vec![2.0, 1.0, 2.0]),
                ),
                VarSpec::new(
                    "mass_values",
                    vec![1],
                    NcType::Float,
                    NcValues::Numbers(vec![50.0, 51.0, 50.0, 60.5, 61.0]),
                )
                .with_attribute("units", NcType::Char, NcValues::Text("M/Z".into())),
                VarSpec::new(
                    "intensity_values",
                    vec![1],
                    NcType::Short,
                    NcValues::Numbers(vec![10.0, 20.0, 30.0, -40.0, 50.0]),
                )
                .with_attribute("scale_factor", NcType::Double, NcValues::Numbers(vec![0.5])),
            ],
        )
    }

    #[test]
    fn test_parse_header() {
        for version in [1, 2] {
            let data = sample(version);
            let header = NetCdfHeader::parse(&mut ByteCursor::new(&data)).unwrap();
            assert_eq!(header.version, version);
            assert_eq!(header.record_count, 5);
            assert_eq!(header.dimensions.len(), 3);
            assert!(header.dimension("point_number").unwrap().is_unlimited());
            assert_eq!(
                header.attribute("experiment_title").and_then(|v| v.as_text()),
                Some("test run")
            );
            assert_eq!(
                header.attribute("netcdf_revision").and_then(|v| v.scalar()),
                Some(2.0)
            );
            let intensity = header.variable("intensity_values").unwrap();
            assert!(header.is_record_variable(intensity));
            assert_eq!(
                intensity.attribute("scale_factor").and_then(|v| v.scalar()),
                Some(0.5)
            );
            assert_eq!(header.record_size, 8);
        }
    }

    #[test]
    fn test_read_variables() {
        let data = sample(1);
        let header = NetCdfHeader::parse(&mut ByteCursor::new(&data)).unwrap();
        assert_eq!(
            header.read_numbers(&data, "scan_acquisition_time").unwrap(),
            vec![0.5, 1.0, 1.5]
        );
        assert_eq!(
            header.read_numbers(&data, "point_count").unwrap(),
            vec![2.0, 1.0, 2.0]
        );
        assert_eq!(
            header.read_numbers(&data, "mass_values").unwrap(),
            vec![50.0, 51.0, 50.0, 60.5, 61.0]
        );
        assert_eq!(
            header.read_numbers(&data, "intensity_values").unwrap(),
            vec![10.0, 20.0, 30.0, -40.0, 50.0]
        );
        assert!(matches!(
            header.read_numbers(&data, "ordinate_values"),
            Err(NetCdfError::MissingVariable(_))
        ));
    }

    #[test]
    fn test_streaming_record_count() {
        let mut data = sample(2);
        data[4..8].copy_from_slice(&STREAMING.to_be_bytes());
        let header = NetCdfHeader::parse(&mut ByteCursor::new(&data)).unwrap();
        assert_eq!(header.record_count, 5);
    }

    #[test]
    fn test_declared_counts_beyond_data() {
        let huge_dims = b"CDF\x01\0\0\0\0\0\0\0\x0A\xFF\xFF\xFF\xFF";
        let err = NetCdfHeader::parse(&mut ByteCursor::new(huge_dims)).unwrap_err();
        assert_eq!(err.reason(), FailureReason::TruncatedFile);
        let outcome = crate::io::dispatch::import_bytes("huge.cdf", huge_dims);
        assert_eq!(outcome.failure_reason(), Some(FailureReason::TruncatedFile));

        let mut huge_attribute = b"CDF\x01".to_vec();
        huge_attribute.extend(0u32.to_be_bytes());
        huge_attribute.extend([0u8; 8]);
        huge_attribute.extend(NC_ATTRIBUTE.to_be_bytes());
        huge_attribute.extend(1u32.to_be_bytes());
        huge_attribute.extend(1u32.to_be_bytes());
        huge_attribute.extend(b"a\0\0\0");
        huge_attribute.extend((NcType::Double as u32).to_be_bytes());
        huge_attribute.extend(u32::MAX.to_be_bytes());
        let err = NetCdfHeader::parse(&mut ByteCursor::new(&huge_attribute)).unwrap_err();
        assert!(matches!(err, NetCdfError::Truncated(_)));

        let dimension = |name: &str| Dimension {
            name: name.to_string(),
            length: u32::MAX,
        };
        let header = NetCdfHeader {
            version: 1,
            dimensions: vec![dimension("x"), dimension("y"), dimension("z")],
            variables: vec![Variable {
                name: "cube".to_string(),
                dimensions: vec![0, 1, 2],
                attributes: Vec::new(),
                nc_type: NcType::Double,
                vsize: 0,
                begin: 0,
            }],
            ..Default::default()
        };
        let err = header.read_variable(&[0u8; 16], &header.variables[0]).unwrap_err();
        assert!(matches!(err, NetCdfError::Oversized(ref name) if name == "cube"));
        assert_eq!(err.reason(), FailureReason::TruncatedFile);
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            NetCdfHeader::parse(&mut ByteCursor::new(b"CDF\x03")),
            Err(NetCdfError::BadMagic)
        ));
        let data = sample(1);
        let err = NetCdfHeader::parse(&mut ByteCursor::new(&data[..40])).unwrap_err();
        assert_eq!(err.reason(), FailureReason::TruncatedFile);
        let mut bad_tag = data.clone();
        bad_tag[8..12].copy_from_slice(&7u32.to_be_bytes());
        let err = NetCdfHeader::parse(&mut ByteCursor::new(&bad_tag)).unwrap_err();
        assert!(matches!(err, NetCdfError::UnexpectedTag { offset: 8, tag: 7 }));
    }
}
