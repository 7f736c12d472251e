use std::fmt::Display;
use std::fs;
use std::io::{self, prelude::*, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::bufread::GzDecoder;
use lazy_static::lazy_static;
use regex::bytes::Regex;

use crate::io::cursor::{ByteCursor, CodeUnit};

/// The number of leading bytes examined when guessing a format
pub const SNIFF_LENGTH: usize = 500;

/// ChemStation format versions with a known header layout
pub const CHEMSTATION_VERSIONS: &[u32] = &[2, 8, 30, 31, 81, 130, 131, 179, 181];

/// Vendor file formats that [`chromdata`](crate) can import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VendorFormat {
    /// Agilent ChemStation `.ch`, `.ms` and `.uv` files
    ChemStation,
    /// ANDI/AIA chromatography and mass spectrometry netCDF files
    AndiNetCdf,
    /// mzXML documents
    MzXml,
    Unknown,
}

impl VendorFormat {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ChemStation => "ChemStation",
            Self::AndiNetCdf => "ANDI netCDF",
            Self::MzXml => "mzXML",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for VendorFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A detected format and the version code it declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FormatCode {
    pub format: VendorFormat,
    pub version: u32,
}

impl FormatCode {
    pub const UNKNOWN: Self = Self::new(VendorFormat::Unknown, 0);

    pub const fn new(format: VendorFormat, version: u32) -> Self {
        Self { format, version }
    }

    pub fn is_known(&self) -> bool {
        self.format != VendorFormat::Unknown
    }
}

impl Display for FormatCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} v{}", self.format, self.version)
    }
}

lazy_static! {
    static ref MZXML_ROOT: Regex = Regex::new(r"<mzXML[\s>]").unwrap();
    static ref MZXML_VERSION: Regex = Regex::new(r"mzXML_(\d+)(?:\.\d+)?").unwrap();
}

pub fn is_gzipped(header: &[u8]) -> bool {
    header.starts_with(b"\x1f\x8b")
}

/// Strip a trailing `.gz` from `path`, reporting whether one was present
pub fn is_gzipped_extension(path: PathBuf) -> (bool, PathBuf) {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("gz") => (true, path.with_extension("")),
        _ => (false, path),
    }
}

/// Inflate a whole gzip stream held in memory
pub fn decompress_gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut buf = Vec::with_capacity(data.len() * 4);
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn chemstation_version(head: &[u8]) -> Option<u32> {
    let mut cursor = ByteCursor::new(head);
    let n = *head.first()? as usize;
    if n == 0 || n > 3 || head.len() <= n || !head[1..=n].iter().all(u8::is_ascii_digit) {
        return None;
    }
    cursor.read_pascal_string(CodeUnit::Byte).ok()?.parse().ok()
}

fn is_mzxml(head: &[u8]) -> bool {
    let head = &head[..head.len().min(SNIFF_LENGTH)];
    let body = head.strip_prefix(b"\xef\xbb\xbf").unwrap_or(head);
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    body[start..].starts_with(b"<?xml") && MZXML_ROOT.is_match(body)
}

/// Given the leading bytes of a file, identify its format and version.
///
/// ChemStation files are recognized by a short decimal version string at
/// offset zero. Versions without a known layout are still reported so the
/// caller can reject them by version.
pub fn infer_from_bytes(head: &[u8]) -> FormatCode {
    if head.len() >= 4 && head.starts_with(b"CDF") && matches!(head[3], 1 | 2) {
        return FormatCode::new(VendorFormat::AndiNetCdf, head[3] as u32);
    }
    if is_mzxml(head) {
        let window = &head[..head.len().min(SNIFF_LENGTH * 4)];
        let version = MZXML_VERSION
            .captures(window)
            .and_then(|c| c.get(1))
            .and_then(|m| std::str::from_utf8(m.as_bytes()).ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        return FormatCode::new(VendorFormat::MzXml, version);
    }
    if let Some(version) = chemstation_version(head) {
        return FormatCode::new(VendorFormat::ChemStation, version);
    }
    FormatCode::UNKNOWN
}

/// Given a path, infer the file format from its extension and whether or not
/// the file at that path is GZIP compressed
pub fn infer_from_path<P: Into<PathBuf>>(path: P) -> (VendorFormat, bool) {
    let (is_gzipped, path) = is_gzipped_extension(path.into());
    let format = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("ch" | "ms" | "uv") => VendorFormat::ChemStation,
        Some("cdf") => VendorFormat::AndiNetCdf,
        Some("mzxml") => VendorFormat::MzXml,
        _ => VendorFormat::Unknown,
    };
    (format, is_gzipped)
}

/// Given a stream of bytes, infer the format code and whether or not the
/// stream is GZIP compressed. The stream position is restored afterwards.
pub fn infer_from_stream<R: Read + Seek>(stream: &mut R) -> io::Result<(FormatCode, bool)> {
    let current_pos = stream.stream_position()?;
    let mut buf = Vec::with_capacity(SNIFF_LENGTH * 4);
    stream.by_ref().take((SNIFF_LENGTH * 4) as u64).read_to_end(&mut buf)?;
    stream.seek(SeekFrom::Start(current_pos))?;
    let gzipped = is_gzipped(&buf);
    if gzipped {
        let mut decoder = GzDecoder::new(buf.as_slice());
        let mut decompressed = Vec::new();
        // A partial gzip member fails at its end, keep whatever was inflated
        let _ = decoder.read_to_end(&mut decompressed);
        buf = decompressed;
    }
    Ok((infer_from_bytes(&buf), gzipped))
}

/// Given a path, infer the format code from the file's contents
pub fn infer_format<P: AsRef<Path>>(path: P) -> io::Result<(FormatCode, bool)> {
    let mut handle = fs::File::open(path.as_ref())?;
    infer_from_stream(&mut handle)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    use flate2::{write::GzEncoder, Compression};

    #[test]
    fn test_chemstation_versions() {
        let mut head = vec![3u8];
        head.extend_from_slice(b"179");
        head.resize(512, 0);
        assert_eq!(
            infer_from_bytes(&head),
            FormatCode::new(VendorFormat::ChemStation, 179)
        );
        head[0] = 1;
        head[1] = b'8';
        assert_eq!(infer_from_bytes(&head).version, 8);
        head[1] = b'x';
        assert_eq!(infer_from_bytes(&head), FormatCode::UNKNOWN);
        assert_eq!(infer_from_bytes(&[]), FormatCode::UNKNOWN);
    }

    #[test]
    fn test_netcdf() {
        assert_eq!(
            infer_from_bytes(b"CDF\x01\x00\x00\x00\x00"),
            FormatCode::new(VendorFormat::AndiNetCdf, 1)
        );
        assert_eq!(infer_from_bytes(b"CDF\x02").version, 2);
        assert!(!infer_from_bytes(b"CDF\x05").is_known());
    }

    #[test]
    fn test_mzxml() {
        let doc = br#"<?xml version="1.0" encoding="ISO-8859-1"?>
<mzXML xmlns="http://sashimi.sourceforge.net/schema_revision/mzXML_3.2">"#;
        assert_eq!(
            infer_from_bytes(doc),
            FormatCode::new(VendorFormat::MzXml, 3)
        );
        assert!(!infer_from_bytes(b"<?xml version=\"1.0\"?><mzML>").is_known());
    }

    #[test]
    fn test_infer_from_path() {
        assert_eq!(
            infer_from_path("run/DATA.MS"),
            (VendorFormat::ChemStation, false)
        );
        assert_eq!(
            infer_from_path("run.cdf.gz"),
            (VendorFormat::AndiNetCdf, true)
        );
        assert_eq!(infer_from_path("run.mzXML"), (VendorFormat::MzXml, false));
        assert_eq!(infer_from_path("notes.txt"), (VendorFormat::Unknown, false));
    }

    #[test]
    fn test_infer_from_gzip_stream() -> io::Result<()> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"CDF\x02\x00\x00\x00\x10")?;
        let compressed = encoder.finish()?;
        let mut stream = Cursor::new(compressed.clone());
        let (code, gzipped) = infer_from_stream(&mut stream)?;
        assert!(gzipped);
        assert_eq!(code, FormatCode::new(VendorFormat::AndiNetCdf, 2));
        assert_eq!(stream.position(), 0);
        assert_eq!(decompress_gzip(&compressed)?, b"CDF\x02\x00\x00\x00\x10");
        Ok(())
    }
}
