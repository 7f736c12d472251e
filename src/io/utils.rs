use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use log::debug;

use super::infer_format::{decompress_gzip, is_gzipped};

/// How much of a file a reader should decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DetailLevel {
    /// Decode the header, the signal and, for multi-channel sources, the full
    /// intensity matrix
    #[default]
    Full,
    /// Decode the header and the total signal, but do not assemble the
    /// channel matrix of multi-channel sources
    Lazy,
    /// Decode only the header
    MetadataOnly,
}

/// Read an entire source into memory, transparently inflating gzip streams.
///
/// The handle is dropped before this returns, on success or failure.
pub fn read_source<R: Read>(mut source: R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    source.read_to_end(&mut buf)?;
    if is_gzipped(&buf) {
        debug!("Inflating gzip compressed source of {} bytes", buf.len());
        buf = decompress_gzip(&buf)?;
    }
    Ok(buf)
}

/// Read the file at `path` into memory with [`read_source`]
pub fn read_path<P: AsRef<Path>>(path: P) -> io::Result<Vec<u8>> {
    let handle = fs::File::open(path.as_ref())?;
    read_source(io::BufReader::new(handle))
}

/// The name a source is reported under: its file name when there is one
pub fn source_name<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
