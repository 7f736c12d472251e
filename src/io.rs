pub mod cursor;
pub mod infer_format;
pub mod traits;
mod utils;

pub mod chemstation;
#[cfg(feature = "andi")]
pub mod andi;
#[cfg(feature = "mzxml")]
pub mod mzxml;

pub mod batch;
pub mod dispatch;

pub use crate::io::batch::{BatchImporter, ProgressEvent};
pub use crate::io::chemstation::{ChemStationKind, ChemStationReader};
pub use crate::io::cursor::{ByteCursor, ByteOrder, CodeUnit, CursorError};
pub use crate::io::dispatch::{
    import_bytes, import_path, FailureReason, FormatDispatcher, ImportError, ImportOptions,
    ImportOutcome, ImportState, VendorReaderType,
};
pub use crate::io::infer_format::{
    infer_format, infer_from_bytes, infer_from_path, infer_from_stream, FormatCode, VendorFormat,
};
pub use crate::io::traits::{ScanSet, SignalPayload, VendorReader};
pub use crate::io::utils::{read_path, read_source, source_name, DetailLevel};

#[cfg(feature = "andi")]
pub use crate::io::andi::{AndiLayout, AndiReader, NetCdfError};
#[cfg(feature = "mzxml")]
pub use crate::io::mzxml::{MzXmlError, MzXmlReader};
