//! `chromdata` decodes vendor chromatography and mass spectrometry files into a
//! single chromatogram data model.
//!
//! A file is identified from its leading bytes, its header is decoded from a
//! declarative layout table, its signal region is decompressed and scaled, and
//! multi-channel scans are aligned into a time by channel intensity matrix.
//! See [`io::FormatDispatcher`] for the import pipeline.
pub mod chromatogram;
pub mod header;
pub mod io;
pub mod params;
pub mod prelude;
pub mod signal;

pub use crate::chromatogram::{CanonicalRecord, ChannelAxis, IntensityMatrix, RecordFlags, Units};
pub use crate::header::HeaderRecord;
pub use crate::io::{
    import_bytes, import_path, BatchImporter, FormatDispatcher, ImportError, ImportOptions,
    ImportOutcome, ImportState,
};
pub use crate::params::{Unit, Value};
