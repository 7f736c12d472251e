pub use crate::chromatogram::{CanonicalRecord, RecordFlags, Units};
pub use crate::header::HeaderRecord;
pub use crate::io::traits::VendorReader;
pub use crate::io::{DetailLevel, FormatDispatcher, ImportOptions, ImportOutcome, ImportState};
pub use crate::params::{Unit, Value};
