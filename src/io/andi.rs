//! Implements a reader for ANDI (AIA) chromatography and mass spectrometry
//! files, which are stored in the netCDF classic container.

pub mod netcdf;
pub mod reader;

pub use crate::io::andi::netcdf::{
    Attribute, Dimension, NcType, NcValues, NetCdfError, NetCdfHeader, Variable,
};
pub use crate::io::andi::reader::{AndiLayout, AndiReader};
