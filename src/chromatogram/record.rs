use std::fmt::Display;

use bitflags::bitflags;

use crate::header::HeaderRecord;
use crate::params::Unit;
use crate::signal::Scaling;

use super::matrix::{ChannelAxis, ChannelMatrix, IntensityMatrix, SkippedScan};

bitflags! {
    /// Conditions under which a record was produced
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct RecordFlags: u8 {
        /// Only the header was decoded
        const HEADER_ONLY = 0b0001;
        /// The data region was missing or lay beyond the end of the file
        const TRUNCATED = 0b0010;
        /// A compressed run ended early, the signal is partial
        const CORRUPT_RUN_LENGTH = 0b0100;
        /// One or more scans could not be placed in the channel matrix
        const SKIPPED_SCANS = 0b1000;
    }
}

impl Display for RecordFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        bitflags::parser::to_writer(self, f)
    }
}

/// The units of each axis of a [`CanonicalRecord`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Units {
    pub time: Unit,
    pub intensity: Unit,
    pub channel: Unit,
}

impl Units {
    pub fn new(time: Unit, intensity: Unit, channel: Unit) -> Self {
        Self {
            time,
            intensity,
            channel,
        }
    }
}

/**
The format-independent result of importing one file.

`time_axis` and `total_signal` are parallel. Multi-channel sources also carry
a `channel_axis` and a `channel_matrix` with one row per time point and one
column per channel.
*/
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanonicalRecord {
    pub header: HeaderRecord,
    pub time_axis: Vec<f64>,
    pub total_signal: Vec<f64>,
    pub channel_axis: Option<ChannelAxis>,
    pub channel_matrix: Option<IntensityMatrix>,
    pub scaling: Scaling,
    pub units: Units,
    pub flags: RecordFlags,
    pub skipped_scans: Vec<SkippedScan>,
}

impl CanonicalRecord {
    /// A record holding only the decoded header
    pub fn header_only(header: HeaderRecord) -> Self {
        Self {
            header,
            flags: RecordFlags::HEADER_ONLY,
            units: Units::new(Unit::Minute, Unit::Unknown, Unit::Unknown),
            ..Default::default()
        }
    }

    /// A single-channel record
    pub fn from_trace(
        header: HeaderRecord,
        time_axis: Vec<f64>,
        total_signal: Vec<f64>,
        scaling: Scaling,
        units: Units,
    ) -> Self {
        Self {
            header,
            time_axis,
            total_signal,
            scaling,
            units,
            ..Default::default()
        }
    }

    /// A multi-channel record. The total signal is taken from `totals` when
    /// given and otherwise computed as the sum of each matrix row.
    pub fn from_channels(
        header: HeaderRecord,
        channels: ChannelMatrix,
        totals: Option<Vec<f64>>,
        scaling: Scaling,
        units: Units,
    ) -> Self {
        let ChannelMatrix {
            axis,
            matrix,
            times,
            skipped,
        } = channels;
        let total_signal = totals.unwrap_or_else(|| matrix.row_sums());
        let mut flags = RecordFlags::empty();
        if !skipped.is_empty() {
            flags |= RecordFlags::SKIPPED_SCANS;
        }
        Self {
            header,
            time_axis: times,
            total_signal,
            channel_axis: Some(axis),
            channel_matrix: Some(matrix),
            scaling,
            units,
            flags,
            skipped_scans: skipped,
        }
    }

    pub fn len(&self) -> usize {
        self.total_signal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_signal.is_empty()
    }

    pub fn is_multichannel(&self) -> bool {
        self.channel_matrix.is_some()
    }

    pub fn channel_count(&self) -> usize {
        self.channel_axis.as_ref().map(|a| a.len()).unwrap_or_default()
    }

    /// The retention time range covered, in minutes
    pub fn time_range(&self) -> Option<(f64, f64)> {
        Some((*self.time_axis.first()?, *self.time_axis.last()?))
    }

    /// The time and intensity of the most intense point of the total signal
    pub fn apex(&self) -> Option<(f64, f64)> {
        self.time_axis
            .iter()
            .zip(self.total_signal.iter())
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(t, i)| (*t, *i))
    }

    /// The intensity trace of a single channel, such as an extracted ion or
    /// wavelength chromatogram
    pub fn channel_trace(&self, key: f64) -> Option<Vec<f64>> {
        let column = self.channel_axis.as_ref()?.column_of(key)?;
        let matrix = self.channel_matrix.as_ref()?;
        (0..matrix.rows()).map(|r| matrix.get(r, column)).collect()
    }

    #[cfg(feature = "serde")]
    pub fn write_json<W: std::io::Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer(writer, self)
    }

    #[cfg(feature = "serde")]
    pub fn read_json<R: std::io::Read>(reader: R) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }
}
