use log::{debug, trace, warn};

use crate::chromatogram::{RawScan, Units};
use crate::header::{decode, descriptor_for, FormatDescriptor, HeaderRecord};
use crate::io::cursor::ByteCursor;
use crate::io::dispatch::{ImportError, ImportOptions};
use crate::io::infer_format::{FormatCode, VendorFormat};
use crate::io::traits::{ScanSet, SignalPayload, VendorReader};
use crate::params::{Unit, Value};
use crate::signal::DecodedSignal;

use super::netcdf::{NcValues, NetCdfError, NetCdfHeader};

/// Global attributes holding the acquisition time stamp, in preference order
const TIMESTAMP_ATTRIBUTES: &[&str] = &["injection_date_time_stamp", "dataset_date_time_stamp"];

/// Which of the AIA templates a file follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AndiLayout {
    /// The AIA mass spectrometry template, one point list per scan
    MassSpectra,
    /// The AIA chromatography template, a single detector trace
    Chromatogram,
}

impl AndiLayout {
    pub fn detect(netcdf: &NetCdfHeader) -> Option<Self> {
        if netcdf.has_variable("mass_values") && netcdf.has_variable("intensity_values") {
            Some(Self::MassSpectra)
        } else if netcdf.has_variable("ordinate_values") {
            Some(Self::Chromatogram)
        } else {
            None
        }
    }

    /// The variable the intensity scale factor and units are attached to
    pub const fn intensity_variable(&self) -> &'static str {
        match self {
            Self::MassSpectra => "intensity_values",
            Self::Chromatogram => "ordinate_values",
        }
    }
}

fn attribute_value(value: &NcValues) -> Value {
    match value {
        NcValues::Text(s) => Value::Str(s.clone()),
        NcValues::Numbers(v) if v.is_empty() => Value::Absent,
        NcValues::Numbers(v) => match value.scalar() {
            Some(x) => Value::Float(x),
            None => Value::Str(
                v.iter()
                    .map(|x| x.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        },
    }
}

/// AIA time stamps are `YYYYMMDDhhmmss` followed by a zone offset
fn timestamp_prefix(stamp: &str) -> Option<&str> {
    let prefix = stamp.get(..14)?;
    prefix.bytes().all(|b| b.is_ascii_digit()).then_some(prefix)
}

/// Reads one ANDI netCDF file held in memory
#[derive(Debug, Clone)]
pub struct AndiReader<'a> {
    data: &'a [u8],
    descriptor: &'static FormatDescriptor,
    netcdf: Option<NetCdfHeader>,
    layout: Option<AndiLayout>,
}

impl<'a> AndiReader<'a> {
    pub fn new(data: &'a [u8], version: u32) -> Result<Self, ImportError> {
        let descriptor = descriptor_for(VendorFormat::AndiNetCdf, version).ok_or(
            ImportError::UnsupportedFormat(FormatCode::new(VendorFormat::AndiNetCdf, version)),
        )?;
        Ok(Self {
            data,
            descriptor,
            netcdf: None,
            layout: None,
        })
    }

    pub fn layout(&self) -> Option<AndiLayout> {
        self.layout
    }

    pub fn netcdf(&self) -> Option<&NetCdfHeader> {
        self.netcdf.as_ref()
    }

    fn parse_netcdf(&mut self) -> Result<&NetCdfHeader, NetCdfError> {
        if self.netcdf.is_none() {
            let parsed = NetCdfHeader::parse(&mut ByteCursor::new(self.data))?;
            self.layout = AndiLayout::detect(&parsed);
            self.netcdf = Some(parsed);
        }
        match self.netcdf.as_ref() {
            Some(netcdf) => Ok(netcdf),
            None => Err(NetCdfError::BadMagic),
        }
    }

    fn read_chromatogram(
        data: &[u8],
        netcdf: &NetCdfHeader,
        header: &mut HeaderRecord,
    ) -> Result<SignalPayload, ImportError> {
        let samples = netcdf.read_numbers(data, "ordinate_values")?;
        let scalar = |name: &str| -> Result<Option<f64>, NetCdfError> {
            match netcdf.variable(name) {
                Some(var) => Ok(netcdf.read_variable(data, var)?.scalar()),
                None => Ok(None),
            }
        };
        let delay = scalar("actual_delay_time")?.unwrap_or(0.0);
        match scalar("actual_sampling_interval")? {
            Some(interval) => {
                let span = interval * samples.len().saturating_sub(1) as f64;
                header.insert("start_time", delay);
                header.insert("end_time", delay + span);
            }
            None => warn!("No sampling interval is recorded, the time axis is unknown"),
        }
        Ok(SignalPayload::Trace(DecodedSignal {
            samples,
            corruption: None,
        }))
    }

    fn read_mass_spectra(
        data: &[u8],
        netcdf: &NetCdfHeader,
        options: &ImportOptions,
    ) -> Result<SignalPayload, ImportError> {
        let times = netcdf.read_numbers(data, "scan_acquisition_time")?;
        let counts = netcdf.read_numbers(data, "point_count")?;
        let starts = if netcdf.has_variable("scan_index") {
            netcdf.read_numbers(data, "scan_index")?
        } else {
            counts
                .iter()
                .scan(0.0, |acc, n| {
                    let start = *acc;
                    *acc += n;
                    Some(start)
                })
                .collect()
        };
        let masses = netcdf.read_numbers(data, "mass_values")?;
        let intensities = netcdf.read_numbers(data, "intensity_values")?;

        let mut set = ScanSet::new(options.mz_precision, Unit::MZ);
        if netcdf.has_variable("total_intensity") {
            set.totals = Some(netcdf.read_numbers(data, "total_intensity")?);
        }
        let available = masses.len().min(intensities.len());
        let n_scans = times.len().min(counts.len()).min(starts.len());
        if n_scans < times.len() {
            debug!(
                "Only {n_scans} of {} scans have a point list",
                times.len()
            );
        }
        for (i, time) in times.iter().take(n_scans).enumerate() {
            let range = point_index(starts[i])
                .zip(point_index(counts[i]))
                .and_then(|(start, n)| Some(start..start.checked_add(n)?))
                .filter(|range| range.end <= available);
            let Some(range) = range else {
                let start = starts[i] as usize;
                set.interruption = Some(
                    NetCdfError::ScanOutOfRange {
                        scan: i,
                        start,
                        end: start.saturating_add(counts[i] as usize),
                        available,
                    }
                    .into(),
                );
                break;
            };
            set.scans.push(RawScan::new(
                *time,
                masses[range.clone()].to_vec(),
                intensities[range].to_vec(),
            ));
        }
        if let Some(totals) = set.totals.as_mut() {
            totals.truncate(set.scans.len());
        }
        trace!("Read {} scans over {available} points", set.scans.len());
        Ok(SignalPayload::Scans(set))
    }
}

/// A stored point offset or count as an index, if it is a finite non-negative number
fn point_index(value: f64) -> Option<usize> {
    (value.is_finite() && value >= 0.0).then_some(value as usize)
}

impl VendorReader for AndiReader<'_> {
    fn format_code(&self) -> FormatCode {
        FormatCode::new(VendorFormat::AndiNetCdf, self.descriptor.id)
    }

    fn read_header(&mut self) -> Result<HeaderRecord, ImportError> {
        let mut header = decode(&mut ByteCursor::new(self.data), self.descriptor);
        let layout = {
            let netcdf = self.parse_netcdf()?;
            for attribute in netcdf.attributes.iter() {
                header.insert(attribute.name.as_str(), attribute_value(&attribute.value));
            }
            let layout = AndiLayout::detect(netcdf);
            if let Some(var) = layout.and_then(|l| netcdf.variable(l.intensity_variable())) {
                if let Some(factor) = var.attribute("scale_factor").and_then(|v| v.scalar()) {
                    header.insert("scale_factor", factor);
                }
                if let Some(units) = var.attribute("units").and_then(|v| v.as_text()) {
                    header.insert("units", units);
                }
            }
            layout
        };
        let stamp = TIMESTAMP_ATTRIBUTES
            .iter()
            .find_map(|name| header.get_str(name).and_then(timestamp_prefix))
            .map(|s| s.to_string());
        if let Some(stamp) = stamp {
            header.insert("datetime", stamp);
        }
        if layout.is_none() {
            debug!("No AIA template variables were found");
        }
        Ok(header)
    }

    fn read_signal(
        &mut self,
        header: &mut HeaderRecord,
        options: &ImportOptions,
    ) -> Result<SignalPayload, ImportError> {
        let data = self.data;
        self.parse_netcdf()?;
        let (Some(netcdf), Some(layout)) = (self.netcdf.as_ref(), self.layout) else {
            return Err(NetCdfError::MissingVariable("ordinate_values".into()).into());
        };
        match layout {
            AndiLayout::Chromatogram => Self::read_chromatogram(data, netcdf, header),
            AndiLayout::MassSpectra => Self::read_mass_spectra(data, netcdf, options),
        }
    }

    fn units(&self, header: &HeaderRecord) -> Units {
        match self.layout {
            Some(AndiLayout::MassSpectra) => {
                Units::new(Unit::Minute, Unit::DetectorCounts, Unit::MZ)
            }
            _ => {
                let intensity = header
                    .get_str("detector_unit")
                    .or_else(|| header.get_str("units"))
                    .map(Unit::from_label)
                    .unwrap_or_default();
                Units::new(Unit::Minute, intensity, Unit::Unknown)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::super::netcdf::fixtures::{build, VarSpec};
    use super::super::netcdf::{NcType, NcValues};

    fn numbers(values: &[f64]) -> NcValues {
        NcValues::Numbers(values.to_vec())
    }

    /// An AIA chromatography file sampled every `interval` seconds after `delay`
    pub fn chromatogram_cdf(samples: &[f64], delay: f64, interval: f64, scale: Option<f64>) -> Vec<u8> {
        let mut ordinate = VarSpec::new("ordinate_values", vec![0], NcType::Float, numbers(samples));
        if let Some(scale) = scale {
            ordinate = ordinate.with_attribute("scale_factor", NcType::Double, numbers(&[scale]));
        }
        build(
            1,
            &[("point_number", samples.len() as u32)],
            0,
            &[
                ("sample_name", NcType::Char, NcValues::Text("standard mix".into())),
                ("detector_unit", NcType::Char, NcValues::Text("pA".into())),
                (
                    "injection_date_time_stamp",
                    NcType::Char,
                    NcValues::Text("20120313142233+0000".into()),
                ),
            ],
            &[
                VarSpec::new("actual_delay_time", vec![], NcType::Float, numbers(&[delay])),
                VarSpec::new("actual_sampling_interval", vec![], NcType::Float, numbers(&[interval])),
                ordinate,
            ],
        )
    }

    /// An AIA mass spectrometry file with `(time s, [(m/z, intensity)])` scans,
    /// the scan dimension stored as the record dimension
    pub fn ms_cdf(version: u8, scans: &[(f64, Vec<(f64, f64)>)], with_totals: bool) -> Vec<u8> {
        let times: Vec<f64> = scans.iter().map(|s| s.0).collect();
        let counts: Vec<f64> = scans.iter().map(|s| s.1.len() as f64).collect();
        let mut index = Vec::new();
        let mut acc = 0.0;
        for n in &counts {
            index.push(acc);
            acc += n;
        }
        let masses: Vec<f64> = scans.iter().flat_map(|s| s.1.iter().map(|p| p.0)).collect();
        let intensities: Vec<f64> = scans.iter().flat_map(|s| s.1.iter().map(|p| p.1)).collect();
        let totals: Vec<f64> = scans.iter().map(|s| s.1.iter().map(|p| p.1).sum()).collect();
        let mut vars = vec![
            VarSpec::new("scan_acquisition_time", vec![0], NcType::Double, numbers(&times)),
            VarSpec::new("scan_index", vec![0], NcType::Int, numbers(&index)),
            VarSpec::new("point_count", vec![0], NcType::Int, numbers(&counts)),
            VarSpec::new("mass_values", vec![1], NcType::Double, numbers(&masses))
                .with_attribute("units", NcType::Char, NcValues::Text("M/Z".into())),
            VarSpec::new("intensity_values", vec![1], NcType::Float, numbers(&intensities)),
        ];
        if with_totals {
            vars.push(VarSpec::new(
                "total_intensity",
                vec![0],
                NcType::Double,
                numbers(&totals),
            ));
        }
        build(
            version,
            &[("scan_number", 0), ("point_number", masses.len() as u32)],
            scans.len() as u32,
            &[("experiment_type", NcType::Char, NcValues::Text("Centroided Mass Spectrum".into()))],
            &vars,
        )
    }
}
