use log::warn;

use crate::header::HeaderRecord;
use crate::io::infer_format::VendorFormat;

/// Slope of the fixed pressure conversion applied to version 181 traces
pub const CHEMSTATION_181_SLOPE: f64 = 1.33321110047553;

/// ChemStation stores retention times in milliseconds
pub const CHEMSTATION_TIME_DIVISOR: f64 = 60000.0;
/// ANDI files store retention times in seconds
pub const NETCDF_TIME_DIVISOR: f64 = 60.0;

/// A linear intensity transform, `value * slope + intercept`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Scaling {
    pub slope: f64,
    pub intercept: f64,
}

impl Default for Scaling {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Scaling {
    pub const IDENTITY: Self = Self::new(1.0, 0.0);

    pub const fn new(slope: f64, intercept: f64) -> Self {
        Self { slope, intercept }
    }

    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        value * self.slope + self.intercept
    }

    pub fn apply_all(&self, values: &mut [f64]) {
        if *self == Self::IDENTITY {
            return;
        }
        values.iter_mut().for_each(|v| *v = self.apply(*v));
    }
}

/// Where a format version's intensity transform comes from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalingRule {
    /// A constant transform, header values are ignored
    Fixed(Scaling),
    /// Read from named header fields. A missing slope means 1.0, a missing
    /// intercept 0.0.
    FromHeader {
        slope: &'static str,
        intercept: Option<&'static str>,
    },
}

impl ScalingRule {
    pub const HEADER_SLOPE_INTERCEPT: Self = Self::FromHeader {
        slope: "slope",
        intercept: Some("intercept"),
    };

    pub fn resolve(&self, header: &HeaderRecord) -> Scaling {
        match self {
            Self::Fixed(scaling) => *scaling,
            Self::FromHeader { slope, intercept } => {
                let slope = header.get_f64(slope).unwrap_or(1.0);
                let intercept = intercept
                    .and_then(|name| header.get_f64(name))
                    .unwrap_or(0.0);
                Scaling::new(slope, intercept)
            }
        }
    }

    /// Select the rule for a format version
    pub fn for_format(format: VendorFormat, version: u32) -> Self {
        match (format, version) {
            (VendorFormat::ChemStation, 81 | 130 | 131 | 179) => Self::HEADER_SLOPE_INTERCEPT,
            (VendorFormat::ChemStation, 181) => {
                Self::Fixed(Scaling::new(CHEMSTATION_181_SLOPE, 0.0))
            }
            (VendorFormat::ChemStation, _) => Self::Fixed(Scaling::IDENTITY),
            (VendorFormat::AndiNetCdf, _) => Self::FromHeader {
                slope: "scale_factor",
                intercept: None,
            },
            (VendorFormat::MzXml | VendorFormat::Unknown, _) => Self::Fixed(Scaling::IDENTITY),
        }
    }
}

/// Build a time axis of `n` points from `start` to `end`.
///
/// One or two samples always produce exactly `[start, end]`, and no samples
/// produce an empty axis.
pub fn time_axis(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 | 2 => vec![start, end],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut axis: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            axis[n - 1] = end;
            axis
        }
    }
}

/// A scaled signal and the time axis it is sampled on, in minutes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScaledSignal {
    pub values: Vec<f64>,
    pub time_axis: Vec<f64>,
    pub scaling: Scaling,
}

/// Applies a format's intensity transform and converts its stored time range
/// to minutes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingPipeline {
    pub rule: ScalingRule,
    pub time_divisor: f64,
}

impl ScalingPipeline {
    pub fn new(rule: ScalingRule, time_divisor: f64) -> Self {
        Self { rule, time_divisor }
    }

    pub fn for_format(format: VendorFormat, version: u32) -> Self {
        let divisor = match format {
            VendorFormat::ChemStation => CHEMSTATION_TIME_DIVISOR,
            VendorFormat::AndiNetCdf => NETCDF_TIME_DIVISOR,
            VendorFormat::MzXml | VendorFormat::Unknown => 1.0,
        };
        Self::new(ScalingRule::for_format(format, version), divisor)
    }

    pub fn scaling(&self, header: &HeaderRecord) -> Scaling {
        self.rule.resolve(header)
    }

    /// Scale `samples` and interpolate their time axis from the header's
    /// `start_time` and `end_time` fields. When either is absent the time
    /// axis is left empty.
    pub fn apply(&self, header: &HeaderRecord, mut samples: Vec<f64>) -> ScaledSignal {
        let scaling = self.scaling(header);
        scaling.apply_all(&mut samples);
        let time_axis = match (header.get_f64("start_time"), header.get_f64("end_time")) {
            (Some(start), Some(end)) => time_axis(
                start / self.time_divisor,
                end / self.time_divisor,
                samples.len(),
            ),
            _ => {
                if !samples.is_empty() {
                    warn!("Header has no time range, leaving time axis empty");
                }
                Vec::new()
            }
        };
        ScaledSignal {
            values: samples,
            time_axis,
            scaling,
        }
    }
}
