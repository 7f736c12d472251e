use std::fmt::Display;

/// A single decoded header value.
///
/// A field that could not be read is [`Value::Absent`] rather than a
/// placeholder number.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    #[default]
    Absent,
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Coerce to an integer. Floats are accepted only when they are integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Float(_) | Self::Absent => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Absent => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
            Self::Absent => write!(f, "<absent>"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// Units of measure attached to the axes of a decoded record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Unit {
    // Channel
    MZ,
    Nanometer,

    // Time
    Minute,
    Second,
    Millisecond,

    // Intensity
    DetectorCounts,
    MilliAbsorbance,
    PicoAmpere,
    MicroVolt,

    /// A unit label found in a file that has no dedicated variant
    Other(String),
    #[default]
    Unknown,
}

impl Unit {
    pub fn name(&self) -> &str {
        match self {
            Self::MZ => "m/z",
            Self::Nanometer => "nanometer",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::Millisecond => "millisecond",
            Self::DetectorCounts => "number of detector counts",
            Self::MilliAbsorbance => "milli-absorbance unit",
            Self::PicoAmpere => "picoampere",
            Self::MicroVolt => "microvolt",
            Self::Other(label) => label,
            Self::Unknown => "",
        }
    }

    pub fn from_name(name: &str) -> Unit {
        match name {
            "m/z" => Self::MZ,
            "nanometer" => Self::Nanometer,
            "minute" => Self::Minute,
            "second" => Self::Second,
            "millisecond" => Self::Millisecond,
            "number of detector counts" => Self::DetectorCounts,
            "milli-absorbance unit" => Self::MilliAbsorbance,
            "picoampere" => Self::PicoAmpere,
            "microvolt" => Self::MicroVolt,
            _ => Unit::Unknown,
        }
    }

    /// Interpret the short unit labels instruments write into their headers
    pub fn from_label(label: &str) -> Unit {
        let label = label.trim();
        match label.to_ascii_lowercase().as_str() {
            "" => Self::Unknown,
            "mau" => Self::MilliAbsorbance,
            "pa" => Self::PicoAmpere,
            "uv" | "µv" | "microvolts" => Self::MicroVolt,
            "counts" | "arbitrary" | "arbitrary units" | "abundance" => Self::DetectorCounts,
            "m/z" | "mz" => Self::MZ,
            "nm" => Self::Nanometer,
            "min" | "minutes" => Self::Minute,
            "s" | "sec" | "seconds" => Self::Second,
            "ms" | "milliseconds" => Self::Millisecond,
            _ => Self::Other(label.to_string()),
        }
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
