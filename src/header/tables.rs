//! Static header layouts for every supported format version.
//!
//! ChemStation files store most scalars big endian. Trace files (`.ch`, `.uv`)
//! locate their data region with a 1-based index of 512-byte sectors, mass
//! spectrometry files (`.ms`) with a 1-based index of 2-byte words.

use crate::io::cursor::{ByteOrder, CodeUnit};
use crate::io::infer_format::VendorFormat;

use super::descriptor::{
    DescriptorExtension, Derivation, FieldKind, FieldSpec, FormatDescriptor,
};

const NARROW: CodeUnit = CodeUnit::Byte;
const WIDE: CodeUnit = CodeUnit::Wide(ByteOrder::Little);

const TRACE_SECTOR: Derivation = Derivation::Sector {
    size: 512,
    first: 1,
};
const MS_WORD: Derivation = Derivation::Sector { size: 2, first: 1 };

static CHEMSTATION_MS_FIELDS: &[FieldSpec] = &[
    FieldSpec::string("file_info", 4, NARROW),
    FieldSpec::string("sample_name", 24, NARROW),
    FieldSpec::string("operator", 148, NARROW),
    FieldSpec::string("datetime", 178, NARROW),
    FieldSpec::string("instrument", 208, NARROW),
    FieldSpec::string("inlet", 218, NARROW),
    FieldSpec::string("method", 228, NARROW),
    FieldSpec::big("data_offset", 260, FieldKind::UInt32).derived(MS_WORD),
    FieldSpec::big("scan_count", 278, FieldKind::UInt32),
];

static CHEMSTATION_LEGACY_FIELDS: &[FieldSpec] = &[
    FieldSpec::string("file_info", 4, NARROW),
    FieldSpec::string("sample_name", 24, NARROW),
    FieldSpec::string("operator", 148, NARROW),
    FieldSpec::string("datetime", 178, NARROW),
    FieldSpec::string("instrument", 208, NARROW),
    FieldSpec::string("inlet", 218, NARROW),
    FieldSpec::string("method", 228, NARROW),
    FieldSpec::big("data_offset", 264, FieldKind::Int32).derived(TRACE_SECTOR),
    FieldSpec::big("sample_count", 278, FieldKind::UInt32),
    FieldSpec::big("start_time", 282, FieldKind::Float32),
    FieldSpec::big("end_time", 286, FieldKind::Float32),
    FieldSpec::string("units", 580, NARROW),
    FieldSpec::string("signal", 596, NARROW),
    FieldSpec::big("intercept", 636, FieldKind::Float64),
    FieldSpec::big("slope", 644, FieldKind::Float64),
];

static CHEMSTATION_MODERN_FIELDS: &[FieldSpec] = &[
    FieldSpec::string("file_info", 347, WIDE),
    FieldSpec::string("sample_name", 858, WIDE),
    FieldSpec::string("operator", 1880, WIDE),
    FieldSpec::string("datetime", 2391, WIDE),
    FieldSpec::string("instrument", 2492, WIDE),
    FieldSpec::string("inlet", 2533, WIDE),
    FieldSpec::string("method", 2574, WIDE),
    FieldSpec::string("units", 4172, WIDE),
    FieldSpec::string("signal", 4213, WIDE),
    FieldSpec::big("data_offset", 264, FieldKind::Int32).derived(TRACE_SECTOR),
    FieldSpec::big("sample_count", 278, FieldKind::UInt32),
    FieldSpec::big("start_time", 282, FieldKind::Float32),
    FieldSpec::big("end_time", 286, FieldKind::Float32),
    FieldSpec::big("intercept", 4724, FieldKind::Float64),
    FieldSpec::big("slope", 4732, FieldKind::Float64),
    FieldSpec::big("signal_mode", 4740, FieldKind::UInt16),
];

/// Present in modern trace files when `signal_mode == 1`
static CHEMSTATION_BASELINE_FIELDS: &[FieldSpec] =
    &[FieldSpec::big("zero", 4744, FieldKind::Float64)];

static CHEMSTATION_BASELINE: &[DescriptorExtension] = &[DescriptorExtension {
    selector: "signal_mode",
    equals: 1,
    fields: CHEMSTATION_BASELINE_FIELDS,
}];

static NETCDF_PREAMBLE_FIELDS: &[FieldSpec] = &[
    FieldSpec::big("format_version", 3, FieldKind::UInt8),
    FieldSpec::big("record_count", 4, FieldKind::UInt32),
];

macro_rules! descriptor {
    ($ident:ident, $id:literal, $name:literal, $fields:expr) => {
        descriptor!($ident, $id, $name, $fields, &[]);
    };
    ($ident:ident, $id:literal, $name:literal, $fields:expr, $extensions:expr) => {
        pub static $ident: FormatDescriptor = FormatDescriptor {
            id: $id,
            name: $name,
            fields: $fields,
            extensions: $extensions,
        };
    };
}

descriptor!(CHEMSTATION_2, 2, "ChemStation MS", CHEMSTATION_MS_FIELDS);
descriptor!(CHEMSTATION_8, 8, "ChemStation GC", CHEMSTATION_LEGACY_FIELDS);
descriptor!(CHEMSTATION_30, 30, "ChemStation LC", CHEMSTATION_LEGACY_FIELDS);
descriptor!(CHEMSTATION_31, 31, "ChemStation UV", CHEMSTATION_LEGACY_FIELDS);
descriptor!(CHEMSTATION_81, 81, "ChemStation GC", CHEMSTATION_LEGACY_FIELDS);
descriptor!(CHEMSTATION_130, 130, "ChemStation LC", CHEMSTATION_MODERN_FIELDS);
descriptor!(CHEMSTATION_131, 131, "ChemStation UV", CHEMSTATION_MODERN_FIELDS);
descriptor!(
    CHEMSTATION_179,
    179,
    "ChemStation GC",
    CHEMSTATION_MODERN_FIELDS,
    CHEMSTATION_BASELINE
);
descriptor!(
    CHEMSTATION_181,
    181,
    "ChemStation GC",
    CHEMSTATION_MODERN_FIELDS,
    CHEMSTATION_BASELINE
);
descriptor!(NETCDF_CLASSIC, 1, "netCDF classic", NETCDF_PREAMBLE_FIELDS);
descriptor!(NETCDF_64BIT, 2, "netCDF 64-bit offset", NETCDF_PREAMBLE_FIELDS);

pub static CHEMSTATION_DESCRIPTORS: &[&FormatDescriptor] = &[
    &CHEMSTATION_2,
    &CHEMSTATION_8,
    &CHEMSTATION_30,
    &CHEMSTATION_31,
    &CHEMSTATION_81,
    &CHEMSTATION_130,
    &CHEMSTATION_131,
    &CHEMSTATION_179,
    &CHEMSTATION_181,
];

pub static NETCDF_DESCRIPTORS: &[&FormatDescriptor] = &[&NETCDF_CLASSIC, &NETCDF_64BIT];

/// Look up the header layout for a format version. Formats whose headers are
/// self-describing text have no table.
pub fn descriptor_for(format: VendorFormat, version: u32) -> Option<&'static FormatDescriptor> {
    let table = match format {
        VendorFormat::ChemStation => CHEMSTATION_DESCRIPTORS,
        VendorFormat::AndiNetCdf => NETCDF_DESCRIPTORS,
        VendorFormat::MzXml | VendorFormat::Unknown => return None,
    };
    table.iter().copied().find(|d| d.id == version)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::header::decoder::decode;
    use crate::io::chemstation::fixtures::write_field;
    use crate::io::cursor::ByteCursor;
    use crate::params::Value;

    fn sample_value(spec: &FieldSpec, index: usize) -> Value {
        match spec.kind {
            FieldKind::PascalString(_) => Value::Str(format!("s{index}")),
            FieldKind::Float32 => Value::Float(index as f64 + 0.5),
            FieldKind::Float64 => Value::Float(index as f64 * 1.25),
            FieldKind::UInt8 => Value::Int(2),
            FieldKind::UInt16 => Value::Int(1),
            _ => Value::Int(index as i64 + 3),
        }
    }

    #[test]
    fn test_every_descriptor_reproduces_written_values() {
        for descriptor in CHEMSTATION_DESCRIPTORS.iter().chain(NETCDF_DESCRIPTORS) {
            let mut buf = Vec::new();
            let mut expected = Vec::new();
            let all_fields = descriptor
                .fields
                .iter()
                .chain(descriptor.extensions.iter().flat_map(|e| e.fields.iter()));
            for (i, spec) in all_fields.enumerate() {
                let value = sample_value(spec, i);
                write_field(&mut buf, spec, &value);
                let value = match (spec.derivation, &value) {
                    (Some(d), Value::Int(raw)) => d.apply(*raw).into(),
                    _ => value,
                };
                expected.push((spec.name, value));
            }
            let record = decode(&mut ByteCursor::new(&buf), descriptor);
            for (name, value) in expected {
                let observed = record.get(name).unwrap_or_else(|| {
                    panic!("{} did not decode {name}", descriptor.id)
                });
                assert_eq!(observed, &value, "{}: {name}", descriptor.id);
            }
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(
            descriptor_for(VendorFormat::ChemStation, 179).map(|d| d.id),
            Some(179)
        );
        assert!(descriptor_for(VendorFormat::ChemStation, 99).is_none());
        assert_eq!(
            descriptor_for(VendorFormat::AndiNetCdf, 2).map(|d| d.name),
            Some("netCDF 64-bit offset")
        );
        assert!(descriptor_for(VendorFormat::MzXml, 3).is_none());
    }

    #[test]
    fn test_layouts_do_not_overlap() {
        for descriptor in CHEMSTATION_DESCRIPTORS {
            let mut spans: Vec<_> = descriptor
                .fields
                .iter()
                .filter_map(|f| f.kind.size_of().map(|s| (f.offset, f.offset + s as u64)))
                .collect();
            spans.sort();
            for pair in spans.windows(2) {
                assert!(pair[0].1 <= pair[1].0, "{}: {:?}", descriptor.id, pair);
            }
        }
    }
}
