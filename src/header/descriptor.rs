use crate::io::cursor::{ByteOrder, CodeUnit};

/// The scalar or string type stored at a header field's offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    PascalString(CodeUnit),
}

impl FieldKind {
    /// The number of bytes a fixed-width field occupies, `None` for strings
    pub const fn size_of(&self) -> Option<usize> {
        match self {
            Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Float32 => Some(4),
            Self::Int64 | Self::UInt64 | Self::Float64 => Some(8),
            Self::PascalString(_) => None,
        }
    }
}

/// A transformation applied to a raw integer field after it is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Derivation {
    /// The raw value is an index of `size`-byte blocks numbered from `first`,
    /// converted to the byte offset `(raw - first) * size`
    Sector { size: u64, first: i64 },
}

impl Derivation {
    /// Apply the derivation, yielding `None` when the result would not be a
    /// valid byte offset
    pub fn apply(&self, raw: i64) -> Option<i64> {
        match self {
            Self::Sector { size, first } => {
                let index = raw.checked_sub(*first)?;
                if index < 0 {
                    return None;
                }
                index.checked_mul(*size as i64)
            }
        }
    }
}

/// The location and type of one header field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldSpec {
    pub name: &'static str,
    pub offset: u64,
    pub kind: FieldKind,
    pub order: ByteOrder,
    pub derivation: Option<Derivation>,
}

impl FieldSpec {
    pub const fn new(name: &'static str, offset: u64, kind: FieldKind, order: ByteOrder) -> Self {
        Self {
            name,
            offset,
            kind,
            order,
            derivation: None,
        }
    }

    pub const fn big(name: &'static str, offset: u64, kind: FieldKind) -> Self {
        Self::new(name, offset, kind, ByteOrder::Big)
    }

    pub const fn string(name: &'static str, offset: u64, code_unit: CodeUnit) -> Self {
        Self::new(name, offset, FieldKind::PascalString(code_unit), ByteOrder::Big)
    }

    pub const fn derived(self, derivation: Derivation) -> Self {
        Self {
            derivation: Some(derivation),
            ..self
        }
    }
}

/// A group of fields that is only present when an earlier field holds a
/// particular value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorExtension {
    pub selector: &'static str,
    pub equals: i64,
    pub fields: &'static [FieldSpec],
}

/**
The static header layout of one format version.

Descriptors are constructed once as `static` items and are never written to,
so they can be shared freely between threads.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub id: u32,
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
    pub extensions: &'static [DescriptorExtension],
}

impl FormatDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .chain(self.extensions.iter().flat_map(|ext| ext.fields.iter()))
            .find(|f| f.name == name)
    }

    /// The smallest offset any field is read from
    pub fn min_offset(&self) -> Option<u64> {
        self.fields.iter().map(|f| f.offset).min()
    }
}
