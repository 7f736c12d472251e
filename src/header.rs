//! Declarative header layouts and the decoder that applies them.
pub mod decoder;
pub mod descriptor;
pub mod record;
pub mod tables;

pub use crate::header::decoder::{decode, read_field};
pub use crate::header::descriptor::{
    DescriptorExtension, Derivation, FieldKind, FieldSpec, FormatDescriptor,
};
pub use crate::header::record::HeaderRecord;
pub use crate::header::tables::descriptor_for;
