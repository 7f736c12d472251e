use log::trace;

use crate::io::cursor::{ByteCursor, CursorError};
use crate::params::Value;

use super::descriptor::{FieldKind, FieldSpec, FormatDescriptor};
use super::record::HeaderRecord;

/// Read a single field's value from the cursor
pub fn read_field(cursor: &mut ByteCursor<'_>, spec: &FieldSpec) -> Result<Value, CursorError> {
    cursor.seek(spec.offset)?;
    let value = match spec.kind {
        FieldKind::Int8 => Value::Int(cursor.read_int(1, spec.order)?),
        FieldKind::Int16 => Value::Int(cursor.read_int(2, spec.order)?),
        FieldKind::Int32 => Value::Int(cursor.read_int(4, spec.order)?),
        FieldKind::Int64 => Value::Int(cursor.read_int(8, spec.order)?),
        FieldKind::UInt8 => Value::Int(cursor.read_uint(1, spec.order)? as i64),
        FieldKind::UInt16 => Value::Int(cursor.read_uint(2, spec.order)? as i64),
        FieldKind::UInt32 => Value::Int(cursor.read_uint(4, spec.order)? as i64),
        FieldKind::UInt64 => match i64::try_from(cursor.read_uint(8, spec.order)?) {
            Ok(v) => Value::Int(v),
            Err(_) => Value::Absent,
        },
        FieldKind::Float32 => Value::Float(cursor.read_float(4, spec.order)?),
        FieldKind::Float64 => Value::Float(cursor.read_float(8, spec.order)?),
        FieldKind::PascalString(code_unit) => Value::Str(cursor.read_pascal_string(code_unit)?),
    };

    match (spec.derivation, value) {
        (Some(derivation), Value::Int(raw)) => Ok(derivation.apply(raw).into()),
        (_, value) => Ok(value),
    }
}

fn decode_fields(cursor: &mut ByteCursor<'_>, fields: &[FieldSpec], record: &mut HeaderRecord) {
    for spec in fields {
        let value = match read_field(cursor, spec) {
            Ok(value) => value,
            Err(e) => {
                trace!("Header field {} is absent: {e}", spec.name);
                Value::Absent
            }
        };
        record.insert(spec.name, value);
    }
}

/**
Apply a [`FormatDescriptor`] to a byte source.

Every declared field is attempted. A field that cannot be read is recorded
as [`Value::Absent`] and decoding moves on to the next field, so a short or
damaged file still yields every field that is present. Extension field
groups are decoded after the base fields, and only when their selector
field decoded to the expected value.
*/
pub fn decode(cursor: &mut ByteCursor<'_>, descriptor: &FormatDescriptor) -> HeaderRecord {
    let mut record = HeaderRecord::new(descriptor.id);
    decode_fields(cursor, descriptor.fields, &mut record);
    for extension in descriptor.extensions {
        if record.get_i64(extension.selector) == Some(extension.equals) {
            decode_fields(cursor, extension.fields, &mut record);
        }
    }
    record
}
