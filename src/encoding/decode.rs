use tracing::trace;

use crate::descriptor::FieldDescriptor;
use crate::encoding::{
    decode_key_at, decode_length_at, decode_varint_at, skip_field_at, DecodeContext,
    DecodeOptions,
};
use crate::error::DecodeErrorKind::{InvalidUtf8, WireTypeMismatch};
use crate::record::{clear_oneof_siblings, declared_field_mut, FieldMut, RawRecord};
use crate::DecodeError;

/// Decodes `buf` and merges the result into `record`.
///
/// Scalars are overwritten, nested records are merged into any existing value and repeated
/// elements are appended. Unrecognized fields are appended verbatim to the record's unknown-field
/// buffer unless `options.discard_unknown` is set. Error offsets are relative to the start of
/// `buf`.
pub fn unmarshal_into(
    record: &mut dyn RawRecord,
    buf: &[u8],
    options: &DecodeOptions,
) -> Result<(), DecodeError> {
    merge_region(record, buf, 0, DecodeContext::new(options))
}

/// Merges the fields found between `pos` and the end of `buf` into the record.
fn merge_region(
    record: &mut dyn RawRecord,
    buf: &[u8],
    mut pos: usize,
    ctx: DecodeContext,
) -> Result<(), DecodeError> {
    let descriptor = record.descriptor();
    while pos < buf.len() {
        let field_start = pos;
        let (number, wire_type, next) = decode_key_at(buf, pos)?;
        let Some(field) = descriptor.field_by_number(number) else {
            pos = skip_field_at(buf, next, wire_type)?;
            if ctx.discard_unknown {
                trace!(
                    message = descriptor.full_name(),
                    number,
                    "discarding unknown field"
                );
            } else {
                trace!(
                    message = descriptor.full_name(),
                    number,
                    len = pos - field_start,
                    "preserving unknown field"
                );
                record
                    .unknown_fields_mut()
                    .extend_from_slice(&buf[field_start..pos]);
            }
            continue;
        };
        if wire_type != field.wire_type() {
            return Err(DecodeError::at(
                WireTypeMismatch {
                    field: field.full_name(),
                    expected: field.wire_type(),
                    actual: wire_type,
                },
                field_start,
            ));
        }
        pos = decode_field(record, field, buf, next, ctx).map_err(|mut error| {
            error.push(descriptor.full_name(), field.name());
            error
        })?;
    }
    Ok(())
}

/// Decodes one field's payload starting at `pos`, returning the position just past it.
fn decode_field(
    record: &mut dyn RawRecord,
    field: &FieldDescriptor,
    buf: &[u8],
    pos: usize,
    ctx: DecodeContext,
) -> Result<usize, DecodeError> {
    clear_oneof_siblings(record, field);
    match declared_field_mut(record, field.number()).select() {
        FieldMut::String(value) => {
            let (start, end) = decode_length_at(buf, pos)?;
            let text = std::str::from_utf8(&buf[start..end])
                .map_err(|_| DecodeError::at(InvalidUtf8, pos))?;
            value.clear();
            value.push_str(text);
            Ok(end)
        }
        FieldMut::Bytes(value) => {
            let (start, end) = decode_length_at(buf, pos)?;
            value.clear();
            value.extend_from_slice(&buf[start..end]);
            Ok(end)
        }
        FieldMut::Message(slot) => {
            let (start, end) = decode_length_at(buf, pos)?;
            let ctx = ctx.enter_recursion(start)?;
            merge_region(slot.get_or_insert_default(), &buf[..end], start, ctx)?;
            Ok(end)
        }
        FieldMut::Repeated(list) => {
            let (start, end) = decode_length_at(buf, pos)?;
            let ctx = ctx.enter_recursion(start)?;
            merge_region(list.push_default(), &buf[..end], start, ctx)?;
            Ok(end)
        }
        scalar => {
            let (value, next) = decode_varint_at(buf, pos)?;
            scalar.set_varint(value);
            Ok(next)
        }
    }
}
